use async_trait::async_trait;
use thiserror::Error;

use tsm_core::domain::request::{RequestId, SpaceRequest};
use tsm_core::domain::role::{Actor, User, UserId};

pub mod memory;
pub mod request;
pub mod user;

pub use memory::{InMemoryRequestRepository, InMemoryUserDirectory};
pub use request::SqlRequestRepository;
pub use user::SqlUserDirectory;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Whole-snapshot storage for space requests. `save` is an upsert keyed by id.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    /// All requests ordered by `created_at`, then id.
    async fn list(&self) -> Result<Vec<SpaceRequest>, RepositoryError>;
    async fn get(&self, id: &RequestId) -> Result<Option<SpaceRequest>, RepositoryError>;
    async fn save(&self, request: SpaceRequest) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;
    async fn save_user(&self, user: User) -> Result<(), RepositoryError>;

    async fn resolve_actor(&self, id: &UserId) -> Result<Option<Actor>, RepositoryError> {
        Ok(self.find_user(id).await?.map(|user| user.actor()))
    }
}
