use std::collections::HashMap;

use tokio::sync::RwLock;

use tsm_core::domain::request::{RequestId, SpaceRequest};
use tsm_core::domain::role::{User, UserId};

use super::{RepositoryError, RequestRepository, UserDirectory};

#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, SpaceRequest>>,
}

impl InMemoryRequestRepository {
    pub fn with_requests(requests: impl IntoIterator<Item = SpaceRequest>) -> Self {
        let requests = requests.into_iter().map(|request| (request.id.0.clone(), request)).collect();
        Self { requests: RwLock::new(requests) }
    }
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn list(&self) -> Result<Vec<SpaceRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut listed: Vec<SpaceRequest> = requests.values().cloned().collect();
        listed.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.0.cmp(&right.id.0))
        });
        Ok(listed)
    }

    async fn get(&self, id: &RequestId) -> Result<Option<SpaceRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn save(&self, request: SpaceRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserDirectory {
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let users = users.into_iter().map(|user| (user.id.0.clone(), user)).collect();
        Self { users: RwLock::new(users) }
    }
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let users = self.users.read().await;
        Ok(users.get(&id.0).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut listed: Vec<User> = users.values().cloned().collect();
        listed.sort_by(|left, right| left.id.0.cmp(&right.id.0));
        Ok(listed)
    }

    async fn save_user(&self, user: User) -> Result<(), RepositoryError> {
        let mut users = self.users.write().await;
        users.insert(user.id.0.clone(), user);
        Ok(())
    }
}
