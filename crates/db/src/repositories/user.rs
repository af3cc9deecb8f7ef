use std::str::FromStr;

use sqlx::Row;

use tsm_core::domain::role::{Role, User, UserId};

use super::{RepositoryError, UserDirectory};
use crate::DbPool;

pub struct SqlUserDirectory {
    pool: DbPool,
}

impl SqlUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: String = row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role: String = row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department: Option<String> =
        row.try_get("department").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let work_id: Option<String> =
        row.try_get("work_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let phone: Option<String> =
        row.try_get("phone").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(User {
        id: UserId(id),
        name,
        email,
        role: Role::from_str(&role).map_err(|e| RepositoryError::Decode(e.to_string()))?,
        department,
        work_id,
        phone,
    })
}

#[async_trait::async_trait]
impl UserDirectory for SqlUserDirectory {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, email, role, department, work_id, phone FROM app_user WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, name, email, role, department, work_id, phone FROM app_user ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect::<Result<Vec<_>, _>>()
    }

    async fn save_user(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO app_user (id, name, email, role, department, work_id, phone)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 role = excluded.role,
                 department = excluded.department,
                 work_id = excluded.work_id,
                 phone = excluded.phone",
        )
        .bind(&user.id.0)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.department)
        .bind(&user.work_id)
        .bind(&user.phone)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tsm_core::domain::role::{Role, UserId};

    use super::SqlUserDirectory;
    use crate::fixtures::SeedDataset;
    use crate::repositories::UserDirectory;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn sql_directory_saves_and_resolves_users() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let directory = SqlUserDirectory::new(pool);

        for user in SeedDataset::users() {
            directory.save_user(user).await.expect("save user");
        }

        let users = directory.list_users().await.expect("list");
        assert_eq!(users.len(), SeedDataset::users().len());

        let actor = directory
            .resolve_actor(&UserId("u5".to_string()))
            .await
            .expect("resolve")
            .expect("seeded");
        assert_eq!(actor.role, Role::MfgFm);

        let unknown = directory.resolve_actor(&UserId("nobody".to_string())).await.expect("resolve");
        assert!(unknown.is_none());
    }
}
