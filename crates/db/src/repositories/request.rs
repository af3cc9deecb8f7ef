use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use tsm_core::chain::ApprovalChain;
use tsm_core::domain::request::{ApprovalAction, RequestId, RequestStatus, SpaceRequest};
use tsm_core::domain::role::{Role, UserId};

use super::{RepositoryError, RequestRepository};
use crate::DbPool;

const SELECT_COLUMNS: &str = "SELECT id, requester_id, requester_name, machine_name, serial_number,
        work_cell, cost_center, length, width, height, date_in, date_out, billable_area,
        calculated_rate, currency, status, current_approver_role, approval_history_json,
        annotation, created_at
     FROM space_request";

/// Decoded rows are checked against `chain`; a row that breaks a request invariant is a
/// decode error, never a snapshot handed to the lifecycle.
pub struct SqlRequestRepository {
    pool: DbPool,
    chain: ApprovalChain,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, chain: ApprovalChain::default() }
    }

    pub fn with_chain(mut self, chain: ApprovalChain) -> Self {
        self.chain = chain;
        self
    }

    fn decode(&self, row: &sqlx::sqlite::SqliteRow) -> Result<SpaceRequest, RepositoryError> {
        let request = row_to_request(row)?;
        request.check_invariants(&self.chain).map_err(decode_err)?;
        Ok(request)
    }
}

fn decode_err(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|error| decode_err(format!("{column}: {error}")))
}

fn parse_date(column: &str, value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|error| decode_err(format!("{column}: {error}")))
}

/// Fixed-width RFC 3339 so that text ordering in SQLite matches chronological ordering.
pub(crate) fn timestamp_to_db(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn timestamp_from_db(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| decode_err(format!("{column}: {error}")))
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<SpaceRequest, RepositoryError> {
    let text = |column: &str| -> Result<String, RepositoryError> {
        row.try_get::<String, _>(column).map_err(decode_err)
    };
    let optional = |column: &str| -> Result<Option<String>, RepositoryError> {
        row.try_get::<Option<String>, _>(column).map_err(decode_err)
    };

    let status = RequestStatus::from_str(&text("status")?).map_err(decode_err)?;
    let current_approver_role = optional("current_approver_role")?
        .map(|role| Role::from_str(&role).map_err(decode_err))
        .transpose()?;
    let approval_history: Vec<ApprovalAction> =
        serde_json::from_str(&text("approval_history_json")?).map_err(decode_err)?;

    Ok(SpaceRequest {
        id: RequestId(text("id")?),
        requester_id: UserId(text("requester_id")?),
        requester_name: text("requester_name")?,
        machine_name: text("machine_name")?,
        serial_number: text("serial_number")?,
        work_cell: text("work_cell")?,
        cost_center: text("cost_center")?,
        length: parse_decimal("length", &text("length")?)?,
        width: parse_decimal("width", &text("width")?)?,
        height: parse_decimal("height", &text("height")?)?,
        date_in: parse_date("date_in", &text("date_in")?)?,
        date_out: parse_date("date_out", &text("date_out")?)?,
        billable_area: parse_decimal("billable_area", &text("billable_area")?)?,
        calculated_rate: parse_decimal("calculated_rate", &text("calculated_rate")?)?,
        currency: text("currency")?,
        status,
        current_approver_role,
        approval_history,
        annotation: optional("annotation")?,
        created_at: timestamp_from_db("created_at", &text("created_at")?)?,
    })
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn list(&self) -> Result<Vec<SpaceRequest>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> =
            sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY created_at ASC, id ASC"))
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(|row| self.decode(row)).collect::<Result<Vec<_>, _>>()
    }

    async fn get(&self, id: &RequestId) -> Result<Option<SpaceRequest>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(self.decode(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, request: SpaceRequest) -> Result<(), RepositoryError> {
        let history_json = serde_json::to_string(&request.approval_history).map_err(decode_err)?;

        sqlx::query(
            "INSERT INTO space_request (id, requester_id, requester_name, machine_name,
                                        serial_number, work_cell, cost_center, length, width,
                                        height, date_in, date_out, billable_area, calculated_rate,
                                        currency, status, current_approver_role,
                                        approval_history_json, annotation, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 requester_id = excluded.requester_id,
                 requester_name = excluded.requester_name,
                 machine_name = excluded.machine_name,
                 serial_number = excluded.serial_number,
                 work_cell = excluded.work_cell,
                 cost_center = excluded.cost_center,
                 length = excluded.length,
                 width = excluded.width,
                 height = excluded.height,
                 date_in = excluded.date_in,
                 date_out = excluded.date_out,
                 billable_area = excluded.billable_area,
                 calculated_rate = excluded.calculated_rate,
                 currency = excluded.currency,
                 status = excluded.status,
                 current_approver_role = excluded.current_approver_role,
                 approval_history_json = excluded.approval_history_json,
                 annotation = excluded.annotation,
                 created_at = excluded.created_at,
                 updated_at = excluded.updated_at",
        )
        .bind(&request.id.0)
        .bind(&request.requester_id.0)
        .bind(&request.requester_name)
        .bind(&request.machine_name)
        .bind(&request.serial_number)
        .bind(&request.work_cell)
        .bind(&request.cost_center)
        .bind(request.length.to_string())
        .bind(request.width.to_string())
        .bind(request.height.to_string())
        .bind(request.date_in.format("%Y-%m-%d").to_string())
        .bind(request.date_out.format("%Y-%m-%d").to_string())
        .bind(request.billable_area.to_string())
        .bind(request.calculated_rate.to_string())
        .bind(&request.currency)
        .bind(request.status.as_str())
        .bind(request.current_approver_role.map(|role| role.as_str()))
        .bind(history_json)
        .bind(&request.annotation)
        .bind(timestamp_to_db(&request.created_at))
        .bind(timestamp_to_db(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use sqlx::Row;

    use tsm_core::chain::ApprovalChain;
    use tsm_core::domain::request::{RequestId, RequestStatus};
    use tsm_core::domain::role::Role;

    use super::SqlRequestRepository;
    use crate::fixtures::SeedDataset;
    use crate::repositories::{RepositoryError, RequestRepository};
    use crate::{connect_with_settings, migrations};

    async fn setup_pool() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).expect("date")
    }

    #[tokio::test]
    async fn sql_request_repo_round_trips_every_field() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool);

        for request in SeedDataset::requests(today()) {
            repo.save(request.clone()).await.expect("save");
            let found = repo.get(&request.id).await.expect("get").expect("present");
            assert_eq!(found, request);
        }

        let missing = repo.get(&RequestId("REQ-MISSING".to_string())).await.expect("get");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn sql_request_repo_upserts_and_orders_by_creation() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool);
        let seeds = SeedDataset::requests(today());

        for request in seeds.iter().rev() {
            repo.save(request.clone()).await.expect("save");
        }

        let mut pending = seeds
            .iter()
            .find(|request| request.status == RequestStatus::Pending)
            .cloned()
            .expect("pending seed");
        pending.status = RequestStatus::Rejected;
        pending.current_approver_role = None;
        repo.save(pending.clone()).await.expect("upsert");

        let listed = repo.list().await.expect("list");
        assert_eq!(listed.len(), seeds.len());
        assert!(listed.windows(2).all(|pair| {
            (pair[0].created_at, &pair[0].id.0) <= (pair[1].created_at, &pair[1].id.0)
        }));
        let stored = listed.iter().find(|request| request.id == pending.id).expect("stored");
        assert_eq!(stored.status, RequestStatus::Rejected);
        assert_eq!(stored.current_approver_role, None);
    }

    #[tokio::test]
    async fn decimals_are_stored_as_text() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let request = SeedDataset::requests(today()).remove(0);
        repo.save(request.clone()).await.expect("save");

        let row = sqlx::query(
            "SELECT calculated_rate, current_approver_role FROM space_request WHERE id = ?",
        )
        .bind(&request.id.0)
        .fetch_one(&pool)
        .await
        .expect("row");

        assert_eq!(row.get::<String, _>("calculated_rate"), request.calculated_rate.to_string());
        assert_eq!(
            row.get::<Option<String>, _>("current_approver_role"),
            request.current_approver_role.map(|role: Role| role.as_str().to_string())
        );
    }

    #[tokio::test]
    async fn corrupt_rows_surface_decode_errors() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool.clone());
        let request = SeedDataset::requests(today()).remove(0);
        repo.save(request.clone()).await.expect("save");

        sqlx::query("UPDATE space_request SET length = 'wide' WHERE id = ?")
            .bind(&request.id.0)
            .execute(&pool)
            .await
            .expect("corrupt row");

        let error = repo.get(&request.id).await.expect_err("decode should fail");
        assert!(matches!(error, RepositoryError::Decode(ref message) if message.contains("length")));
    }

    #[tokio::test]
    async fn rows_breaking_request_invariants_fail_to_decode() {
        let pool = setup_pool().await;
        let repo = SqlRequestRepository::new(pool);
        let mut request = SeedDataset::requests(today())
            .into_iter()
            .find(|request| request.status == RequestStatus::Pending)
            .expect("pending seed");
        request.status = RequestStatus::Approved;
        request.current_approver_role = Some(Role::Wcm);
        repo.save(request.clone()).await.expect("save");

        let error = repo.get(&request.id).await.expect_err("inconsistent row must not decode");
        assert!(matches!(
            error,
            RepositoryError::Decode(ref message) if message.contains("must not await approver")
        ));
        assert!(matches!(repo.list().await, Err(RepositoryError::Decode(_))));
    }

    #[tokio::test]
    async fn decoding_follows_the_configured_chain() {
        let pool = setup_pool().await;
        let pending = SeedDataset::requests(today())
            .into_iter()
            .find(|request| request.status == RequestStatus::Pending)
            .expect("pending seed");
        SqlRequestRepository::new(pool.clone()).save(pending.clone()).await.expect("save");

        let reordered = SqlRequestRepository::new(pool).with_chain(
            ApprovalChain::new(vec![Role::Wcm, Role::Bum]).expect("valid chain"),
        );
        let error = reordered.get(&pending.id).await.expect_err("first approver differs");
        assert!(matches!(error, RepositoryError::Decode(_)));
    }
}
