use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;
use tsm_core::chain::ApprovalChain;
use tsm_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    chain: ApprovalChain,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub workflow: HealthCheck,
    pub requests_by_status: BTreeMap<String, i64>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, chain: ApprovalChain) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, chain })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let (database, requests_by_status) = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "tsm-server runtime initialized".to_string(),
        },
        database,
        workflow: HealthCheck { status: "ready", detail: describe_chain(&state.chain) },
        requests_by_status,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn describe_chain(chain: &ApprovalChain) -> String {
    let roles: Vec<&str> = chain.roles().iter().map(|role| role.display_name()).collect();
    format!("approval chain {}", roles.join(" -> "))
}

async fn database_check(pool: &DbPool) -> (HealthCheck, BTreeMap<String, i64>) {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM space_request GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await;

    match rows {
        Ok(rows) => (
            HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
            rows.into_iter().collect(),
        ),
        Err(error) => {
            warn!(
                event_name = "system.health.database_degraded",
                correlation_id = "health",
                request_id = "unknown",
                error = %error,
                "health check database query failed"
            );
            (
                HealthCheck {
                    status: "degraded",
                    detail: format!("database query failed: {error}"),
                },
                BTreeMap::new(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use chrono::NaiveDate;
    use tsm_core::chain::ApprovalChain;
    use tsm_db::fixtures::SeedDataset;
    use tsm_db::{connect_with_settings, migrations, RequestRepository, SqlRequestRepository};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_reports_chain_and_request_counts() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlRequestRepository::new(pool.clone());
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).expect("date");
        for request in SeedDataset::requests(today) {
            repo.save(request).await.expect("seed");
        }

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool.clone(), chain: ApprovalChain::default() }))
                .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.workflow.detail, "approval chain BUM -> WCM -> MFG FM -> IE Plant");
        assert_eq!(payload.requests_by_status.get("pending"), Some(&1));
        assert_eq!(payload.requests_by_status.get("expired"), Some(&1));

        pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool, chain: ApprovalChain::default() })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.service.status, "ready");
        assert!(payload.requests_by_status.is_empty());
    }
}
