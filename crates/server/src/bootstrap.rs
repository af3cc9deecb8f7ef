use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use tsm_core::billing::StaticRateConfigProvider;
use tsm_core::clock::SystemClock;
use tsm_core::config::{AppConfig, ConfigError, LoadOptions};
use tsm_core::domain::notification::{InMemoryNotificationSink, NotificationSink};
use tsm_core::lifecycle::RequestLifecycle;
use tsm_db::{connect_with_config, migrations, DbPool, SqlRequestRepository, SqlUserDirectory};

use crate::audit_log::TracingAuditSink;
use crate::notifications::{FanoutNotificationSink, TracingNotificationSink};
use crate::workflow::{WorkflowCollaborators, WorkflowService};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub workflow: Arc<WorkflowService>,
    pub inbox: InMemoryNotificationSink,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        request_id = "unknown",
        "starting application bootstrap"
    );
    let chain = config.workflow.chain()?;

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        request_id = "unknown",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        request_id = "unknown",
        "database migrations applied"
    );

    let inbox = InMemoryNotificationSink::default();
    let notifications: Arc<dyn NotificationSink> = Arc::new(FanoutNotificationSink::new(vec![
        Arc::new(TracingNotificationSink),
        Arc::new(inbox.clone()),
    ]));

    let requests = SqlRequestRepository::new(db_pool.clone()).with_chain(chain.clone());
    let collaborators = WorkflowCollaborators {
        requests: Arc::new(requests),
        users: Arc::new(SqlUserDirectory::new(db_pool.clone())),
        rates: Arc::new(StaticRateConfigProvider::new(config.rates.clone())),
        notifications,
        annotations: config.workflow.annotation.provider(),
        audit: Arc::new(TracingAuditSink),
        clock: Arc::new(SystemClock),
    };
    let lifecycle = RequestLifecycle::new(chain, config.workflow.inspection_role);
    let workflow = Arc::new(WorkflowService::new(
        collaborators,
        lifecycle,
        Duration::from_millis(config.workflow.action_delay_ms),
    ));

    info!(
        event_name = "system.bootstrap.workflow_ready",
        correlation_id = "bootstrap",
        request_id = "unknown",
        chain = ?config.workflow.approval_chain,
        inspection_role = %config.workflow.inspection_role,
        annotation = config.workflow.annotation.as_str(),
        "workflow service assembled"
    );

    Ok(Application { config, db_pool, workflow, inbox })
}
