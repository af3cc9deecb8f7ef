use crate::commands::{prepare, CommandFailure, CommandResult};
use tsm_core::clock::{Clock, SystemClock};
use tsm_core::sweeper::ExpirySweeper;
use tsm_db::repositories::RequestRepository;
use tsm_db::{connect_with_config, migrations, SqlRequestRepository};

/// One-shot expiry sweep against the configured database.
pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("sweep") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };
    let chain = match config.workflow.chain() {
        Ok(chain) => chain,
        Err(error) => {
            return CommandResult::failure("sweep", "config_validation", error.to_string(), 2)
        }
    };
    let today = SystemClock.today();

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let repository = SqlRequestRepository::new(pool.clone()).with_chain(chain);
        let requests = repository
            .list()
            .await
            .map_err(|error| ("sweep_execution", error.to_string(), 5u8))?;
        let report = ExpirySweeper.sweep(requests, today);
        for request in report.changed() {
            repository
                .save(request.clone())
                .await
                .map_err(|error| ("sweep_execution", error.to_string(), 5u8))?;
        }

        pool.close().await;
        Ok::<Vec<String>, CommandFailure>(
            report.expired_ids.iter().map(|id| id.0.clone()).collect(),
        )
    });

    match result {
        Ok(expired) if expired.is_empty() => {
            CommandResult::success("sweep", format!("no approved requests overdue as of {today}"))
        }
        Ok(expired) => CommandResult::success(
            "sweep",
            format!("expired {} request(s) as of {today}: {}", expired.len(), expired.join(", ")),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sweep", error_class, message, exit_code)
        }
    }
}
