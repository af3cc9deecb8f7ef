use crate::commands::{prepare, CommandFailure, CommandResult};
use tsm_core::clock::{Clock, SystemClock};
use tsm_db::repositories::RequestRepository;
use tsm_db::{
    connect_with_config, migrations, SeedDataset, SqlRequestRepository, SqlUserDirectory,
};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let requests = SqlRequestRepository::new(pool.clone());
        let users = SqlUserDirectory::new(pool.clone());

        let seed_result = SeedDataset::load(&requests, &users, SystemClock.today())
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = SeedDataset::verify(&requests, &users)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<Vec<String>, CommandFailure> = if !verification.all_passed {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|check| (!check.passed).then_some(check.name.as_str()))
                .collect::<Vec<_>>();
            Err(("seed_verification", verification_message(&failed_checks), 6u8))
        } else {
            let mut lines = vec![format!("  - users: {}", seed_result.users_seeded)];
            for id in &seed_result.request_ids {
                let status = requests
                    .get(id)
                    .await
                    .map_err(|error| ("seed_verification", error.to_string(), 6u8))?
                    .map(|request| request.status.as_str())
                    .unwrap_or("missing");
                lines.push(format!("  - {id}: {status}"));
            }
            Ok(lines)
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(lines) => CommandResult::success(
            "seed",
            format!("seed dataset loaded:\n{}", lines.join("\n")),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        assert_eq!(
            verification_message(&["user:u4", "request:REQ-1003"]),
            "Seed verification failed for checks: user:u4, request:REQ-1003"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_message(&[]), "Some seed data failed to load");
    }
}
