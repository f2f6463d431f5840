use serde_json::json;

use crate::commands::CommandResult;
use wardstock_core::config::{AppConfig, LoadOptions};
use wardstock_db::{connect, migrations, DemoDataset};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let seed_result = DemoDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<_, (&'static str, String, u8)> = if !verification.all_present {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            let message = if failed_checks.is_empty() {
                "Some seed data failed to load".to_string()
            } else {
                format!("Seed verification failed for checks: {}", failed_checks.join(", "))
            };
            Err(("seed_verification", message, 6u8))
        } else {
            Ok(seed_result.requests_seeded)
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(seeded) => {
            let descriptions: Vec<String> = seeded
                .iter()
                .map(|info| format!("  - {}: {}", info.request_id, info.description))
                .collect();
            let message = format!(
                "Demo dataset loaded successfully for {} requests:\n{}",
                seeded.len(),
                descriptions.join("\n")
            );
            let request_ids: Vec<&str> = seeded.iter().map(|info| info.request_id).collect();
            CommandResult::success_with_details(
                "seed",
                message,
                json!({ "requests_seeded": seeded.len(), "request_ids": request_ids }),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
