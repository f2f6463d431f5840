use std::time::Instant;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::commands::CommandResult;
use wardstock_core::config::{AppConfig, LoadOptions};
use wardstock_core::workflow::{submit, Decision, DecisionStage, SubmitInput};
use wardstock_db::repositories::{RequestRepository, SqlRequestRepository};
use wardstock_db::{connect, migrations, DbPool};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("db_connectivity"));
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_round_trip"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_round_trip"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let db_started = Instant::now();
    let db_result = runtime.block_on(async { connect(&config.database).await });

    let pool = match db_result {
        Ok(pool) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Pass,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("connected using `{}`", config.database.url),
            });
            pool
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("failed to connect: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_round_trip"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let migration_started = Instant::now();
    let migration_result = runtime.block_on(async { migrations::run_pending(&pool).await });
    match migration_result {
        Ok(()) => {
            checks.push(SmokeCheck {
                name: "migration_visibility",
                status: SmokeStatus::Pass,
                elapsed_ms: migration_started.elapsed().as_millis() as u64,
                message: "migrations are visible and executable".to_string(),
            });
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "migration_visibility",
                status: SmokeStatus::Fail,
                elapsed_ms: migration_started.elapsed().as_millis() as u64,
                message: format!("migration execution failed: {error}"),
            });
            checks.push(skipped("workflow_round_trip"));
            runtime.block_on(async { pool.close().await });
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    }

    let round_trip_started = Instant::now();
    let round_trip = runtime.block_on(workflow_round_trip(&pool));
    runtime.block_on(async { pool.close().await });

    match round_trip {
        Ok(()) => checks.push(SmokeCheck {
            name: "workflow_round_trip",
            status: SmokeStatus::Pass,
            elapsed_ms: round_trip_started.elapsed().as_millis() as u64,
            message: "submit, manager approval, and project manager approval all succeeded"
                .to_string(),
        }),
        Err(error) => checks.push(SmokeCheck {
            name: "workflow_round_trip",
            status: SmokeStatus::Fail,
            elapsed_ms: round_trip_started.elapsed().as_millis() as u64,
            message: error,
        }),
    }

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

/// Drives a throwaway request through the full two-stage chain against the
/// configured database, then removes its rows.
async fn workflow_round_trip(pool: &DbPool) -> Result<(), String> {
    let repository = SqlRequestRepository::new(pool.clone());

    let request = submit(SubmitInput {
        item_name: "smoke check request".to_string(),
        quantity: 1,
        unit_price: Decimal::ZERO,
        requested_by: "smoke-submitter".to_string(),
    })
    .map_err(|error| format!("submit failed: {error}"))?;
    let request_id = request.id.clone();

    let result = async {
        repository
            .create(request)
            .await
            .map_err(|error| format!("create failed: {error}"))?;

        let after_manager = repository
            .apply_decision(
                &request_id,
                &Decision::new(DecisionStage::Manager, true, "smoke-manager"),
            )
            .await
            .map_err(|error| format!("manager decision failed: {error}"))?;
        if !after_manager.manager_approved {
            return Err("manager approval did not set the approval flag".to_string());
        }

        let approved = repository
            .apply_decision(
                &request_id,
                &Decision::new(DecisionStage::ProjectManager, true, "smoke-pm"),
            )
            .await
            .map_err(|error| format!("project manager decision failed: {error}"))?;
        if approved.status().as_str() != "approved" {
            return Err(format!(
                "expected approved status after full chain, got `{}`",
                approved.status().as_str()
            ));
        }

        Ok(())
    }
    .await;

    // Always remove the throwaway rows, pass or fail.
    let _ = sqlx::query("DELETE FROM approval_audit_log WHERE request_id = ?")
        .bind(&request_id.0)
        .execute(pool)
        .await;
    let _ = sqlx::query("DELETE FROM request WHERE id = ?")
        .bind(&request_id.0)
        .execute(pool)
        .await;

    result
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
