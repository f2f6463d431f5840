use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// One seeded request per workflow stage worth demonstrating.
const SEED_REQUESTS: &[SeedRequestContract] = &[
    SeedRequestContract {
        request_id: "req-demo-001",
        status: "pending",
        manager_approved: false,
        project_manager_approved: false,
        rejected: false,
        requested_by: "emp-ward-01",
        expected_audit_count: 1,
        description: "consumables order awaiting the manager",
    },
    SeedRequestContract {
        request_id: "req-demo-002",
        status: "pending",
        manager_approved: true,
        project_manager_approved: false,
        rejected: false,
        requested_by: "emp-ward-02",
        expected_audit_count: 2,
        description: "equipment order awaiting the project manager",
    },
    SeedRequestContract {
        request_id: "req-demo-003",
        status: "rejected",
        manager_approved: false,
        project_manager_approved: false,
        rejected: true,
        requested_by: "emp-ward-01",
        expected_audit_count: 2,
        description: "request rejected at the manager stage",
    },
];

const SEED_AUDIT_IDS: &[&str] =
    &["aud-demo-001", "aud-demo-002", "aud-demo-003", "aud-demo-004", "aud-demo-005"];

/// Deterministic demo fixtures covering the three dashboard queues.
pub struct DemoDataset;

impl DemoDataset {
    /// SQL fixture content for the demo dataset.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the demo dataset. Re-running replaces the same rows.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let requests_seeded = SEED_REQUESTS
            .iter()
            .map(|seed| RequestSeedInfo {
                request_id: seed.request_id,
                description: seed.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { requests_seeded })
    }

    /// Verify that the seeded rows exist and match the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for seed in SEED_REQUESTS {
            let row_matches: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                     SELECT 1 FROM request
                     WHERE id = ?1 AND status = ?2 AND requested_by = ?3
                       AND manager_approved = ?4 AND project_manager_approved = ?5
                       AND (rejected_at IS NOT NULL) = ?6
                 )",
            )
            .bind(seed.request_id)
            .bind(seed.status)
            .bind(seed.requested_by)
            .bind(seed.manager_approved)
            .bind(seed.project_manager_approved)
            .bind(seed.rejected)
            .fetch_one(pool)
            .await?;
            checks.push((seed.request_id, row_matches == 1));

            let audit_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(1) FROM approval_audit_log WHERE request_id = ?1",
            )
            .bind(seed.request_id)
            .fetch_one(pool)
            .await?;
            checks.push((seed.audit_label(), audit_count == seed.expected_audit_count));
        }

        let quoted_audits = sql_array_from_ids(SEED_AUDIT_IDS);
        let audit_total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM approval_audit_log WHERE id IN {quoted_audits}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("audit-events", audit_total == SEED_AUDIT_IDS.len() as i64));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove seeded fixtures from a database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let quoted_audits = sql_array_from_ids(SEED_AUDIT_IDS);
        let quoted_requests = sql_array_from_ids(
            &SEED_REQUESTS.iter().map(|seed| seed.request_id).collect::<Vec<_>>(),
        );

        sqlx::query(&format!("DELETE FROM approval_audit_log WHERE id IN {quoted_audits}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM request WHERE id IN {quoted_requests}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedRequestContract {
    request_id: &'static str,
    status: &'static str,
    manager_approved: bool,
    project_manager_approved: bool,
    rejected: bool,
    requested_by: &'static str,
    expected_audit_count: i64,
    description: &'static str,
}

impl SeedRequestContract {
    fn audit_label(&self) -> &'static str {
        match self.request_id {
            "req-demo-001" => "req-demo-001-audit-count",
            "req-demo-002" => "req-demo-002-audit-count",
            _ => "req-demo-003-audit-count",
        }
    }
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub requests_seeded: Vec<RequestSeedInfo>,
}

#[derive(Debug)]
pub struct RequestSeedInfo {
    pub request_id: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use wardstock_core::config::DatabaseConfig;
    use wardstock_core::domain::request::ApprovalStage;
    use wardstock_core::views::RequestFilter;

    use super::DemoDataset;
    use crate::repositories::{RequestRepository, SqlRequestRepository};
    use crate::{connect, migrations};

    async fn memory_pool() -> crate::DbPool {
        connect(&DatabaseConfig::single_connection("sqlite::memory:")).await.expect("connect")
    }

    #[test]
    fn sql_fixture_is_valid() {
        assert!(!DemoDataset::SQL.is_empty());
    }

    #[tokio::test]
    async fn load_verify_and_reload_are_idempotent() {
        let pool = memory_pool().await;
        migrations::run_pending(&pool).await.expect("run migrations");

        let first = DemoDataset::load(&pool).await.expect("load fixtures");
        assert_eq!(first.requests_seeded.len(), 3);
        let first_verification = DemoDataset::verify(&pool).await.expect("verify fixtures");
        assert!(first_verification.all_present);

        let second = DemoDataset::load(&pool).await.expect("reload fixtures");
        assert_eq!(second.requests_seeded.len(), 3);
        let second_verification = DemoDataset::verify(&pool).await.expect("re-verify fixtures");
        assert!(second_verification.all_present);
        assert_eq!(first_verification.checks, second_verification.checks);
    }

    #[tokio::test]
    async fn seeded_rows_land_in_the_expected_queues() {
        let pool = memory_pool().await;
        migrations::run_pending(&pool).await.expect("run migrations");
        DemoDataset::load(&pool).await.expect("load fixtures");

        let repo = SqlRequestRepository::new(pool);

        let manager_queue = repo
            .list(&RequestFilter::for_stage(ApprovalStage::PendingManager))
            .await
            .expect("manager queue");
        assert_eq!(manager_queue.len(), 1);
        assert_eq!(manager_queue[0].id.0, "req-demo-001");

        let pm_queue = repo
            .list(&RequestFilter::for_stage(ApprovalStage::PendingProjectManager))
            .await
            .expect("pm queue");
        assert_eq!(pm_queue.len(), 1);
        assert_eq!(pm_queue[0].id.0, "req-demo-002");

        let rejected = repo
            .list(&RequestFilter::for_stage(ApprovalStage::Rejected))
            .await
            .expect("rejected");
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].id.0, "req-demo-003");
    }

    #[tokio::test]
    async fn clean_removes_all_seeded_rows() {
        let pool = memory_pool().await;
        migrations::run_pending(&pool).await.expect("run migrations");
        DemoDataset::load(&pool).await.expect("load fixtures");

        DemoDataset::clean(&pool).await.expect("clean fixtures");

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM request")
            .fetch_one(&pool)
            .await
            .expect("count requests");
        assert_eq!(remaining, 0);
    }
}
