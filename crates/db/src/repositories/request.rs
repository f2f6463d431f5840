use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use wardstock_core::audit::{AuditAction, AuditEvent};
use wardstock_core::domain::request::{ApprovalStage, Request, RequestId};
use wardstock_core::views::RequestFilter;
use wardstock_core::workflow::{Decision, DecisionStage};

use super::{RepositoryError, RequestRepository};
use crate::DbPool;

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const REQUEST_COLUMNS: &str = "id, item_name, quantity, unit_price, requested_by,
        manager_approved, manager_approved_by, manager_approved_at,
        project_manager_approved, project_manager_approved_by, project_manager_approved_at,
        rejected_by, rejected_at, created_at, updated_at";

/// SQL predicate equivalent of [`Request::stage`]. Stored `status` only ever
/// changes in the same statement as the flags, so the pair stays consistent.
fn stage_predicate(stage: ApprovalStage) -> &'static str {
    match stage {
        ApprovalStage::PendingManager => "status = 'pending' AND manager_approved = 0",
        ApprovalStage::PendingProjectManager => {
            "status = 'pending' AND manager_approved = 1 AND project_manager_approved = 0"
        }
        ApprovalStage::Approved => "status = 'approved'",
        ApprovalStage::Rejected => "status = 'rejected'",
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<Request, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let item_name: String =
        row.try_get("item_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let quantity: u32 =
        row.try_get("quantity").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let unit_price_str: String =
        row.try_get("unit_price").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let requested_by: String =
        row.try_get("requested_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_approved: bool =
        row.try_get("manager_approved").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_approved_by: Option<String> =
        row.try_get("manager_approved_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let manager_approved_at_str: Option<String> =
        row.try_get("manager_approved_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let project_manager_approved: bool = row
        .try_get("project_manager_approved")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let project_manager_approved_by: Option<String> = row
        .try_get("project_manager_approved_by")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let project_manager_approved_at_str: Option<String> = row
        .try_get("project_manager_approved_at")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let rejected_by: Option<String> =
        row.try_get("rejected_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let rejected_at_str: Option<String> =
        row.try_get("rejected_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let updated_at_str: String =
        row.try_get("updated_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let unit_price = Decimal::from_str(&unit_price_str)
        .map_err(|e| RepositoryError::Decode(format!("invalid unit_price `{unit_price_str}`: {e}")))?;

    Ok(Request {
        id: RequestId(id),
        item_name,
        quantity,
        unit_price,
        requested_by,
        manager_approved,
        manager_approved_by,
        manager_approved_at: manager_approved_at_str.as_deref().map(parse_timestamp).transpose()?,
        project_manager_approved,
        project_manager_approved_by,
        project_manager_approved_at: project_manager_approved_at_str
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
        rejected_by,
        rejected_at: rejected_at_str.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at_str)?,
        updated_at: parse_timestamp(&updated_at_str)?,
    })
}

async fn insert_audit_row<'e, E>(
    executor: E,
    request_id: &RequestId,
    action: AuditAction,
    stage: &str,
    actor: &str,
    occurred_at: DateTime<Utc>,
) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO approval_audit_log (id, request_id, action, stage, actor, outcome, occurred_at)
         VALUES (?, ?, ?, ?, ?, 'success', ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&request_id.0)
    .bind(action.as_str())
    .bind(stage)
    .bind(actor)
    .bind(occurred_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn create(&self, request: Request) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO request (id, item_name, quantity, unit_price, total_value, status,
                                  requested_by,
                                  manager_approved, manager_approved_by, manager_approved_at,
                                  project_manager_approved, project_manager_approved_by,
                                  project_manager_approved_at,
                                  rejected_by, rejected_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.item_name)
        .bind(request.quantity)
        .bind(request.unit_price.to_string())
        .bind(request.total_value().to_string())
        .bind(request.status().as_str())
        .bind(&request.requested_by)
        .bind(request.manager_approved)
        .bind(&request.manager_approved_by)
        .bind(request.manager_approved_at.map(|dt| dt.to_rfc3339()))
        .bind(request.project_manager_approved)
        .bind(&request.project_manager_approved_by)
        .bind(request.project_manager_approved_at.map(|dt| dt.to_rfc3339()))
        .bind(&request.rejected_by)
        .bind(request.rejected_at.map(|dt| dt.to_rfc3339()))
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        insert_audit_row(
            &mut *tx,
            &request.id,
            AuditAction::Submitted,
            request.stage().as_str(),
            &request.requested_by,
            request.created_at,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM request WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_request(r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, RepositoryError> {
        let mut builder =
            QueryBuilder::new(format!("SELECT {REQUEST_COLUMNS} FROM request WHERE 1 = 1"));

        if let Some(stage) = filter.stage {
            builder.push(" AND ");
            builder.push(stage_predicate(stage));
        }
        if let Some(requested_by) = &filter.requested_by {
            builder.push(" AND requested_by = ");
            builder.push_bind(requested_by);
        }
        builder.push(" ORDER BY created_at DESC, id DESC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_request).collect::<Result<Vec<_>, _>>()
    }

    async fn apply_decision(
        &self,
        id: &RequestId,
        decision: &Decision,
    ) -> Result<Request, RepositoryError> {
        let actor = decision.actor.trim();
        if actor.is_empty() {
            return Err(RepositoryError::Validation(
                "decision actor must not be empty".to_owned(),
            ));
        }

        let decided_at = decision.decided_at.to_rfc3339();
        let expected = decision.stage.expected_stage();

        // The expected-state predicate makes this a compare-and-set: of two
        // approvers racing on the same stage, exactly one update matches.
        let update = match (decision.stage, decision.approve) {
            (DecisionStage::Manager, true) => sqlx::query(
                "UPDATE request
                 SET manager_approved = 1, manager_approved_by = ?, manager_approved_at = ?,
                     updated_at = ?
                 WHERE id = ? AND status = 'pending' AND manager_approved = 0
                   AND requested_by <> ?",
            ),
            (DecisionStage::Manager, false) => sqlx::query(
                "UPDATE request
                 SET status = 'rejected', rejected_by = ?, rejected_at = ?, updated_at = ?
                 WHERE id = ? AND status = 'pending' AND manager_approved = 0
                   AND requested_by <> ?",
            ),
            (DecisionStage::ProjectManager, true) => sqlx::query(
                "UPDATE request
                 SET project_manager_approved = 1, project_manager_approved_by = ?,
                     project_manager_approved_at = ?, status = 'approved', updated_at = ?
                 WHERE id = ? AND status = 'pending' AND manager_approved = 1
                   AND project_manager_approved = 0 AND requested_by <> ?",
            ),
            (DecisionStage::ProjectManager, false) => sqlx::query(
                "UPDATE request
                 SET status = 'rejected', rejected_by = ?, rejected_at = ?, updated_at = ?
                 WHERE id = ? AND status = 'pending' AND manager_approved = 1
                   AND project_manager_approved = 0 AND requested_by <> ?",
            ),
        };

        // The flag write and its audit row commit together; a failed audit
        // insert rolls the decision back.
        let mut tx = self.pool.begin().await?;

        let result = update
            .bind(actor)
            .bind(&decided_at)
            .bind(&decided_at)
            .bind(&id.0)
            .bind(actor)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;

            let current = self
                .find_by_id(id)
                .await?
                .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;

            if current.stage() == expected && current.requested_by == actor {
                return Err(RepositoryError::Validation(
                    "approvers cannot decide their own submissions".to_owned(),
                ));
            }
            return Err(RepositoryError::StateConflict { expected, actual: current.stage() });
        }

        insert_audit_row(
            &mut *tx,
            id,
            AuditAction::for_decision(decision.stage, decision.approve),
            expected.as_str(),
            actor,
            decision.decided_at,
        )
        .await?;

        tx.commit().await?;

        self.find_by_id(id).await?.ok_or_else(|| RepositoryError::NotFound(id.clone()))
    }

    async fn audit_trail(&self, id: &RequestId) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, request_id, action, stage, actor, outcome, occurred_at
             FROM approval_audit_log WHERE request_id = ? ORDER BY occurred_at ASC, id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let event_id: String =
                    row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let request_id: String = row
                    .try_get("request_id")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let action_str: String =
                    row.try_get("action").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let stage_str: String =
                    row.try_get("stage").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let actor: String =
                    row.try_get("actor").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let outcome: String =
                    row.try_get("outcome").map_err(|e| RepositoryError::Decode(e.to_string()))?;
                let occurred_at_str: String = row
                    .try_get("occurred_at")
                    .map_err(|e| RepositoryError::Decode(e.to_string()))?;

                Ok(AuditEvent {
                    event_id,
                    request_id: RequestId(request_id),
                    action: AuditAction::from_str(&action_str).map_err(RepositoryError::Decode)?,
                    stage: ApprovalStage::from_str(&stage_str).map_err(RepositoryError::Decode)?,
                    actor,
                    outcome,
                    occurred_at: parse_timestamp(&occurred_at_str)?,
                })
            })
            .collect()
    }
}
