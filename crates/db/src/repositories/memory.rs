use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use wardstock_core::audit::{AuditAction, AuditEvent};
use wardstock_core::domain::request::{Request, RequestId};
use wardstock_core::errors::DomainError;
use wardstock_core::views::RequestFilter;
use wardstock_core::workflow::{self, Decision};

use super::{RepositoryError, RequestRepository};

/// Map-backed repository for tests and the smoke command. Decisions run the
/// same state machine as production code, under a single write lock so two
/// racing approvers still resolve to exactly one winner.
#[derive(Clone, Default)]
pub struct InMemoryRequestRepository {
    inner: Arc<RwLock<Store>>,
}

#[derive(Default)]
struct Store {
    requests: HashMap<String, Request>,
    audit: Vec<AuditEvent>,
}

impl InMemoryRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn create(&self, request: Request) -> Result<(), RepositoryError> {
        let mut store = self.inner.write().await;
        if store.requests.contains_key(&request.id.0) {
            return Err(RepositoryError::Validation(format!(
                "request {} already exists",
                request.id
            )));
        }
        store.audit.push(AuditEvent::new(
            request.id.clone(),
            AuditAction::Submitted,
            request.stage(),
            request.requested_by.clone(),
        ));
        store.requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let store = self.inner.read().await;
        Ok(store.requests.get(&id.0).cloned())
    }

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, RepositoryError> {
        let store = self.inner.read().await;
        let mut matching: Vec<Request> =
            store.requests.values().filter(|request| filter.matches(request)).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        Ok(matching)
    }

    async fn apply_decision(
        &self,
        id: &RequestId,
        decision: &Decision,
    ) -> Result<Request, RepositoryError> {
        let mut store = self.inner.write().await;
        let request = store
            .requests
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;

        workflow::apply(request, decision).map_err(|error| match error {
            DomainError::StateConflict { expected, actual } => {
                RepositoryError::StateConflict { expected, actual }
            }
            DomainError::Validation(message) => RepositoryError::Validation(message),
        })?;

        let updated = request.clone();
        store.audit.push(AuditEvent::new(
            id.clone(),
            AuditAction::for_decision(decision.stage, decision.approve),
            decision.stage.expected_stage(),
            decision.actor.clone(),
        ));
        Ok(updated)
    }

    async fn audit_trail(&self, id: &RequestId) -> Result<Vec<AuditEvent>, RepositoryError> {
        let store = self.inner.read().await;
        Ok(store.audit.iter().filter(|event| &event.request_id == id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use wardstock_core::audit::AuditAction;
    use wardstock_core::domain::request::{ApprovalStage, Request, RequestStatus};
    use wardstock_core::views::RequestFilter;
    use wardstock_core::workflow::{submit, Decision, DecisionStage, SubmitInput};

    use super::InMemoryRequestRepository;
    use crate::repositories::{RepositoryError, RequestRepository};

    fn sample_request(item_name: &str, requested_by: &str) -> Request {
        submit(SubmitInput {
            item_name: item_name.to_string(),
            quantity: 4,
            unit_price: Decimal::new(1999, 2),
            requested_by: requested_by.to_string(),
        })
        .expect("submit should validate")
    }

    #[tokio::test]
    async fn create_find_and_list_behave_like_the_sql_repository() {
        let repo = InMemoryRequestRepository::new();
        let request = sample_request("Bandages", "u-alice");

        repo.create(request.clone()).await.expect("create");
        let found = repo.find_by_id(&request.id).await.expect("find").expect("exists");
        assert_eq!(found, request);

        let queue = repo
            .list(&RequestFilter::for_stage(ApprovalStage::PendingManager))
            .await
            .expect("list");
        assert_eq!(queue.len(), 1);

        let others = repo.list(&RequestFilter::for_submitter("u-bob")).await.expect("list");
        assert!(others.is_empty());
    }

    #[tokio::test]
    async fn decisions_advance_the_request_and_record_audit_events() {
        let repo = InMemoryRequestRepository::new();
        let request = sample_request("Bandages", "u-alice");
        repo.create(request.clone()).await.expect("create");

        repo.apply_decision(&request.id, &Decision::new(DecisionStage::Manager, true, "u-manager"))
            .await
            .expect("manager approve");
        let approved = repo
            .apply_decision(
                &request.id,
                &Decision::new(DecisionStage::ProjectManager, true, "u-pm"),
            )
            .await
            .expect("pm approve");

        assert_eq!(approved.status(), RequestStatus::Approved);

        let trail = repo.audit_trail(&request.id).await.expect("trail");
        let actions: Vec<_> = trail.iter().map(|event| event.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::Submitted,
                AuditAction::ManagerApproved,
                AuditAction::ProjectManagerApproved,
            ]
        );
        let stages: Vec<_> = trail.iter().map(|event| event.stage).collect();
        assert_eq!(
            stages,
            vec![
                ApprovalStage::PendingManager,
                ApprovalStage::PendingManager,
                ApprovalStage::PendingProjectManager,
            ]
        );
    }

    #[tokio::test]
    async fn racing_manager_decisions_produce_exactly_one_winner() {
        let repo = InMemoryRequestRepository::new();
        let request = sample_request("Bandages", "u-alice");
        repo.create(request.clone()).await.expect("create");

        let first = {
            let repo = repo.clone();
            let id = request.id.clone();
            tokio::spawn(async move {
                repo.apply_decision(&id, &Decision::new(DecisionStage::Manager, true, "u-manager-1"))
                    .await
            })
        };
        let second = {
            let repo = repo.clone();
            let id = request.id.clone();
            tokio::spawn(async move {
                repo.apply_decision(
                    &id,
                    &Decision::new(DecisionStage::Manager, false, "u-manager-2"),
                )
                .await
            })
        };

        let outcomes = [first.await.expect("join"), second.await.expect("join")];
        let wins = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|outcome| {
                matches!(outcome, Err(RepositoryError::StateConflict { .. }))
            })
            .count();

        assert_eq!(wins, 1);
        assert_eq!(conflicts, 1);

        let stored = repo.find_by_id(&request.id).await.expect("find").expect("exists");
        assert!(stored.stage() == ApprovalStage::PendingProjectManager
            || stored.stage() == ApprovalStage::Rejected);
    }

    #[tokio::test]
    async fn self_decision_fails_validation() {
        let repo = InMemoryRequestRepository::new();
        let request = sample_request("Bandages", "u-alice");
        repo.create(request.clone()).await.expect("create");

        let error = repo
            .apply_decision(&request.id, &Decision::new(DecisionStage::Manager, true, "u-alice"))
            .await
            .expect_err("self-approval must fail");
        assert!(matches!(error, RepositoryError::Validation(_)));
    }
}
