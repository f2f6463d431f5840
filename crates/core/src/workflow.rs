//! The approval state machine. Every request mutation in the system goes
//! through `submit` and the two decide operations here; repositories and
//! handlers never write approval flags on their own.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::request::{ApprovalStage, Request, RequestId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmitInput {
    pub item_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub requested_by: String,
}

/// Which approval stage a decision targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStage {
    Manager,
    ProjectManager,
}

impl DecisionStage {
    /// The stage a request must be in for this decision to be legal.
    pub fn expected_stage(&self) -> ApprovalStage {
        match self {
            Self::Manager => ApprovalStage::PendingManager,
            Self::ProjectManager => ApprovalStage::PendingProjectManager,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::ProjectManager => "project_manager",
        }
    }
}

/// One approve-or-reject action by a stage approver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub stage: DecisionStage,
    pub approve: bool,
    pub actor: String,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn new(stage: DecisionStage, approve: bool, actor: impl Into<String>) -> Self {
        Self { stage, approve, actor: actor.into(), decided_at: Utc::now() }
    }
}

/// Create a request in `PendingManager` with all approval flags false.
pub fn submit(input: SubmitInput) -> Result<Request, DomainError> {
    let item_name = input.item_name.trim();
    if item_name.is_empty() {
        return Err(DomainError::Validation("item_name must not be empty".to_owned()));
    }
    if input.quantity == 0 {
        return Err(DomainError::Validation("quantity must be greater than zero".to_owned()));
    }
    if input.unit_price < Decimal::ZERO {
        return Err(DomainError::Validation("unit_price must not be negative".to_owned()));
    }
    let requested_by = input.requested_by.trim();
    if requested_by.is_empty() {
        return Err(DomainError::Validation("requested_by must not be empty".to_owned()));
    }

    let now = Utc::now();
    Ok(Request {
        id: RequestId(Uuid::new_v4().to_string()),
        item_name: item_name.to_owned(),
        quantity: input.quantity,
        unit_price: input.unit_price,
        requested_by: requested_by.to_owned(),
        manager_approved: false,
        manager_approved_by: None,
        manager_approved_at: None,
        project_manager_approved: false,
        project_manager_approved_by: None,
        project_manager_approved_at: None,
        rejected_by: None,
        rejected_at: None,
        created_at: now,
        updated_at: now,
    })
}

/// First-stage decision. Legal only while the request is `PendingManager`.
pub fn manager_decide(
    request: &mut Request,
    approve: bool,
    actor: &str,
    decided_at: DateTime<Utc>,
) -> Result<(), DomainError> {
    apply(request, &Decision {
        stage: DecisionStage::Manager,
        approve,
        actor: actor.to_owned(),
        decided_at,
    })
}

/// Second-stage decision. Legal only after manager approval.
pub fn project_manager_decide(
    request: &mut Request,
    approve: bool,
    actor: &str,
    decided_at: DateTime<Utc>,
) -> Result<(), DomainError> {
    apply(request, &Decision {
        stage: DecisionStage::ProjectManager,
        approve,
        actor: actor.to_owned(),
        decided_at,
    })
}

/// Apply a decision to an in-memory request. The SQL repository encodes the
/// same expected-state guard as a conditional single-row update.
pub fn apply(request: &mut Request, decision: &Decision) -> Result<(), DomainError> {
    let expected = decision.stage.expected_stage();
    let actual = request.stage();
    if actual != expected {
        return Err(DomainError::StateConflict { expected, actual });
    }

    let actor = decision.actor.trim();
    if actor.is_empty() {
        return Err(DomainError::Validation("decision actor must not be empty".to_owned()));
    }
    if actor == request.requested_by {
        return Err(DomainError::Validation(
            "approvers cannot decide their own submissions".to_owned(),
        ));
    }

    if decision.approve {
        match decision.stage {
            DecisionStage::Manager => {
                request.manager_approved = true;
                request.manager_approved_by = Some(actor.to_owned());
                request.manager_approved_at = Some(decision.decided_at);
            }
            DecisionStage::ProjectManager => {
                request.project_manager_approved = true;
                request.project_manager_approved_by = Some(actor.to_owned());
                request.project_manager_approved_at = Some(decision.decided_at);
            }
        }
    } else {
        request.rejected_by = Some(actor.to_owned());
        request.rejected_at = Some(decision.decided_at);
    }

    request.updated_at = decision.decided_at;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::request::{ApprovalStage, Request, RequestStatus};
    use crate::errors::DomainError;

    use super::{manager_decide, project_manager_decide, submit, SubmitInput};

    fn gloves() -> SubmitInput {
        SubmitInput {
            item_name: "Gloves".to_string(),
            quantity: 10,
            unit_price: Decimal::new(250, 2),
            requested_by: "u-employee".to_string(),
        }
    }

    fn submitted() -> Request {
        submit(gloves()).expect("submit should succeed")
    }

    #[test]
    fn submit_derives_total_value() {
        let request = submitted();

        assert_eq!(request.total_value(), Decimal::new(2500, 2));
        assert_eq!(request.stage(), ApprovalStage::PendingManager);
        assert!(!request.manager_approved);
        assert!(!request.project_manager_approved);
    }

    #[test]
    fn submit_rejects_zero_quantity() {
        let error = submit(SubmitInput { quantity: 0, ..gloves() }).expect_err("must fail");
        assert!(matches!(error, DomainError::Validation(ref reason) if reason.contains("quantity")));
    }

    #[test]
    fn submit_rejects_blank_item_name() {
        let error =
            submit(SubmitInput { item_name: "  ".to_string(), ..gloves() }).expect_err("must fail");
        assert!(matches!(error, DomainError::Validation(_)));
    }

    #[test]
    fn submit_rejects_negative_unit_price() {
        let error = submit(SubmitInput { unit_price: Decimal::new(-1, 0), ..gloves() })
            .expect_err("must fail");
        assert!(matches!(error, DomainError::Validation(_)));
    }

    #[test]
    fn full_approval_chain_reaches_approved() {
        let mut request = submitted();

        manager_decide(&mut request, true, "u-manager", Utc::now()).expect("manager approve");
        assert_eq!(request.stage(), ApprovalStage::PendingProjectManager);
        assert_eq!(request.status(), RequestStatus::Pending);
        assert_eq!(request.manager_approved_by.as_deref(), Some("u-manager"));
        assert!(request.manager_approved_at.is_some());

        project_manager_decide(&mut request, true, "u-pm", Utc::now()).expect("pm approve");
        assert_eq!(request.stage(), ApprovalStage::Approved);
        assert_eq!(request.status(), RequestStatus::Approved);
        assert!(request.manager_approved && request.project_manager_approved);
    }

    #[test]
    fn manager_rejection_is_terminal() {
        let mut request = submitted();

        manager_decide(&mut request, false, "u-manager", Utc::now()).expect("manager reject");
        assert_eq!(request.status(), RequestStatus::Rejected);
        assert!(!request.manager_approved);

        let error = project_manager_decide(&mut request, true, "u-pm", Utc::now())
            .expect_err("decide after rejection must fail");
        assert!(matches!(error, DomainError::StateConflict { .. }));
    }

    #[test]
    fn project_manager_cannot_skip_manager_stage() {
        let mut request = submitted();

        let error = project_manager_decide(&mut request, true, "u-pm", Utc::now())
            .expect_err("pm decide before manager must fail");
        assert_eq!(
            error,
            DomainError::StateConflict {
                expected: ApprovalStage::PendingProjectManager,
                actual: ApprovalStage::PendingManager,
            }
        );
        assert!(!request.project_manager_approved);
    }

    #[test]
    fn second_manager_decision_conflicts() {
        let mut request = submitted();

        manager_decide(&mut request, true, "u-manager", Utc::now()).expect("first decision");
        let error = manager_decide(&mut request, true, "u-manager-2", Utc::now())
            .expect_err("second decision must fail");
        assert!(matches!(error, DomainError::StateConflict { .. }));
    }

    #[test]
    fn terminal_approved_request_accepts_no_further_decisions() {
        let mut request = submitted();
        manager_decide(&mut request, true, "u-manager", Utc::now()).expect("manager approve");
        project_manager_decide(&mut request, true, "u-pm", Utc::now()).expect("pm approve");

        for approve in [true, false] {
            assert!(matches!(
                manager_decide(&mut request, approve, "u-manager", Utc::now()),
                Err(DomainError::StateConflict { .. })
            ));
            assert!(matches!(
                project_manager_decide(&mut request, approve, "u-pm", Utc::now()),
                Err(DomainError::StateConflict { .. })
            ));
        }
    }

    #[test]
    fn pm_approval_implies_manager_approval() {
        let mut request = submitted();
        manager_decide(&mut request, true, "u-manager", Utc::now()).expect("manager approve");
        project_manager_decide(&mut request, true, "u-pm", Utc::now()).expect("pm approve");

        assert!(!request.project_manager_approved || request.manager_approved);
    }

    #[test]
    fn submitter_cannot_approve_own_request() {
        let mut request = submitted();

        let error = manager_decide(&mut request, true, "u-employee", Utc::now())
            .expect_err("self-approval must fail");
        assert!(matches!(error, DomainError::Validation(_)));
        assert!(!request.manager_approved);
    }
}
