use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::request::{ApprovalStage, RequestId};
use crate::workflow::DecisionStage;

/// Workflow actions worth an audit trail entry. Rejections carry the stage
/// they happened at, which is where manager-stage and project-manager-stage
/// rejections stay distinguishable even though both derive `rejected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Submitted,
    ManagerApproved,
    ManagerRejected,
    ProjectManagerApproved,
    ProjectManagerRejected,
}

impl AuditAction {
    pub fn for_decision(stage: DecisionStage, approve: bool) -> Self {
        match (stage, approve) {
            (DecisionStage::Manager, true) => Self::ManagerApproved,
            (DecisionStage::Manager, false) => Self::ManagerRejected,
            (DecisionStage::ProjectManager, true) => Self::ProjectManagerApproved,
            (DecisionStage::ProjectManager, false) => Self::ProjectManagerRejected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::ManagerApproved => "manager_approved",
            Self::ManagerRejected => "manager_rejected",
            Self::ProjectManagerApproved => "project_manager_approved",
            Self::ProjectManagerRejected => "project_manager_rejected",
        }
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "submitted" => Ok(Self::Submitted),
            "manager_approved" => Ok(Self::ManagerApproved),
            "manager_rejected" => Ok(Self::ManagerRejected),
            "project_manager_approved" => Ok(Self::ProjectManagerApproved),
            "project_manager_rejected" => Ok(Self::ProjectManagerRejected),
            other => Err(format!("unknown audit action `{other}`")),
        }
    }
}

/// One audit trail entry. `stage` is the stage the request was in when the
/// action ran, `outcome` records whether the action took effect; only
/// successful actions are written today, but the column keeps room for
/// recording refused ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub request_id: RequestId,
    pub action: AuditAction,
    pub stage: ApprovalStage,
    pub actor: String,
    pub outcome: String,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        request_id: RequestId,
        action: AuditAction,
        stage: ApprovalStage,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            request_id,
            action,
            stage,
            actor: actor.into(),
            outcome: "success".to_string(),
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::request::{ApprovalStage, RequestId};
    use crate::workflow::DecisionStage;

    use super::{AuditAction, AuditEvent};

    #[test]
    fn rejection_actions_keep_the_stage_distinguishable() {
        assert_eq!(
            AuditAction::for_decision(DecisionStage::Manager, false),
            AuditAction::ManagerRejected
        );
        assert_eq!(
            AuditAction::for_decision(DecisionStage::ProjectManager, false),
            AuditAction::ProjectManagerRejected
        );
        assert_ne!(
            AuditAction::ManagerRejected.as_str(),
            AuditAction::ProjectManagerRejected.as_str()
        );
    }

    #[test]
    fn new_event_records_stage_and_successful_outcome() {
        let event = AuditEvent::new(
            RequestId("REQ-1".to_string()),
            AuditAction::ManagerApproved,
            ApprovalStage::PendingManager,
            "u-manager",
        );

        assert_eq!(event.stage, ApprovalStage::PendingManager);
        assert_eq!(event.outcome, "success");
        assert_eq!(event.actor, "u-manager");
    }

    #[test]
    fn action_survives_its_stored_form() {
        for action in [
            AuditAction::Submitted,
            AuditAction::ManagerApproved,
            AuditAction::ManagerRejected,
            AuditAction::ProjectManagerApproved,
            AuditAction::ProjectManagerRejected,
        ] {
            assert_eq!(action.as_str().parse::<AuditAction>(), Ok(action));
        }
        assert!("retracted".parse::<AuditAction>().is_err());
    }
}
