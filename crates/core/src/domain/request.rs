use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coarse status exposed to dashboards. Always derived from the approval
/// flags, never stored as independent truth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Position of a request in the two-stage approval chain, derived from the
/// flag pairs and the rejection marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStage {
    PendingManager,
    PendingProjectManager,
    Approved,
    Rejected,
}

impl ApprovalStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    pub fn status(&self) -> RequestStatus {
        match self {
            Self::PendingManager | Self::PendingProjectManager => RequestStatus::Pending,
            Self::Approved => RequestStatus::Approved,
            Self::Rejected => RequestStatus::Rejected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingManager => "pending_manager",
            Self::PendingProjectManager => "pending_project_manager",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ApprovalStage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending_manager" => Ok(Self::PendingManager),
            "pending_project_manager" => Ok(Self::PendingProjectManager),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown approval stage `{other}`")),
        }
    }
}

/// A procurement/inventory request moving through the approval workflow.
///
/// Each approval flag triple is set together, exactly once, by the matching
/// decide operation in [`crate::workflow`]; no other call site writes flags.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub item_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub requested_by: String,
    pub manager_approved: bool,
    pub manager_approved_by: Option<String>,
    pub manager_approved_at: Option<DateTime<Utc>>,
    pub project_manager_approved: bool,
    pub project_manager_approved_by: Option<String>,
    pub project_manager_approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// Derived total, recomputed from the inputs on every read.
    pub fn total_value(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }

    pub fn stage(&self) -> ApprovalStage {
        if self.rejected_at.is_some() {
            ApprovalStage::Rejected
        } else if self.project_manager_approved {
            ApprovalStage::Approved
        } else if self.manager_approved {
            ApprovalStage::PendingProjectManager
        } else {
            ApprovalStage::PendingManager
        }
    }

    pub fn status(&self) -> RequestStatus {
        self.stage().status()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{ApprovalStage, Request, RequestId, RequestStatus};

    fn request() -> Request {
        let now = Utc::now();
        Request {
            id: RequestId("REQ-1".to_string()),
            item_name: "Gloves".to_string(),
            quantity: 10,
            unit_price: Decimal::new(250, 2),
            requested_by: "u-employee".to_string(),
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
        }
    }

    #[test]
    fn total_value_is_quantity_times_unit_price() {
        assert_eq!(request().total_value(), Decimal::new(2500, 2));
    }

    #[test]
    fn fresh_request_is_pending_manager() {
        let request = request();
        assert_eq!(request.stage(), ApprovalStage::PendingManager);
        assert_eq!(request.status(), RequestStatus::Pending);
    }

    #[test]
    fn manager_flag_alone_moves_to_pending_project_manager() {
        let mut request = request();
        request.manager_approved = true;

        assert_eq!(request.stage(), ApprovalStage::PendingProjectManager);
        assert_eq!(request.status(), RequestStatus::Pending);
    }

    #[test]
    fn both_flags_derive_approved() {
        let mut request = request();
        request.manager_approved = true;
        request.project_manager_approved = true;

        assert_eq!(request.stage(), ApprovalStage::Approved);
        assert_eq!(request.status(), RequestStatus::Approved);
        assert!(request.stage().is_terminal());
    }

    #[test]
    fn rejection_marker_wins_over_flags() {
        let mut request = request();
        request.manager_approved = true;
        request.rejected_by = Some("u-pm".to_string());
        request.rejected_at = Some(Utc::now());

        assert_eq!(request.stage(), ApprovalStage::Rejected);
        assert_eq!(request.status(), RequestStatus::Rejected);
        assert!(request.stage().is_terminal());
    }
}
