//! Role-scoped query views: read-only projections of the request store.
//! Filters select, they never mutate; transitions stay in [`crate::workflow`].

use serde::{Deserialize, Serialize};

use crate::domain::request::{ApprovalStage, Request};
use crate::domain::role::Role;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFilter {
    pub stage: Option<ApprovalStage>,
    pub requested_by: Option<String>,
}

impl RequestFilter {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn for_stage(stage: ApprovalStage) -> Self {
        Self { stage: Some(stage), requested_by: None }
    }

    pub fn for_submitter(user: impl Into<String>) -> Self {
        Self { stage: None, requested_by: Some(user.into()) }
    }

    pub fn matches(&self, request: &Request) -> bool {
        if let Some(stage) = self.stage {
            if request.stage() != stage {
                return false;
            }
        }
        if let Some(requested_by) = &self.requested_by {
            if &request.requested_by != requested_by {
                return false;
            }
        }
        true
    }
}

/// The projection each dashboard role is allowed to see.
pub fn scope_for(role: Role, user: &str) -> RequestFilter {
    match role {
        Role::Manager => RequestFilter::for_stage(ApprovalStage::PendingManager),
        Role::ProjectManager => RequestFilter::for_stage(ApprovalStage::PendingProjectManager),
        Role::Employee | Role::Maintenance | Role::DocumentAnalyst => {
            RequestFilter::for_submitter(user)
        }
        Role::Admin | Role::Procurement => RequestFilter::unrestricted(),
    }
}
