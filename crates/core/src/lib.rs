pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod views;
pub mod workflow;

pub use audit::{AuditAction, AuditEvent};
pub use domain::request::{ApprovalStage, Request, RequestId, RequestStatus};
pub use domain::role::Role;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use views::{scope_for, RequestFilter};
pub use workflow::{Decision, DecisionStage, SubmitInput};
