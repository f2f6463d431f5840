use async_trait::async_trait;
use thiserror::Error;

use wardstock_core::audit::AuditEvent;
use wardstock_core::domain::request::{ApprovalStage, Request, RequestId};
use wardstock_core::errors::{ApplicationError, DomainError};
use wardstock_core::views::RequestFilter;
use wardstock_core::workflow::Decision;

pub mod memory;
pub mod request;

pub use memory::InMemoryRequestRepository;
pub use request::SqlRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("request not found: {0}")]
    NotFound(RequestId),
    #[error("state conflict: operation expects stage {expected:?} but request is {actual:?}")]
    StateConflict { expected: ApprovalStage, actual: ApprovalStage },
    #[error("validation failed: {0}")]
    Validation(String),
}

impl RepositoryError {
    pub fn into_application(self) -> ApplicationError {
        match self {
            Self::Database(error) => ApplicationError::Persistence(error.to_string()),
            Self::Decode(message) => ApplicationError::Persistence(message),
            Self::NotFound(id) => ApplicationError::NotFound(id.to_string()),
            Self::StateConflict { expected, actual } => {
                ApplicationError::Domain(DomainError::StateConflict { expected, actual })
            }
            Self::Validation(message) => {
                ApplicationError::Domain(DomainError::Validation(message))
            }
        }
    }
}

/// The persistence boundary of the workflow: create, conditional update,
/// query. Decisions go through `apply_decision` only; no caller writes
/// approval flags or `status` directly.
#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn create(&self, request: Request) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError>;

    async fn list(&self, filter: &RequestFilter) -> Result<Vec<Request>, RepositoryError>;

    /// Single-row conditional update guarded by the decision's expected
    /// stage. Exactly one of two racing approvers succeeds; the other gets
    /// `StateConflict`.
    async fn apply_decision(
        &self,
        id: &RequestId,
        decision: &Decision,
    ) -> Result<Request, RepositoryError>;

    async fn audit_trail(&self, id: &RequestId) -> Result<Vec<AuditEvent>, RepositoryError>;
}
