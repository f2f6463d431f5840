use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Dashboard roles recognized by the workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Employee,
    Procurement,
    ProjectManager,
    Maintenance,
    DocumentAnalyst,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Employee => "employee",
            Self::Procurement => "procurement",
            Self::ProjectManager => "project_manager",
            Self::Maintenance => "maintenance",
            Self::DocumentAnalyst => "document_analyst",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "manager" => Ok(Self::Manager),
            "employee" => Ok(Self::Employee),
            "procurement" => Ok(Self::Procurement),
            "project_manager" => Ok(Self::ProjectManager),
            "maintenance" => Ok(Self::Maintenance),
            "document_analyst" => Ok(Self::DocumentAnalyst),
            other => Err(DomainError::Validation(format!("unknown role `{other}`"))),
        }
    }
}
