//! Organization lifecycle status.

use serde::{Deserialize, Serialize};

/// The status of an organization.
///
/// ```text
/// Active ──► Deleted
/// ```
///
/// `Deleted` is terminal: a deleted organization accepts no further mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationStatus {
    #[default]
    Active,

    /// Soft-deleted (terminal state).
    Deleted,
}

impl OrganizationStatus {
    /// Returns true if the organization accepts mutations.
    pub fn is_active(&self) -> bool {
        matches!(self, OrganizationStatus::Active)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrganizationStatus::Deleted)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationStatus::Active => "active",
            OrganizationStatus::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for OrganizationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
