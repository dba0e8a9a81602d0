//! Organization aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod manager;
mod permission;
mod repository;
mod role_definition;
mod role_instance;
mod state;
mod value_objects;

pub use aggregate::Organization;
pub use commands::*;
pub use events::{
    OrganizationCreatedData, OrganizationDeletedData, OrganizationEvent, RoleDefinitionData,
    RoleDefinitionRemovedData, RolesAssignedData, RolesRemovedData, UserData, messages,
};
pub use manager::OrganizationManager;
pub use permission::{ParameterSpec, Permission, PermissionDefinition};
pub use repository::OrganizationRepository;
pub use role_definition::{
    NewRoleDefinition, ParamMapping, ReverseParam, RoleDefinition, RoleDefinitionContent,
};
pub use role_instance::{RoleAssignment, RoleInstance};
pub use state::OrganizationStatus;
pub use value_objects::{RoleDefinitionId, RoleInstanceId, UserId};

use thiserror::Error;

/// Errors raised by the organization aggregate and its entities.
#[derive(Debug, Error)]
pub enum OrganizationError {
    /// Malformed or missing command input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An entity with the same identity already exists.
    #[error("{entity} already exists: {id}")]
    Conflict { entity: &'static str, id: String },

    /// The organization cannot accept the operation in its current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl OrganizationError {
    pub fn validation(message: impl Into<String>) -> Self {
        OrganizationError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        OrganizationError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn conflict(entity: &'static str, id: impl std::fmt::Display) -> Self {
        OrganizationError::Conflict {
            entity,
            id: id.to_string(),
        }
    }
}
