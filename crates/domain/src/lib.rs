//! Domain layer for the organization access-control core.
//!
//! This crate provides:
//! - Aggregate and DomainEvent traits with stream replay
//! - AggregateRepository with expected-revision appends
//! - A bounded optimistic retry loop for commands
//! - The Organization aggregate, its entities and its command manager

pub mod aggregate;
pub mod command;
pub mod error;
pub mod organization;
pub mod repository;

pub use aggregate::{Aggregate, DomainEvent, rehydrate};
pub use command::{
    Command, CommandResult, DEFAULT_MAX_ATTEMPTS, RetryPolicy, execute_with_retry,
};
pub use error::DomainError;
pub use organization::{
    AddRoleDefinition, AddUser, AssignRolesToUser, ChangeRoleDefinition, CreateOrganization,
    DeleteOrganization, NewRoleDefinition, Organization, OrganizationError, OrganizationEvent,
    OrganizationManager, OrganizationRepository, OrganizationStatus, ParamMapping, ParameterSpec,
    Permission, PermissionDefinition, RemoveRoleDefinition, RemoveRolesFromUser, RemoveUser,
    RoleAssignment, RoleDefinition, RoleDefinitionContent, RoleDefinitionId, RoleInstance,
    RoleInstanceId, UserId, messages,
};
pub use repository::AggregateRepository;
