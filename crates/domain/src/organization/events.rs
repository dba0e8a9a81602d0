//! Organization domain events.

use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{RoleDefinition, RoleDefinitionId, RoleInstance, RoleInstanceId, UserId};

/// Wire names of the organization events.
pub mod messages {
    pub const ORGANIZATION_CREATED: &str = "organizationCreated";
    pub const ROLE_DEFINITION_ADDED: &str = "roleDefinitionAdded";
    pub const ROLE_DEFINITION_CHANGED: &str = "roleDefinitionChanged";
    pub const ROLE_DEFINITION_REMOVED: &str = "roleDefinitionRemoved";
    pub const USER_ADDED: &str = "userAdded";
    pub const ROLES_ASSIGNED_TO_USER: &str = "rolesAssignedToUser";
    pub const ROLES_REMOVED_FROM_USER: &str = "rolesRemovedFromUser";
    pub const USER_REMOVED: &str = "userRemoved";
    pub const ORGANIZATION_DELETED: &str = "organizationDeleted";

    /// Every message an organization stream can contain.
    pub const ALL: [&str; 9] = [
        ORGANIZATION_CREATED,
        ROLE_DEFINITION_ADDED,
        ROLE_DEFINITION_CHANGED,
        ROLE_DEFINITION_REMOVED,
        USER_ADDED,
        ROLES_ASSIGNED_TO_USER,
        ROLES_REMOVED_FROM_USER,
        USER_REMOVED,
        ORGANIZATION_DELETED,
    ];
}

/// Events that can occur on an organization aggregate.
///
/// The serde tag is the event `message` and the content is its `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", content = "payload", rename_all = "camelCase")]
pub enum OrganizationEvent {
    OrganizationCreated(OrganizationCreatedData),
    RoleDefinitionAdded(RoleDefinitionData),
    RoleDefinitionChanged(RoleDefinitionData),
    RoleDefinitionRemoved(RoleDefinitionRemovedData),
    UserAdded(UserData),
    RolesAssignedToUser(RolesAssignedData),
    RolesRemovedFromUser(RolesRemovedData),
    UserRemoved(UserData),
    OrganizationDeleted(OrganizationDeletedData),
}

impl DomainEvent for OrganizationEvent {
    fn message(&self) -> &'static str {
        match self {
            OrganizationEvent::OrganizationCreated(_) => messages::ORGANIZATION_CREATED,
            OrganizationEvent::RoleDefinitionAdded(_) => messages::ROLE_DEFINITION_ADDED,
            OrganizationEvent::RoleDefinitionChanged(_) => messages::ROLE_DEFINITION_CHANGED,
            OrganizationEvent::RoleDefinitionRemoved(_) => messages::ROLE_DEFINITION_REMOVED,
            OrganizationEvent::UserAdded(_) => messages::USER_ADDED,
            OrganizationEvent::RolesAssignedToUser(_) => messages::ROLES_ASSIGNED_TO_USER,
            OrganizationEvent::RolesRemovedFromUser(_) => messages::ROLES_REMOVED_FROM_USER,
            OrganizationEvent::UserRemoved(_) => messages::USER_REMOVED,
            OrganizationEvent::OrganizationDeleted(_) => messages::ORGANIZATION_DELETED,
        }
    }

    fn is_creation(&self) -> bool {
        matches!(self, OrganizationEvent::OrganizationCreated(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationCreatedData {
    pub org_id: AggregateId,
    pub name: String,
}

/// Payload of `roleDefinitionAdded` and `roleDefinitionChanged`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinitionData {
    pub role_definition: RoleDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinitionRemovedData {
    pub role_def_id: RoleDefinitionId,
}

/// Payload of `userAdded` and `userRemoved`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolesAssignedData {
    pub user_id: UserId,
    pub roles: Vec<RoleInstance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolesRemovedData {
    pub user_id: UserId,
    pub role_instance_ids: Vec<RoleInstanceId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationDeletedData {}
