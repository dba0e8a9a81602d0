//! Organization commands.

use common::AggregateId;

use crate::command::Command;

use super::{
    NewRoleDefinition, Organization, RoleAssignment, RoleDefinitionContent, RoleDefinitionId,
    RoleInstanceId, UserId,
};

/// Command to create a new organization.
#[derive(Debug, Clone)]
pub struct CreateOrganization {
    /// The organization ID to create.
    pub org_id: AggregateId,

    pub name: String,
}

impl CreateOrganization {
    /// Creates the command with a generated organization ID.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            org_id: AggregateId::new(),
            name: name.into(),
        }
    }

    /// Creates the command with a caller-chosen organization ID.
    pub fn with_id(org_id: impl Into<AggregateId>, name: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            name: name.into(),
        }
    }
}

impl Command for CreateOrganization {
    type Aggregate = Organization;

    fn aggregate_id(&self) -> AggregateId {
        self.org_id.clone()
    }
}

/// Command to add a role definition.
///
/// The target stream is the definition's owner: the given organization, or
/// `default` for templates.
#[derive(Debug, Clone)]
pub struct AddRoleDefinition {
    pub definition: NewRoleDefinition,
}

impl AddRoleDefinition {
    pub fn new(definition: NewRoleDefinition) -> Self {
        Self { definition }
    }
}

impl Command for AddRoleDefinition {
    type Aggregate = Organization;

    fn aggregate_id(&self) -> AggregateId {
        self.definition
            .org_id
            .clone()
            .unwrap_or_else(AggregateId::default_organization)
    }
}

/// Command to replace the content of a role definition.
#[derive(Debug, Clone)]
pub struct ChangeRoleDefinition {
    pub org_id: AggregateId,
    pub role_def_id: RoleDefinitionId,
    pub content: RoleDefinitionContent,
}

impl ChangeRoleDefinition {
    pub fn new(
        org_id: impl Into<AggregateId>,
        role_def_id: impl Into<RoleDefinitionId>,
        content: RoleDefinitionContent,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            role_def_id: role_def_id.into(),
            content,
        }
    }
}

impl Command for ChangeRoleDefinition {
    type Aggregate = Organization;

    fn aggregate_id(&self) -> AggregateId {
        self.org_id.clone()
    }
}

/// Command to remove a role definition.
#[derive(Debug, Clone)]
pub struct RemoveRoleDefinition {
    pub org_id: AggregateId,
    pub role_def_id: RoleDefinitionId,
}

impl RemoveRoleDefinition {
    pub fn new(org_id: impl Into<AggregateId>, role_def_id: impl Into<RoleDefinitionId>) -> Self {
        Self {
            org_id: org_id.into(),
            role_def_id: role_def_id.into(),
        }
    }
}

impl Command for RemoveRoleDefinition {
    type Aggregate = Organization;

    fn aggregate_id(&self) -> AggregateId {
        self.org_id.clone()
    }
}

/// Command to add a user to an organization.
#[derive(Debug, Clone)]
pub struct AddUser {
    pub org_id: AggregateId,
    pub user_id: UserId,
}

impl AddUser {
    pub fn new(org_id: impl Into<AggregateId>, user_id: impl Into<UserId>) -> Self {
        Self {
            org_id: org_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl Command for AddUser {
    type Aggregate = Organization;

    fn aggregate_id(&self) -> AggregateId {
        self.org_id.clone()
    }
}

/// Command to bind roles to a user.
#[derive(Debug, Clone)]
pub struct AssignRolesToUser {
    pub org_id: AggregateId,
    pub user_id: UserId,
    pub roles: Vec<RoleAssignment>,
}

impl AssignRolesToUser {
    pub fn new(
        org_id: impl Into<AggregateId>,
        user_id: impl Into<UserId>,
        roles: Vec<RoleAssignment>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            user_id: user_id.into(),
            roles,
        }
    }
}

impl Command for AssignRolesToUser {
    type Aggregate = Organization;

    fn aggregate_id(&self) -> AggregateId {
        self.org_id.clone()
    }
}

/// Command to remove role instances from a user.
#[derive(Debug, Clone)]
pub struct RemoveRolesFromUser {
    pub org_id: AggregateId,
    pub user_id: UserId,
    pub role_instance_ids: Vec<RoleInstanceId>,
}

impl RemoveRolesFromUser {
    pub fn new(
        org_id: impl Into<AggregateId>,
        user_id: impl Into<UserId>,
        role_instance_ids: Vec<RoleInstanceId>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            user_id: user_id.into(),
            role_instance_ids,
        }
    }
}

impl Command for RemoveRolesFromUser {
    type Aggregate = Organization;

    fn aggregate_id(&self) -> AggregateId {
        self.org_id.clone()
    }
}

/// Command to remove a user and all of their roles.
#[derive(Debug, Clone)]
pub struct RemoveUser {
    pub org_id: AggregateId,
    pub user_id: UserId,
}

impl RemoveUser {
    pub fn new(org_id: impl Into<AggregateId>, user_id: impl Into<UserId>) -> Self {
        Self {
            org_id: org_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl Command for RemoveUser {
    type Aggregate = Organization;

    fn aggregate_id(&self) -> AggregateId {
        self.org_id.clone()
    }
}

/// Command to soft-delete an organization.
#[derive(Debug, Clone)]
pub struct DeleteOrganization {
    pub org_id: AggregateId,
}

impl DeleteOrganization {
    pub fn new(org_id: impl Into<AggregateId>) -> Self {
        Self {
            org_id: org_id.into(),
        }
    }
}

impl Command for DeleteOrganization {
    type Aggregate = Organization;

    fn aggregate_id(&self) -> AggregateId {
        self.org_id.clone()
    }
}
