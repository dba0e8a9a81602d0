//! Typed persistence for organization commands.

use common::AggregateId;
use event_store::{EventId, EventStore};

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::repository::AggregateRepository;

use super::{
    Organization, OrganizationError, OrganizationEvent, RoleDefinitionId, RoleInstanceId, UserId,
    events::{
        OrganizationCreatedData, OrganizationDeletedData, RoleDefinitionData,
        RoleDefinitionRemovedData, RolesAssignedData, RolesRemovedData, UserData,
    },
};

/// Repository for organization streams.
pub type OrganizationRepository<S> = AggregateRepository<S, Organization>;

/// One wrapper per command. Each derives the event from the in-memory
/// organization after the command has run and appends it at the
/// organization's current revision.
impl<S: EventStore> AggregateRepository<S, Organization> {
    pub async fn organization_created(
        &self,
        org: &mut Organization,
    ) -> Result<EventId, DomainError> {
        let org_id = stream_id(org)?;
        let event = OrganizationEvent::OrganizationCreated(OrganizationCreatedData {
            org_id: org_id.clone(),
            name: org.name().to_string(),
        });
        self.commit(&org_id, org, &event).await
    }

    pub async fn role_definition_added(
        &self,
        org: &mut Organization,
        role_def_id: &RoleDefinitionId,
    ) -> Result<EventId, DomainError> {
        let event = OrganizationEvent::RoleDefinitionAdded(RoleDefinitionData {
            role_definition: org.get_role_definition(role_def_id)?.clone(),
        });
        self.commit(&stream_id(org)?, org, &event).await
    }

    pub async fn role_definition_changed(
        &self,
        org: &mut Organization,
        role_def_id: &RoleDefinitionId,
    ) -> Result<EventId, DomainError> {
        let event = OrganizationEvent::RoleDefinitionChanged(RoleDefinitionData {
            role_definition: org.get_role_definition(role_def_id)?.clone(),
        });
        self.commit(&stream_id(org)?, org, &event).await
    }

    pub async fn role_definition_removed(
        &self,
        org: &mut Organization,
        role_def_id: &RoleDefinitionId,
    ) -> Result<EventId, DomainError> {
        let event = OrganizationEvent::RoleDefinitionRemoved(RoleDefinitionRemovedData {
            role_def_id: role_def_id.clone(),
        });
        self.commit(&stream_id(org)?, org, &event).await
    }

    pub async fn user_added(
        &self,
        org: &mut Organization,
        user_id: &UserId,
    ) -> Result<EventId, DomainError> {
        if !org.has_user(user_id) {
            return Err(OrganizationError::not_found("user", user_id).into());
        }
        let event = OrganizationEvent::UserAdded(UserData {
            user_id: user_id.clone(),
        });
        self.commit(&stream_id(org)?, org, &event).await
    }

    /// Records the listed role instances, copied from the user's current roles.
    pub async fn roles_assigned_to_user(
        &self,
        org: &mut Organization,
        user_id: &UserId,
        role_instance_ids: &[RoleInstanceId],
    ) -> Result<EventId, DomainError> {
        let roles = org.user_roles(user_id)?;
        let roles = role_instance_ids
            .iter()
            .map(|id| {
                roles
                    .get(id)
                    .cloned()
                    .ok_or_else(|| OrganizationError::not_found("role instance", id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let event = OrganizationEvent::RolesAssignedToUser(RolesAssignedData {
            user_id: user_id.clone(),
            roles,
        });
        self.commit(&stream_id(org)?, org, &event).await
    }

    pub async fn roles_removed_from_user(
        &self,
        org: &mut Organization,
        user_id: &UserId,
        role_instance_ids: &[RoleInstanceId],
    ) -> Result<EventId, DomainError> {
        let event = OrganizationEvent::RolesRemovedFromUser(RolesRemovedData {
            user_id: user_id.clone(),
            role_instance_ids: role_instance_ids.to_vec(),
        });
        self.commit(&stream_id(org)?, org, &event).await
    }

    pub async fn user_removed(
        &self,
        org: &mut Organization,
        user_id: &UserId,
    ) -> Result<EventId, DomainError> {
        let event = OrganizationEvent::UserRemoved(UserData {
            user_id: user_id.clone(),
        });
        self.commit(&stream_id(org)?, org, &event).await
    }

    pub async fn organization_deleted(
        &self,
        org: &mut Organization,
    ) -> Result<EventId, DomainError> {
        if !org.is_deleted() {
            return Err(OrganizationError::InvalidState(
                "organization is not marked deleted".to_string(),
            )
            .into());
        }
        let event = OrganizationEvent::OrganizationDeleted(OrganizationDeletedData {});
        self.commit(&stream_id(org)?, org, &event).await
    }
}

fn stream_id(org: &Organization) -> Result<AggregateId, DomainError> {
    org.id().cloned().ok_or_else(|| {
        OrganizationError::InvalidState("organization has not been created".to_string()).into()
    })
}
