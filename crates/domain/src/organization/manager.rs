//! Organization command manager.

use common::AggregateId;
use event_store::EventStore;

use crate::command::{Command, CommandResult, RetryPolicy, execute_with_retry};
use crate::error::DomainError;

use super::{
    AddRoleDefinition, AddUser, AssignRolesToUser, ChangeRoleDefinition, CreateOrganization,
    DeleteOrganization, Organization, OrganizationError, OrganizationRepository, Permission,
    RemoveRoleDefinition, RemoveRolesFromUser, RemoveUser, RoleDefinition, RoleDefinitionId,
    RoleInstanceId, UserId,
};

/// Executes organization commands as load, validate, persist cycles.
///
/// Every command body runs inside [`execute_with_retry`]: when the append
/// loses a race the organization is reloaded and the command is validated
/// again against the fresh state. The manager holds no state between calls.
pub struct OrganizationManager<S: EventStore> {
    repository: OrganizationRepository<S>,
    policy: RetryPolicy,
}

impl<S: EventStore> OrganizationManager<S> {
    /// Creates a manager with the default retry bound.
    pub fn new(store: S) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: S, policy: RetryPolicy) -> Self {
        Self {
            repository: OrganizationRepository::new(store),
            policy,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &OrganizationRepository<S> {
        &self.repository
    }

    /// Creates a new organization.
    ///
    /// An existing stream with the same id is reported as a conflict and is
    /// never retried.
    #[tracing::instrument(skip_all, fields(org_id = %cmd.org_id))]
    pub async fn create_organization(
        &self,
        cmd: CreateOrganization,
    ) -> Result<CommandResult<Organization>, DomainError> {
        let repository = &self.repository;
        let cmd = &cmd;

        execute_with_retry("create_organization", self.policy, move |attempt| async move {
            let mut org = Organization::default();
            org.create(cmd.org_id.clone(), cmd.name.clone())?;

            let event_id = repository
                .organization_created(&mut org)
                .await
                .map_err(|e| match e {
                    DomainError::OptimisticLock { stream_id, .. } => {
                        OrganizationError::conflict("organization", stream_id).into()
                    }
                    other => other,
                })?;

            Ok::<_, DomainError>(CommandResult {
                aggregate: org,
                output: (),
                event_id,
                attempts: attempt,
            })
        })
        .await
    }

    /// Adds a role definition to its owning organization.
    ///
    /// The definition (and its generated id) is built once, so every retry
    /// appends the same definition.
    #[tracing::instrument(skip_all, fields(org_id = %cmd.aggregate_id()))]
    pub async fn add_role_definition(
        &self,
        cmd: AddRoleDefinition,
    ) -> Result<CommandResult<Organization, RoleDefinitionId>, DomainError> {
        let definition = RoleDefinition::new(cmd.definition)?;
        let repository = &self.repository;
        let definition = &definition;

        execute_with_retry("add_role_definition", self.policy, move |attempt| async move {
            let mut org = repository.load(definition.org_id()).await?;
            let role_def_id = org.add_role_definition(definition.clone())?;
            let event_id = repository.role_definition_added(&mut org, &role_def_id).await?;

            Ok::<_, DomainError>(CommandResult {
                aggregate: org,
                output: role_def_id,
                event_id,
                attempts: attempt,
            })
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(org_id = %cmd.org_id, role_def_id = %cmd.role_def_id))]
    pub async fn change_role_definition(
        &self,
        cmd: ChangeRoleDefinition,
    ) -> Result<CommandResult<Organization>, DomainError> {
        let repository = &self.repository;
        let cmd = &cmd;

        execute_with_retry("change_role_definition", self.policy, move |attempt| async move {
            let mut org = repository.load(&cmd.org_id).await?;
            org.change_role_definition(&cmd.role_def_id, cmd.content.clone())?;
            let event_id = repository
                .role_definition_changed(&mut org, &cmd.role_def_id)
                .await?;

            Ok::<_, DomainError>(CommandResult {
                aggregate: org,
                output: (),
                event_id,
                attempts: attempt,
            })
        })
        .await
    }

    /// Removes a role definition; users lose every role bound to it.
    #[tracing::instrument(skip_all, fields(org_id = %cmd.org_id, role_def_id = %cmd.role_def_id))]
    pub async fn remove_role_definition(
        &self,
        cmd: RemoveRoleDefinition,
    ) -> Result<CommandResult<Organization>, DomainError> {
        let repository = &self.repository;
        let cmd = &cmd;

        execute_with_retry("remove_role_definition", self.policy, move |attempt| async move {
            let mut org = repository.load(&cmd.org_id).await?;
            org.remove_role_definition(&cmd.role_def_id)?;
            let event_id = repository
                .role_definition_removed(&mut org, &cmd.role_def_id)
                .await?;

            Ok::<_, DomainError>(CommandResult {
                aggregate: org,
                output: (),
                event_id,
                attempts: attempt,
            })
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(org_id = %cmd.org_id, user_id = %cmd.user_id))]
    pub async fn add_user(&self, cmd: AddUser) -> Result<CommandResult<Organization>, DomainError> {
        let repository = &self.repository;
        let cmd = &cmd;

        execute_with_retry("add_user", self.policy, move |attempt| async move {
            let mut org = repository.load(&cmd.org_id).await?;
            org.add_user(cmd.user_id.clone())?;
            let event_id = repository.user_added(&mut org, &cmd.user_id).await?;

            Ok::<_, DomainError>(CommandResult {
                aggregate: org,
                output: (),
                event_id,
                attempts: attempt,
            })
        })
        .await
    }

    /// Binds roles to a user and returns the resulting role instance ids.
    #[tracing::instrument(skip_all, fields(org_id = %cmd.org_id, user_id = %cmd.user_id))]
    pub async fn assign_roles_to_user(
        &self,
        cmd: AssignRolesToUser,
    ) -> Result<CommandResult<Organization, Vec<RoleInstanceId>>, DomainError> {
        let repository = &self.repository;
        let cmd = &cmd;

        execute_with_retry("assign_roles_to_user", self.policy, move |attempt| async move {
            let mut org = repository.load(&cmd.org_id).await?;
            let ids = org.assign_roles_to_user(&cmd.user_id, cmd.roles.clone())?;
            let event_id = repository
                .roles_assigned_to_user(&mut org, &cmd.user_id, &ids)
                .await?;

            Ok::<_, DomainError>(CommandResult {
                aggregate: org,
                output: ids,
                event_id,
                attempts: attempt,
            })
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(org_id = %cmd.org_id, user_id = %cmd.user_id))]
    pub async fn remove_roles_from_user(
        &self,
        cmd: RemoveRolesFromUser,
    ) -> Result<CommandResult<Organization>, DomainError> {
        let repository = &self.repository;
        let cmd = &cmd;

        execute_with_retry("remove_roles_from_user", self.policy, move |attempt| async move {
            let mut org = repository.load(&cmd.org_id).await?;
            org.remove_roles_from_user(&cmd.user_id, cmd.role_instance_ids.clone())?;
            let event_id = repository
                .roles_removed_from_user(&mut org, &cmd.user_id, &cmd.role_instance_ids)
                .await?;

            Ok::<_, DomainError>(CommandResult {
                aggregate: org,
                output: (),
                event_id,
                attempts: attempt,
            })
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(org_id = %cmd.org_id, user_id = %cmd.user_id))]
    pub async fn remove_user(
        &self,
        cmd: RemoveUser,
    ) -> Result<CommandResult<Organization>, DomainError> {
        let repository = &self.repository;
        let cmd = &cmd;

        execute_with_retry("remove_user", self.policy, move |attempt| async move {
            let mut org = repository.load(&cmd.org_id).await?;
            org.remove_user(&cmd.user_id)?;
            let event_id = repository.user_removed(&mut org, &cmd.user_id).await?;

            Ok::<_, DomainError>(CommandResult {
                aggregate: org,
                output: (),
                event_id,
                attempts: attempt,
            })
        })
        .await
    }

    /// Soft-deletes an organization.
    #[tracing::instrument(skip_all, fields(org_id = %cmd.org_id))]
    pub async fn delete_organization(
        &self,
        cmd: DeleteOrganization,
    ) -> Result<CommandResult<Organization>, DomainError> {
        let repository = &self.repository;
        let cmd = &cmd;

        execute_with_retry("delete_organization", self.policy, move |attempt| async move {
            let mut org = repository.load(&cmd.org_id).await?;
            org.delete()?;
            let event_id = repository.organization_deleted(&mut org).await?;

            Ok::<_, DomainError>(CommandResult {
                aggregate: org,
                output: (),
                event_id,
                attempts: attempt,
            })
        })
        .await
    }

    // Queries

    /// Loads an organization by ID.
    ///
    /// Returns None if the organization doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_organization(
        &self,
        org_id: &AggregateId,
    ) -> Result<Option<Organization>, DomainError> {
        self.repository.load_existing(org_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_role_definition(
        &self,
        org_id: &AggregateId,
        role_def_id: &RoleDefinitionId,
    ) -> Result<RoleDefinition, DomainError> {
        let org = self.repository.load(org_id).await?;
        Ok(org.get_role_definition(role_def_id)?.clone())
    }

    /// Resolves every permission a user holds in an organization.
    #[tracing::instrument(skip(self))]
    pub async fn user_permissions(
        &self,
        org_id: &AggregateId,
        user_id: &UserId,
    ) -> Result<Vec<Permission>, DomainError> {
        let org = self.repository.load(org_id).await?;
        Ok(org.user_permissions(user_id)?)
    }
}
