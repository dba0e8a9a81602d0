//! Organization aggregate implementation.

use std::collections::BTreeMap;

use common::AggregateId;
use event_store::{EventEnvelope, Revision};
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, rehydrate};
use crate::error::DomainError;

use super::{
    OrganizationError, OrganizationEvent, OrganizationStatus, Permission, RoleAssignment,
    RoleDefinition, RoleDefinitionContent, RoleDefinitionId, RoleInstance, RoleInstanceId, UserId,
    events::{
        OrganizationCreatedData, OrganizationDeletedData, RoleDefinitionData,
        RoleDefinitionRemovedData, RolesAssignedData, RolesRemovedData, UserData,
    },
};

/// Organization aggregate root.
///
/// Owns the organization's role definitions and the role instances assigned
/// to its users. Every command validates against the current state and then
/// mutates it through [`Aggregate::apply`], the same path replay uses, so an
/// aggregate built command by command equals one rebuilt from its stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    id: Option<AggregateId>,

    #[serde(default)]
    revision: Revision,

    name: String,

    status: OrganizationStatus,

    role_definitions: BTreeMap<RoleDefinitionId, RoleDefinition>,

    /// Role instances per user, keyed by role instance id.
    users: BTreeMap<UserId, BTreeMap<RoleInstanceId, RoleInstance>>,
}

impl Aggregate for Organization {
    type Event = OrganizationEvent;
    type Error = OrganizationError;

    fn aggregate_type() -> &'static str {
        "Organization"
    }

    fn id(&self) -> Option<&AggregateId> {
        self.id.as_ref()
    }

    fn revision(&self) -> Revision {
        self.revision
    }

    fn set_revision(&mut self, revision: Revision) {
        self.revision = revision;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrganizationEvent::OrganizationCreated(data) => {
                self.id = Some(data.org_id);
                self.name = data.name;
                self.status = OrganizationStatus::Active;
            }
            OrganizationEvent::RoleDefinitionAdded(data)
            | OrganizationEvent::RoleDefinitionChanged(data) => {
                let definition = data.role_definition;
                self.role_definitions
                    .insert(definition.id().clone(), definition);
            }
            OrganizationEvent::RoleDefinitionRemoved(data) => {
                self.apply_role_definition_removed(&data.role_def_id)
            }
            OrganizationEvent::UserAdded(data) => {
                self.users.entry(data.user_id).or_default();
            }
            OrganizationEvent::RolesAssignedToUser(data) => {
                let roles = self.users.entry(data.user_id).or_default();
                for instance in data.roles {
                    roles.insert(instance.id().clone(), instance);
                }
            }
            OrganizationEvent::RolesRemovedFromUser(data) => {
                if let Some(roles) = self.users.get_mut(&data.user_id) {
                    for id in &data.role_instance_ids {
                        roles.remove(id);
                    }
                }
            }
            OrganizationEvent::UserRemoved(data) => {
                self.users.remove(&data.user_id);
            }
            OrganizationEvent::OrganizationDeleted(_) => {
                self.status = OrganizationStatus::Deleted;
            }
        }
    }
}

// Reconstruction
impl Organization {
    /// Rebuilds an organization purely from its events.
    ///
    /// The first event (by event id) must be `organizationCreated`.
    pub fn from_events(events: Vec<EventEnvelope>) -> Result<Self, DomainError> {
        rehydrate(Self::default(), events)
    }

    /// Rebuilds an organization from a serialized snapshot plus later events.
    ///
    /// Events already covered by the snapshot's revision are ignored.
    pub fn from_snapshot(
        snapshot: serde_json::Value,
        events: Vec<EventEnvelope>,
    ) -> Result<Self, DomainError> {
        let organization: Self = serde_json::from_value(snapshot)?;
        rehydrate(organization, events)
    }

    /// Serializes the current state as a plain snapshot.
    pub fn to_snapshot(&self) -> Result<serde_json::Value, DomainError> {
        Ok(serde_json::to_value(self)?)
    }
}

// Query methods
impl Organization {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> OrganizationStatus {
        self.status
    }

    pub fn is_deleted(&self) -> bool {
        self.status.is_terminal()
    }

    /// Returns a role definition by id.
    pub fn get_role_definition(
        &self,
        role_def_id: &RoleDefinitionId,
    ) -> Result<&RoleDefinition, OrganizationError> {
        self.role_definitions
            .get(role_def_id)
            .ok_or_else(|| OrganizationError::not_found("role definition", role_def_id))
    }

    pub fn role_definitions(&self) -> impl Iterator<Item = &RoleDefinition> {
        self.role_definitions.values()
    }

    pub fn has_user(&self, user_id: &UserId) -> bool {
        self.users.contains_key(user_id)
    }

    pub fn users(&self) -> impl Iterator<Item = &UserId> {
        self.users.keys()
    }

    /// Returns the role instances assigned to a user.
    pub fn user_roles(
        &self,
        user_id: &UserId,
    ) -> Result<&BTreeMap<RoleInstanceId, RoleInstance>, OrganizationError> {
        self.users
            .get(user_id)
            .ok_or_else(|| OrganizationError::not_found("user", user_id))
    }

    /// Resolves every permission granted to a user.
    pub fn user_permissions(&self, user_id: &UserId) -> Result<Vec<Permission>, OrganizationError> {
        let roles = self.user_roles(user_id)?;
        Ok(roles
            .values()
            .filter_map(|instance| {
                self.role_definitions
                    .get(instance.role_def_id())
                    .map(|definition| instance.permissions(definition))
            })
            .flatten()
            .collect())
    }
}

// Command methods (validate, then mutate through apply)
impl Organization {
    /// Creates the organization.
    pub fn create(
        &mut self,
        org_id: AggregateId,
        name: impl Into<String>,
    ) -> Result<(), OrganizationError> {
        if let Some(existing) = &self.id {
            return Err(OrganizationError::conflict("organization", existing));
        }
        if org_id.is_blank() {
            return Err(OrganizationError::validation("orgId must not be empty"));
        }
        let name = name.into();
        if name.trim().is_empty() {
            return Err(OrganizationError::validation(
                "organization name must not be empty",
            ));
        }

        self.apply(OrganizationEvent::OrganizationCreated(
            OrganizationCreatedData { org_id, name },
        ));
        Ok(())
    }

    /// Adds a role definition owned by this organization.
    pub fn add_role_definition(
        &mut self,
        definition: RoleDefinition,
    ) -> Result<RoleDefinitionId, OrganizationError> {
        self.ensure_active()?;
        self.ensure_owns(&definition)?;
        if self.role_definitions.contains_key(definition.id()) {
            return Err(OrganizationError::conflict(
                "role definition",
                definition.id(),
            ));
        }

        let role_def_id = definition.id().clone();
        self.apply(OrganizationEvent::RoleDefinitionAdded(RoleDefinitionData {
            role_definition: definition,
        }));
        Ok(role_def_id)
    }

    /// Replaces the content of an existing role definition.
    ///
    /// Every role instance already bound to the definition must still satisfy
    /// the new content.
    pub fn change_role_definition(
        &mut self,
        role_def_id: &RoleDefinitionId,
        content: RoleDefinitionContent,
    ) -> Result<(), OrganizationError> {
        self.ensure_active()?;
        let revised = self.get_role_definition(role_def_id)?.revise(content)?;

        for (user_id, roles) in &self.users {
            for instance in roles.values().filter(|r| r.role_def_id() == role_def_id) {
                if let Err(e) = RoleInstance::new(&revised, instance.values().clone()) {
                    return Err(OrganizationError::validation(format!(
                        "role instance {} of user {user_id} does not fit the new definition: {e}",
                        instance.id()
                    )));
                }
            }
        }

        self.apply(OrganizationEvent::RoleDefinitionChanged(
            RoleDefinitionData {
                role_definition: revised,
            },
        ));
        Ok(())
    }

    /// Removes a role definition and every role instance bound to it.
    pub fn remove_role_definition(
        &mut self,
        role_def_id: &RoleDefinitionId,
    ) -> Result<(), OrganizationError> {
        self.ensure_active()?;
        self.get_role_definition(role_def_id)?;

        self.apply(OrganizationEvent::RoleDefinitionRemoved(
            RoleDefinitionRemovedData {
                role_def_id: role_def_id.clone(),
            },
        ));
        Ok(())
    }

    /// Adds a user with no roles.
    pub fn add_user(&mut self, user_id: UserId) -> Result<(), OrganizationError> {
        self.ensure_active()?;
        if user_id.is_blank() {
            return Err(OrganizationError::validation("userId must not be empty"));
        }
        if self.users.contains_key(&user_id) {
            return Err(OrganizationError::conflict("user", &user_id));
        }

        self.apply(OrganizationEvent::UserAdded(UserData { user_id }));
        Ok(())
    }

    /// Binds role definitions to a user.
    ///
    /// Returns the ids of the resulting role instances, in input order.
    pub fn assign_roles_to_user(
        &mut self,
        user_id: &UserId,
        assignments: Vec<RoleAssignment>,
    ) -> Result<Vec<RoleInstanceId>, OrganizationError> {
        self.ensure_active()?;
        if assignments.is_empty() {
            return Err(OrganizationError::validation(
                "at least one role must be assigned",
            ));
        }
        self.user_roles(user_id)?;

        let roles = assignments
            .into_iter()
            .map(|assignment| {
                let definition = self.get_role_definition(&assignment.role_def_id)?;
                RoleInstance::new(definition, assignment.values)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let ids = roles.iter().map(|r| r.id().clone()).collect();

        self.apply(OrganizationEvent::RolesAssignedToUser(RolesAssignedData {
            user_id: user_id.clone(),
            roles,
        }));
        Ok(ids)
    }

    /// Removes role instances from a user.
    pub fn remove_roles_from_user(
        &mut self,
        user_id: &UserId,
        role_instance_ids: Vec<RoleInstanceId>,
    ) -> Result<(), OrganizationError> {
        self.ensure_active()?;
        if role_instance_ids.is_empty() {
            return Err(OrganizationError::validation(
                "at least one role must be removed",
            ));
        }
        let roles = self.user_roles(user_id)?;
        if let Some(missing) = role_instance_ids.iter().find(|id| !roles.contains_key(*id)) {
            return Err(OrganizationError::not_found("role instance", missing));
        }

        self.apply(OrganizationEvent::RolesRemovedFromUser(RolesRemovedData {
            user_id: user_id.clone(),
            role_instance_ids,
        }));
        Ok(())
    }

    /// Removes a user together with all of their roles.
    pub fn remove_user(&mut self, user_id: &UserId) -> Result<(), OrganizationError> {
        self.ensure_active()?;
        self.user_roles(user_id)?;

        self.apply(OrganizationEvent::UserRemoved(UserData {
            user_id: user_id.clone(),
        }));
        Ok(())
    }

    /// Soft-deletes the organization.
    pub fn delete(&mut self) -> Result<(), OrganizationError> {
        self.ensure_active()?;

        self.apply(OrganizationEvent::OrganizationDeleted(
            OrganizationDeletedData {},
        ));
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), OrganizationError> {
        match &self.id {
            None => Err(OrganizationError::InvalidState(
                "organization has not been created".to_string(),
            )),
            Some(id) if self.status.is_terminal() => Err(OrganizationError::InvalidState(
                format!("organization {id} is deleted"),
            )),
            Some(_) => Ok(()),
        }
    }

    fn ensure_owns(&self, definition: &RoleDefinition) -> Result<(), OrganizationError> {
        if self.id.as_ref() != Some(definition.org_id()) {
            return Err(OrganizationError::validation(format!(
                "role definition {} belongs to organization {}",
                definition.id(),
                definition.org_id()
            )));
        }
        Ok(())
    }
}

// Apply event helpers
impl Organization {
    fn apply_role_definition_removed(&mut self, role_def_id: &RoleDefinitionId) {
        self.role_definitions.remove(role_def_id);
        for roles in self.users.values_mut() {
            roles.retain(|_, instance| instance.role_def_id() != role_def_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DomainEvent;
    use crate::organization::{
        NewRoleDefinition, ParamMapping, ParameterSpec, PermissionDefinition,
    };
    use event_store::EventId;

    fn waiter_content() -> RoleDefinitionContent {
        let take = PermissionDefinition::new(
            "orders",
            "take",
            "Take orders",
            [(
                "locationId".to_string(),
                ParameterSpec::required("Location", ""),
            )],
        )
        .unwrap();

        RoleDefinitionContent::new("Waiter")
            .param(
                "location",
                ParamMapping::new("Location", "", true, ["orders:take:locationId"]),
            )
            .permission(take)
    }

    fn risto() -> Organization {
        let mut org = Organization::default();
        org.create(AggregateId::from("risto"), "Risto").unwrap();
        org
    }

    fn waiter_for(org: &Organization) -> RoleDefinition {
        RoleDefinition::new(NewRoleDefinition::for_organization(
            org.id().unwrap().clone(),
            waiter_content(),
        ))
        .unwrap()
    }

    #[test]
    fn create_sets_identity_and_name() {
        let org = risto();
        assert_eq!(org.id().unwrap().as_str(), "risto");
        assert_eq!(org.name(), "Risto");
        assert_eq!(org.status(), OrganizationStatus::Active);
    }

    #[test]
    fn create_twice_is_a_conflict() {
        let mut org = risto();
        let err = org.create(AggregateId::from("other"), "Other").unwrap_err();
        assert!(matches!(err, OrganizationError::Conflict { .. }));
    }

    #[test]
    fn create_requires_a_name() {
        let mut org = Organization::default();
        let err = org.create(AggregateId::from("risto"), " ").unwrap_err();
        assert!(matches!(err, OrganizationError::Validation(_)));
    }

    #[test]
    fn commands_on_uncreated_organization_are_rejected() {
        let mut org = Organization::default();
        let err = org.add_user(UserId::new("u")).unwrap_err();
        assert!(matches!(err, OrganizationError::InvalidState(_)));
    }

    #[test]
    fn role_definition_ids_are_unique() {
        let mut org = risto();
        let definition = waiter_for(&org);

        org.add_role_definition(definition.clone()).unwrap();
        let err = org.add_role_definition(definition).unwrap_err();
        assert!(matches!(err, OrganizationError::Conflict { .. }));
    }

    #[test]
    fn foreign_role_definition_is_rejected() {
        let mut org = risto();
        let foreign = RoleDefinition::new(NewRoleDefinition::for_organization(
            AggregateId::from("elsewhere"),
            waiter_content(),
        ))
        .unwrap();

        let err = org.add_role_definition(foreign).unwrap_err();
        assert!(matches!(err, OrganizationError::Validation(_)));
    }

    #[test]
    fn get_unknown_role_definition_is_not_found() {
        let org = risto();
        let err = org
            .get_role_definition(&RoleDefinitionId::from("nope"))
            .unwrap_err();
        assert!(matches!(err, OrganizationError::NotFound { .. }));
    }

    #[test]
    fn duplicate_user_is_a_conflict() {
        let mut org = risto();
        org.add_user(UserId::new("anna")).unwrap();
        let err = org.add_user(UserId::new("anna")).unwrap_err();
        assert!(matches!(err, OrganizationError::Conflict { .. }));
    }

    #[test]
    fn assigning_roles_requires_existing_user_and_definition() {
        let mut org = risto();
        let role_def_id = org.add_role_definition(waiter_for(&org)).unwrap();

        let assignment = RoleAssignment::new(role_def_id.clone()).value("location", "milano");
        let err = org
            .assign_roles_to_user(&UserId::new("ghost"), vec![assignment.clone()])
            .unwrap_err();
        assert!(matches!(err, OrganizationError::NotFound { entity: "user", .. }));

        org.add_user(UserId::new("anna")).unwrap();
        let err = org
            .assign_roles_to_user(
                &UserId::new("anna"),
                vec![RoleAssignment::new("cook").value("location", "milano")],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            OrganizationError::NotFound {
                entity: "role definition",
                ..
            }
        ));

        let ids = org
            .assign_roles_to_user(&UserId::new("anna"), vec![assignment])
            .unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(org.user_roles(&UserId::new("anna")).unwrap().len(), 1);
    }

    #[test]
    fn assigning_without_required_value_fails_and_leaves_state_untouched() {
        let mut org = risto();
        let role_def_id = org.add_role_definition(waiter_for(&org)).unwrap();
        org.add_user(UserId::new("anna")).unwrap();
        let before = org.clone();

        let err = org
            .assign_roles_to_user(&UserId::new("anna"), vec![RoleAssignment::new(role_def_id)])
            .unwrap_err();
        assert!(matches!(err, OrganizationError::Validation(_)));
        assert_eq!(org, before);
    }

    #[test]
    fn removing_unknown_role_instance_is_not_found() {
        let mut org = risto();
        org.add_user(UserId::new("anna")).unwrap();

        let err = org
            .remove_roles_from_user(&UserId::new("anna"), vec![RoleInstanceId::new("x")])
            .unwrap_err();
        assert!(matches!(err, OrganizationError::NotFound { .. }));
    }

    #[test]
    fn removing_role_definition_cascades_to_instances() {
        let mut org = risto();
        let role_def_id = org.add_role_definition(waiter_for(&org)).unwrap();
        let anna = UserId::new("anna");
        org.add_user(anna.clone()).unwrap();
        org.assign_roles_to_user(
            &anna,
            vec![RoleAssignment::new(role_def_id.clone()).value("location", "milano")],
        )
        .unwrap();

        org.remove_role_definition(&role_def_id).unwrap();

        assert!(org.get_role_definition(&role_def_id).is_err());
        assert!(org.user_roles(&anna).unwrap().is_empty());
        assert!(org.has_user(&anna));
    }

    #[test]
    fn change_role_definition_keeps_identity() {
        let mut org = risto();
        let role_def_id = org.add_role_definition(waiter_for(&org)).unwrap();

        org.change_role_definition(&role_def_id, waiter_content().description("Head waiter"))
            .unwrap();

        let definition = org.get_role_definition(&role_def_id).unwrap();
        assert_eq!(definition.description(), "Head waiter");
    }

    #[test]
    fn change_role_definition_must_fit_assigned_instances() {
        let mut org = risto();
        let role_def_id = org.add_role_definition(waiter_for(&org)).unwrap();
        let anna = UserId::new("anna");
        org.add_user(anna.clone()).unwrap();
        org.assign_roles_to_user(
            &anna,
            vec![RoleAssignment::new(role_def_id.clone()).value("location", "milano")],
        )
        .unwrap();
        let before = org.clone();

        let take_shift = PermissionDefinition::new(
            "orders",
            "take",
            "Take orders",
            [
                (
                    "locationId".to_string(),
                    ParameterSpec::required("Location", ""),
                ),
                ("shiftId".to_string(), ParameterSpec::required("Shift", "")),
            ],
        )
        .unwrap();
        let with_shift = RoleDefinitionContent::new("Waiter")
            .param(
                "location",
                ParamMapping::new("Location", "", true, ["orders:take:locationId"]),
            )
            .param(
                "shift",
                ParamMapping::new("Shift", "", true, ["orders:take:shiftId"]),
            )
            .permission(take_shift);

        let err = org
            .change_role_definition(&role_def_id, with_shift)
            .unwrap_err();
        assert!(matches!(err, OrganizationError::Validation(_)));
        assert_eq!(org, before);

        org.change_role_definition(&role_def_id, waiter_content().description("Head waiter"))
            .unwrap();
        assert_eq!(org.user_roles(&anna).unwrap().len(), 1);
    }

    #[test]
    fn user_permissions_are_resolved() {
        let mut org = risto();
        let role_def_id = org.add_role_definition(waiter_for(&org)).unwrap();
        let anna = UserId::new("anna");
        org.add_user(anna.clone()).unwrap();
        org.assign_roles_to_user(
            &anna,
            vec![RoleAssignment::new(role_def_id).value("location", "milano")],
        )
        .unwrap();

        let permissions = org.user_permissions(&anna).unwrap();
        assert_eq!(permissions.len(), 1);
        assert_eq!(permissions[0].values.get("locationId").unwrap(), "milano");
    }

    #[test]
    fn remove_user_drops_roles() {
        let mut org = risto();
        let anna = UserId::new("anna");
        org.add_user(anna.clone()).unwrap();
        org.remove_user(&anna).unwrap();

        assert!(!org.has_user(&anna));
        assert!(matches!(
            org.remove_user(&anna),
            Err(OrganizationError::NotFound { .. })
        ));
    }

    #[test]
    fn deleted_organization_rejects_every_mutation() {
        let mut org = risto();
        org.add_user(UserId::new("anna")).unwrap();
        org.delete().unwrap();

        assert!(org.is_deleted());
        assert!(matches!(
            org.add_user(UserId::new("bob")),
            Err(OrganizationError::InvalidState(_))
        ));
        assert!(matches!(
            org.remove_user(&UserId::new("anna")),
            Err(OrganizationError::InvalidState(_))
        ));
        assert!(matches!(
            org.add_role_definition(waiter_for(&org)),
            Err(OrganizationError::InvalidState(_))
        ));
        assert!(matches!(org.delete(), Err(OrganizationError::InvalidState(_))));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut org = risto();
        org.add_user(UserId::new("anna")).unwrap();

        let snapshot = org.to_snapshot().unwrap();
        let restored = Organization::from_snapshot(snapshot, vec![]).unwrap();
        assert_eq!(restored, org);
    }

    fn stream(events: &[OrganizationEvent]) -> Vec<EventEnvelope> {
        events
            .iter()
            .zip(1..)
            .map(|(event, id)| {
                EventEnvelope::new(
                    AggregateId::from("risto"),
                    EventId::new(id),
                    event.message(),
                    event.to_payload().unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn snapshot_plus_later_events_matches_full_replay() {
        let user = |name: &str| UserData {
            user_id: UserId::new(name),
        };
        let events = stream(&[
            OrganizationEvent::OrganizationCreated(OrganizationCreatedData {
                org_id: AggregateId::from("risto"),
                name: "Risto".to_string(),
            }),
            OrganizationEvent::UserAdded(user("anna")),
            OrganizationEvent::UserAdded(user("bob")),
            OrganizationEvent::UserRemoved(user("anna")),
            OrganizationEvent::UserAdded(user("carla")),
        ]);

        let full = Organization::from_events(events.clone()).unwrap();
        let at_three = Organization::from_events(events[..3].to_vec()).unwrap();
        assert_eq!(at_three.revision(), EventId::new(3));

        // The whole stream is passed; ids 1..=3 are already in the snapshot.
        let restored =
            Organization::from_snapshot(at_three.to_snapshot().unwrap(), events.clone()).unwrap();
        assert_eq!(restored, full);
        assert_eq!(restored.revision(), EventId::new(5));
        assert!(!restored.has_user(&UserId::new("anna")));
        assert!(restored.has_user(&UserId::new("carla")));

        let tail_only =
            Organization::from_snapshot(at_three.to_snapshot().unwrap(), events[3..].to_vec())
                .unwrap();
        assert_eq!(tail_only, full);
    }
}
