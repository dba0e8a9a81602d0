//! Organizations read model: one summary row per organization stream.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use common::AggregateId;
use domain::{
    DomainEvent, OrganizationEvent, OrganizationStatus, RoleDefinitionId, RoleInstanceId, UserId,
    messages,
};
use event_store::EventEnvelope;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::Projection;
use crate::read_model::ReadModel;

/// Denormalized view of one organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationSummary {
    pub org_id: AggregateId,
    pub name: String,
    pub status: OrganizationStatus,
    /// Role definition names by id.
    pub role_definitions: BTreeMap<RoleDefinitionId, String>,
    /// Each user's role instances, mapped to the definition they bind.
    pub users: BTreeMap<UserId, BTreeMap<RoleInstanceId, RoleDefinitionId>>,
}

impl OrganizationSummary {
    fn new(org_id: AggregateId, name: String) -> Self {
        Self {
            org_id,
            name,
            status: OrganizationStatus::Active,
            role_definitions: BTreeMap::new(),
            users: BTreeMap::new(),
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Role instance ids assigned to a user, empty for an unknown user.
    pub fn user_roles(&self, user_id: &UserId) -> Vec<RoleInstanceId> {
        self.users
            .get(user_id)
            .map(|roles| roles.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn apply(&mut self, event: OrganizationEvent) {
        match event {
            OrganizationEvent::OrganizationCreated(data) => {
                self.name = data.name;
            }
            OrganizationEvent::RoleDefinitionAdded(data)
            | OrganizationEvent::RoleDefinitionChanged(data) => {
                let definition = data.role_definition;
                self.role_definitions
                    .insert(definition.id().clone(), definition.name().to_string());
            }
            OrganizationEvent::RoleDefinitionRemoved(data) => {
                self.role_definitions.remove(&data.role_def_id);
                for roles in self.users.values_mut() {
                    roles.retain(|_, role_def_id| *role_def_id != data.role_def_id);
                }
            }
            OrganizationEvent::UserAdded(data) => {
                self.users.entry(data.user_id).or_default();
            }
            OrganizationEvent::RolesAssignedToUser(data) => {
                let roles = self.users.entry(data.user_id).or_default();
                for instance in data.roles {
                    roles.insert(instance.id().clone(), instance.role_def_id().clone());
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

/// Read model of every organization, keyed by stream id.
///
/// Every write is an upsert or a removal, so applying the same event twice
/// leaves the row unchanged.
#[derive(Clone, Default)]
pub struct OrganizationView {
    organizations: Arc<RwLock<HashMap<AggregateId, OrganizationSummary>>>,
    writes: Arc<AtomicU64>,
}

impl OrganizationView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the summary of a specific organization.
    pub async fn get_organization(&self, org_id: &AggregateId) -> Option<OrganizationSummary> {
        self.organizations.read().await.get(org_id).cloned()
    }

    /// Gets every organization, ordered by id.
    pub async fn get_all(&self) -> Vec<OrganizationSummary> {
        let mut all: Vec<_> = self.organizations.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.org_id.as_str().cmp(b.org_id.as_str()));
        all
    }

    /// Number of events written to this view so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadModel for OrganizationView {
    fn name(&self) -> &'static str {
        "OrganizationView"
    }

    async fn count(&self) -> usize {
        self.organizations.read().await.len()
    }
}

#[async_trait]
impl Projection for OrganizationView {
    fn name(&self) -> &'static str {
        "OrganizationView"
    }

    fn handles(&self, message: &str) -> bool {
        messages::ALL.contains(&message)
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let org_event = OrganizationEvent::from_message(&event.message, event.payload.clone())?;

        let mut organizations = self.organizations.write().await;
        match org_event {
            OrganizationEvent::OrganizationCreated(data) => {
                organizations
                    .entry(event.stream_id.clone())
                    .or_insert_with(|| OrganizationSummary::new(data.org_id, data.name));
            }
            other => match organizations.get_mut(&event.stream_id) {
                Some(summary) => summary.apply(other),
                None => {
                    tracing::warn!(
                        stream_id = %event.stream_id,
                        event_message = %event.message,
                        "event for an organization the view has never seen"
                    );
                }
            },
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
