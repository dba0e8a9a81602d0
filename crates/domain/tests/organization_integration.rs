//! End-to-end tests for organization commands over the in-memory event log.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use common::AggregateId;
use domain::{
    AddRoleDefinition, AddUser, Aggregate, AssignRolesToUser, ChangeRoleDefinition,
    CreateOrganization, DeleteOrganization, DomainError, NewRoleDefinition, Organization,
    OrganizationError, OrganizationManager, ParamMapping, ParameterSpec, PermissionDefinition,
    RemoveRoleDefinition, RemoveRolesFromUser, RemoveUser, RetryPolicy, RoleAssignment,
    RoleDefinition, RoleDefinitionContent, RoleDefinitionId, UserId,
};
use event_store::{
    EventEnvelope, EventId, EventStore, EventStream, InMemoryEventStore, Position, Revision,
};

/// Event log that lets a competing writer commit right before the next
/// `remaining` appends.
#[derive(Clone)]
struct ContendedStore {
    inner: InMemoryEventStore,
    remaining: Arc<AtomicU32>,
}

impl ContendedStore {
    fn new(inner: InMemoryEventStore, conflicts: u32) -> Self {
        Self {
            inner,
            remaining: Arc::new(AtomicU32::new(conflicts)),
        }
    }
}

#[async_trait]
impl EventStore for ContendedStore {
    async fn get_stream(&self, stream_id: &AggregateId) -> event_store::Result<Vec<EventEnvelope>> {
        self.inner.get_stream(stream_id).await
    }

    async fn save(
        &self,
        stream_id: &AggregateId,
        expected: Revision,
        message: &str,
        payload: serde_json::Value,
    ) -> event_store::Result<EventId> {
        let interfere = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        if interfere {
            if let Some(head) = self.inner.head(stream_id).await? {
                let intruder = format!("intruder-{}", head.next());
                self.inner
                    .save(
                        stream_id,
                        head,
                        "userAdded",
                        serde_json::json!({ "userId": intruder }),
                    )
                    .await?;
            }
        }

        self.inner.save(stream_id, expected, message, payload).await
    }

    async fn head(&self, stream_id: &AggregateId) -> event_store::Result<Option<EventId>> {
        self.inner.head(stream_id).await
    }

    async fn stream_events_after(&self, after: Position) -> event_store::Result<EventStream> {
        self.inner.stream_events_after(after).await
    }
}

fn waiter_content() -> RoleDefinitionContent {
    let take = PermissionDefinition::new(
        "orders",
        "take",
        "Take orders",
        [
            (
                "locationId".to_string(),
                ParameterSpec::required("Location", "Restaurant location"),
            ),
            (
                "tableId".to_string(),
                ParameterSpec::optional("Table", "Table number"),
            ),
        ],
    )
    .unwrap();

    RoleDefinitionContent::new("Waiter")
        .description("Serves tables")
        .param(
            "location",
            ParamMapping::new("Location", "", true, ["orders:take:locationId"]),
        )
        .param(
            "table",
            ParamMapping::new("Table", "", false, ["orders:take:tableId"]),
        )
        .permission(take)
}

fn risto() -> AggregateId {
    AggregateId::from("risto")
}

async fn create_risto<S: EventStore>(manager: &OrganizationManager<S>) {
    manager
        .create_organization(CreateOrganization::with_id("risto", "Risto"))
        .await
        .unwrap();
}

#[tokio::test]
async fn risto_scenario() {
    let store = InMemoryEventStore::new();
    let manager = OrganizationManager::new(store.clone());

    let created = manager
        .create_organization(CreateOrganization::with_id("risto", "Risto"))
        .await
        .unwrap();
    assert_eq!(created.event_id, EventId::first());

    let stale = manager.repository().load(&risto()).await.unwrap();
    assert_eq!(stale.revision(), EventId::first());

    let added = manager
        .add_role_definition(AddRoleDefinition::new(NewRoleDefinition::for_organization(
            risto(),
            waiter_content(),
        )))
        .await
        .unwrap();
    assert_eq!(added.event_id, EventId::new(2));
    assert_eq!(added.attempts, 1);

    // A writer still holding revision 1 loses
    let mut stale = stale;
    let definition = RoleDefinition::new(NewRoleDefinition::for_organization(
        risto(),
        waiter_content().description("Second waiter"),
    ))
    .unwrap();
    let role_def_id = stale.add_role_definition(definition).unwrap();
    let err = manager
        .repository()
        .role_definition_added(&mut stale, &role_def_id)
        .await
        .unwrap_err();
    assert!(err.is_optimistic_lock());
    assert_eq!(store.event_count().await, 2);

    // Redoing the command against fresh state succeeds
    let retried = manager
        .add_role_definition(AddRoleDefinition::new(NewRoleDefinition::for_organization(
            risto(),
            waiter_content().description("Second waiter"),
        )))
        .await
        .unwrap();
    assert_eq!(retried.event_id, EventId::new(3));
    assert_eq!(retried.aggregate.role_definitions().count(), 2);
}

#[tokio::test]
async fn manager_retries_after_losing_a_race() {
    let store = InMemoryEventStore::new();
    let contended = ContendedStore::new(store.clone(), 0);
    let manager = OrganizationManager::new(contended.clone());
    create_risto(&manager).await;

    contended.remaining.store(2, Ordering::SeqCst);
    let result = manager
        .add_user(AddUser::new("risto", "anna"))
        .await
        .unwrap();

    assert_eq!(result.attempts, 3);
    // Two intruders committed at 2 and 3 before our event landed at 4
    assert_eq!(result.event_id, EventId::new(4));
    assert!(result.aggregate.has_user(&UserId::new("intruder-2")));
    assert!(result.aggregate.has_user(&UserId::new("intruder-3")));
    assert!(result.aggregate.has_user(&UserId::new("anna")));
}

#[tokio::test]
async fn retries_are_bounded() {
    let store = InMemoryEventStore::new();
    let contended = ContendedStore::new(store.clone(), 0);
    let manager = OrganizationManager::with_policy(contended.clone(), RetryPolicy::new(5));
    create_risto(&manager).await;

    contended.remaining.store(u32::MAX, Ordering::SeqCst);
    let err = manager
        .add_user(AddUser::new("risto", "anna"))
        .await
        .unwrap_err();

    match err {
        DomainError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 5);
            assert!(last.is_optimistic_lock());
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let org = manager.get_organization(&risto()).await.unwrap().unwrap();
    assert!(!org.has_user(&UserId::new("anna")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commands_never_share_a_revision() {
    let store = InMemoryEventStore::new();
    let manager = Arc::new(OrganizationManager::new(store.clone()));
    create_risto(manager.as_ref()).await;

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .add_user(AddUser::new("risto", format!("user-{i}")))
                    .await
            })
        })
        .collect();

    let mut event_ids = Vec::new();
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        event_ids.push(result.event_id.as_u64());
    }
    event_ids.sort_unstable();

    assert_eq!(event_ids, (2..=11).collect::<Vec<_>>());

    let org = manager.get_organization(&risto()).await.unwrap().unwrap();
    assert_eq!(org.users().count(), 10);
    assert_eq!(org.revision(), EventId::new(11));
}

#[tokio::test]
async fn validation_errors_are_not_retried() {
    let store = InMemoryEventStore::new();
    let contended = ContendedStore::new(store.clone(), 0);
    let manager = OrganizationManager::new(contended);
    create_risto(&manager).await;
    manager
        .add_user(AddUser::new("risto", "anna"))
        .await
        .unwrap();

    let err = manager
        .assign_roles_to_user(AssignRolesToUser::new("risto", "anna", vec![]))
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_organization(),
        Some(OrganizationError::Validation(_))
    ));
    assert_eq!(store.event_count().await, 2);
}

#[tokio::test]
async fn creating_an_existing_organization_is_a_conflict() {
    let manager = OrganizationManager::new(InMemoryEventStore::new());
    create_risto(&manager).await;

    let err = manager
        .create_organization(CreateOrganization::with_id("risto", "Risto again"))
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_organization(),
        Some(OrganizationError::Conflict { .. })
    ));
}

#[tokio::test]
async fn commands_on_unknown_organization_fail_with_stream_not_found() {
    let manager = OrganizationManager::new(InMemoryEventStore::new());

    let err = manager
        .add_user(AddUser::new("nowhere", "anna"))
        .await
        .unwrap_err();

    assert!(matches!(err, DomainError::StreamNotFound(_)));
    assert!(manager
        .get_organization(&AggregateId::from("nowhere"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn deleted_organization_rejects_add_user_after_reload() {
    let manager = OrganizationManager::new(InMemoryEventStore::new());
    create_risto(&manager).await;

    manager
        .delete_organization(DeleteOrganization::new("risto"))
        .await
        .unwrap();

    let err = manager
        .add_user(AddUser::new("risto", "anna"))
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_organization(),
        Some(OrganizationError::InvalidState(_))
    ));

    let org = manager.get_organization(&risto()).await.unwrap().unwrap();
    assert!(org.is_deleted());
}

#[tokio::test]
async fn replay_reproduces_incremental_state() {
    let store = InMemoryEventStore::new();
    let manager = OrganizationManager::new(store.clone());
    create_risto(&manager).await;

    let waiter = manager
        .add_role_definition(AddRoleDefinition::new(NewRoleDefinition::for_organization(
            risto(),
            waiter_content(),
        )))
        .await
        .unwrap()
        .output;
    manager
        .add_user(AddUser::new("risto", "anna"))
        .await
        .unwrap();
    manager
        .add_user(AddUser::new("risto", "bob"))
        .await
        .unwrap();
    let assigned = manager
        .assign_roles_to_user(AssignRolesToUser::new(
            "risto",
            "anna",
            vec![
                RoleAssignment::new(waiter.clone()).value("location", "milano"),
                RoleAssignment::new(waiter.clone())
                    .value("location", "roma")
                    .value("table", "4"),
            ],
        ))
        .await
        .unwrap();
    manager
        .remove_roles_from_user(RemoveRolesFromUser::new(
            "risto",
            "anna",
            vec![assigned.output[0].clone()],
        ))
        .await
        .unwrap();
    manager
        .change_role_definition(ChangeRoleDefinition::new(
            "risto",
            waiter.clone(),
            waiter_content().description("Head waiter"),
        ))
        .await
        .unwrap();
    let last = manager
        .remove_user(RemoveUser::new("risto", "bob"))
        .await
        .unwrap();

    let events = store.get_stream(&risto()).await.unwrap();
    assert_eq!(events.len(), 8);

    let replayed = Organization::from_events(events.clone()).unwrap();
    assert_eq!(replayed, last.aggregate);

    let mut shuffled = events;
    shuffled.reverse();
    assert_eq!(Organization::from_events(shuffled).unwrap(), last.aggregate);

    let permissions = manager
        .user_permissions(&risto(), &UserId::new("anna"))
        .await
        .unwrap();
    assert_eq!(permissions.len(), 1);
    assert_eq!(permissions[0].values.get("locationId").unwrap(), "roma");
    assert_eq!(permissions[0].values.get("tableId").unwrap(), "4");
}

#[tokio::test]
async fn removing_a_role_definition_strips_assigned_roles() {
    let manager = OrganizationManager::new(InMemoryEventStore::new());
    create_risto(&manager).await;

    let waiter = manager
        .add_role_definition(AddRoleDefinition::new(NewRoleDefinition::for_organization(
            risto(),
            waiter_content(),
        )))
        .await
        .unwrap()
        .output;
    manager
        .add_user(AddUser::new("risto", "anna"))
        .await
        .unwrap();
    manager
        .assign_roles_to_user(AssignRolesToUser::new(
            "risto",
            "anna",
            vec![RoleAssignment::new(waiter.clone()).value("location", "milano")],
        ))
        .await
        .unwrap();

    manager
        .remove_role_definition(RemoveRoleDefinition::new("risto", waiter.clone()))
        .await
        .unwrap();

    let err = manager
        .get_role_definition(&risto(), &waiter)
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_organization(),
        Some(OrganizationError::NotFound { .. })
    ));
    assert!(manager
        .user_permissions(&risto(), &UserId::new("anna"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn templates_live_in_the_default_organization() {
    let manager = OrganizationManager::new(InMemoryEventStore::new());
    manager
        .create_organization(CreateOrganization::with_id(
            AggregateId::default_organization(),
            "Templates",
        ))
        .await
        .unwrap();

    let result = manager
        .add_role_definition(AddRoleDefinition::new(NewRoleDefinition::template(
            RoleDefinitionId::from("waiter"),
            waiter_content(),
        )))
        .await
        .unwrap();

    assert_eq!(result.output.as_str(), "waiter");
    let template = manager
        .get_role_definition(
            &AggregateId::default_organization(),
            &RoleDefinitionId::from("waiter"),
        )
        .await
        .unwrap();
    assert!(template.is_template());
}
