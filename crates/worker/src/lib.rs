//! Composition of the organization worker.
//!
//! The worker owns one event log and runs two loops
//! side by side until shutdown:
//! - the [`EventRelay`] publishing committed events to the broker
//! - the [`ProjectionConsumer`] applying them to the [`OrganizationView`]

pub mod config;

use std::future::Future;

use common::AggregateId;
use domain::{
    CreateOrganization, DomainError, OrganizationError, OrganizationManager, RetryPolicy,
};
use event_store::EventStore;
use projections::{
    EventRelay, InMemoryBroker, InMemoryOrderLedger, OrganizationView, ProjectionConsumer,
    ProjectionHandler, ReadModel,
};
use thiserror::Error;
use tokio::sync::watch;

pub use config::{Config, LogFormat};

/// Errors that stop the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

/// Creates the organization that holds template role definitions, unless it exists.
///
/// Returns true if it was created by this call.
pub async fn ensure_default_organization<S: EventStore>(
    manager: &OrganizationManager<S>,
) -> Result<bool, WorkerError> {
    let cmd = CreateOrganization::with_id(AggregateId::default_organization(), "Templates");

    match manager.create_organization(cmd).await {
        Ok(_) => {
            tracing::info!("default organization created");
            Ok(true)
        }
        Err(e) if matches!(e.as_organization(), Some(OrganizationError::Conflict { .. })) => {
            tracing::debug!("default organization already exists");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Runs relay and consumer over `store` until `shutdown` resolves.
///
/// The organization view lives in memory, so its order ledger does too:
/// both start empty on every run and the relay replays the whole log into
/// them. A durable ledger paired with this view would mark events as applied
/// that the fresh view never saw.
pub async fn run<S>(
    store: S,
    config: &Config,
    shutdown: impl Future<Output = ()>,
) -> Result<OrganizationView, WorkerError>
where
    S: EventStore + Clone,
{
    let manager = OrganizationManager::with_policy(
        store.clone(),
        RetryPolicy::new(config.max_command_attempts),
    );
    ensure_default_organization(&manager).await?;

    let broker = InMemoryBroker::new();
    let view = OrganizationView::new();
    let handler =
        ProjectionHandler::new(InMemoryOrderLedger::new()).with_projection(view.clone());
    let consumer = ProjectionConsumer::new(broker.clone(), handler);
    let relay = EventRelay::new(store, broker);

    let (stop_tx, stop_rx) = watch::channel(false);
    let stopped = |mut rx: watch::Receiver<bool>| async move {
        let _ = rx.wait_for(|stop| *stop).await;
    };

    tracing::info!(
        relay_interval_ms = config.relay_interval.as_millis() as u64,
        redelivery_interval_ms = config.redelivery_interval.as_millis() as u64,
        "worker started"
    );

    tokio::join!(
        relay.run(config.relay_interval, stopped(stop_rx.clone())),
        consumer.run(config.redelivery_interval, stopped(stop_rx)),
        async {
            shutdown.await;
            let _ = stop_tx.send(true);
        },
    );

    tracing::info!(organizations = view.count().await, "worker stopped");
    Ok(view)
}
