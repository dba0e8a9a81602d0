//! Command execution with optimistic retry.

use std::future::Future;

use common::AggregateId;
use event_store::EventId;

use crate::aggregate::Aggregate;
use crate::error::DomainError;

/// Default bound on attempts per command.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Trait for commands that can be executed against an aggregate.
///
/// Commands represent an intention to perform an action. They may be rejected
/// if the aggregate's current state doesn't allow the action.
pub trait Command: Send + Sync {
    /// The type of aggregate this command targets.
    type Aggregate: Aggregate;

    /// Returns the ID of the aggregate this command targets.
    fn aggregate_id(&self) -> AggregateId;
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate, T = ()> {
    /// The aggregate after the command's event was committed.
    pub aggregate: A,

    /// Value produced by the command, such as a generated id.
    pub output: T,

    /// Id of the committed event.
    pub event_id: EventId,

    /// Number of attempts it took, starting at 1.
    pub attempts: u32,
}

/// Bound on how often a command is re-run after losing a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    /// Creates a policy allowing at most `max_attempts` attempts (at least one).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

/// Runs `attempt_fn` until it succeeds, fails for a reason other than an
/// optimistic lock, or the policy's attempts are used up.
///
/// Each call receives the 1-based attempt number and must redo the whole
/// read-validate-write cycle against fresh state. Retries are immediate.
/// When the bound is hit the last conflict is returned inside
/// [`DomainError::RetriesExhausted`].
pub async fn execute_with_retry<T, F, Fut>(
    operation: &'static str,
    policy: RetryPolicy,
    mut attempt_fn: F,
) -> Result<T, DomainError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let mut attempt = 1;
    loop {
        match attempt_fn(attempt).await {
            Ok(value) => {
                metrics::counter!("organization_commands_total", "operation" => operation, "outcome" => "committed")
                    .increment(1);
                return Ok(value);
            }
            Err(e) if e.is_optimistic_lock() => {
                metrics::counter!("organization_command_retries_total", "operation" => operation)
                    .increment(1);

                if attempt >= policy.max_attempts() {
                    tracing::warn!(operation, attempts = attempt, error = %e, "giving up after repeated conflicts");
                    metrics::counter!("organization_commands_total", "operation" => operation, "outcome" => "exhausted")
                        .increment(1);
                    return Err(DomainError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }

                tracing::debug!(operation, attempt, error = %e, "conflict, reloading");
                attempt += 1;
            }
            Err(e) => {
                tracing::debug!(operation, attempt, error = %e, "command failed");
                metrics::counter!("organization_commands_total", "operation" => operation, "outcome" => "failed")
                    .increment(1);
                return Err(e);
            }
        }
    }
}
