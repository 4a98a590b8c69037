//! Utilities for integration tests.
//!
//! The `test-util` crate provides an in-process gateway that speaks the
//! client's wire protocol, plus small helpers for waiting on client
//! notifications. It is used by integration tests in the main crate.

mod gateway;

use std::time::Duration;

pub use gateway::{
    ECHO_COMMAND,
    FAIL_COMMAND,
    GARBAGE_COMMAND,
    MockGateway,
    SLOW_COMMAND,
    WHOAMI_COMMAND,
};
use tokio::{sync::broadcast, time::timeout};
use triton_client::ClientEvent;

/// Error type used by the helpers.
pub type AnyError = anyhow::Error;

/// Default upper bound for waiting on asynchronous test conditions.
pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Receive notifications until one satisfies `predicate`.
///
/// Lagged receivers skip ahead rather than failing.
///
/// # Errors
///
/// Returns an error if no matching notification arrives within
/// [`WAIT_LIMIT`] or the client stops publishing.
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<ClientEvent>,
    mut predicate: F,
) -> Result<ClientEvent, AnyError>
where
    F: FnMut(&ClientEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Ok(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(anyhow::anyhow!("client stopped publishing notifications"));
                }
            }
        }
    };
    timeout(WAIT_LIMIT, wait)
        .await
        .map_err(|_| anyhow::anyhow!("timed out waiting for client notification"))?
}

/// Poll `condition` every 10 ms until it holds.
///
/// # Errors
///
/// Returns an error if `condition` is still false after [`WAIT_LIMIT`].
pub async fn wait_until<F>(mut condition: F) -> Result<(), AnyError>
where
    F: FnMut() -> bool,
{
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    timeout(WAIT_LIMIT, poll)
        .await
        .map_err(|_| anyhow::anyhow!("condition not met in time"))
}
