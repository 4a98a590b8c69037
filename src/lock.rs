//! Distributed lock served by the gateway.
//!
//! Both operations hash the lock name to choose a connection, so acquire and
//! release for one name reach the same gateway while the active set is
//! stable.

use serde_json::{Value, json};

use crate::{
    client::{Client, Request},
    error::CallError,
    pool::Route,
};

/// Command that acquires a lock.
pub const ACQUIRE_COMMAND: &str = "lock.acquire";
/// Command that releases a lock.
pub const RELEASE_COMMAND: &str = "lock.release";

/// A named lock and the owner token returned when it was acquired.
#[derive(Debug)]
pub struct Lock {
    client: Client,
    name: String,
    owner: Option<Value>,
}

impl Lock {
    /// Lock `name` through `client`. Nothing is sent until [`Lock::acquire`].
    #[must_use]
    pub fn new(client: Client, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            owner: None,
        }
    }

    /// Lock name.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Owner token from the last successful acquire.
    #[must_use]
    pub const fn owner(&self) -> Option<&Value> { self.owner.as_ref() }

    /// Whether the lock is currently held by this handle.
    #[must_use]
    pub const fn is_held(&self) -> bool { self.owner.is_some() }

    /// Acquire the lock, remembering the owner token on success.
    ///
    /// # Errors
    ///
    /// Returns the gateway's refusal or any local call failure. The owner
    /// token is left untouched on failure.
    pub async fn acquire(&mut self) -> Result<&Value, CallError> {
        let request = Request::new(ACQUIRE_COMMAND)
            .with_payload(json!({ "key": self.name }))
            .with_route(self.route());
        let owner = self.client.call(request).await?;
        Ok(self.owner.insert(owner))
    }

    /// Release the lock and return the gateway's reply.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::LockNotAcquired`] without contacting the gateway
    /// when the lock is not held, or the gateway's error otherwise.
    pub async fn release(&mut self) -> Result<Value, CallError> {
        let owner = self.owner.as_ref().ok_or(CallError::LockNotAcquired)?;
        let request = Request::new(RELEASE_COMMAND)
            .with_payload(json!({ "key": self.name, "ownerId": owner }))
            .with_route(self.route());
        let reply = self.client.call(request).await?;
        self.owner = None;
        Ok(reply)
    }

    fn route(&self) -> Route { Route::hashed(&self.name) }
}
