//! Public client façade.
//!
//! [`Client`] is a cheap, cloneable handle. Every method forwards to the
//! driver task, so handles can be shared freely across tasks. Dropping the
//! last handle closes the client.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use serde::Serialize;
use serde_json::Value;
use tokio::{
    runtime::Handle,
    sync::{broadcast, mpsc, oneshot, watch},
};
use tracing::{debug, trace};

use crate::{
    config::ClientConfig,
    driver::{Command, Driver, DriverInbox, Status},
    error::{CallError, ClientError},
    event::{ClientEvent, EVENT_CAPACITY},
    host::HostTable,
    lock::Lock,
    pool::Route,
    registry::{CallResult, Completion},
};

/// A named command with an optional JSON payload.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use triton_client::{Request, Route};
///
/// let request = Request::new("cache.get")
///     .with_payload(json!({"key": "user:7"}))
///     .routed_by("user:7");
/// assert_eq!(request.name(), "cache.get");
/// assert!(matches!(request.route(), Route::Key(_)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    name: String,
    payload: Option<Value>,
    route: Route,
}

impl Request {
    /// Request for `name` with no payload, routed round-robin.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: None,
            route: Route::RoundRobin,
        }
    }

    /// Attach a JSON payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach any serialisable payload.
    ///
    /// # Errors
    ///
    /// Returns the serialisation error if `payload` cannot be represented as
    /// JSON.
    pub fn try_with_payload<T: Serialize>(self, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(self.with_payload(serde_json::to_value(payload)?))
    }

    /// Override the routing policy.
    #[must_use]
    pub const fn with_route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    /// Route by the hash of `key`, so equal keys reach the same gateway.
    #[must_use]
    pub fn routed_by(self, key: &str) -> Self { self.with_route(Route::hashed(key)) }

    /// Command name.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Payload, if any.
    #[must_use]
    pub const fn payload(&self) -> Option<&Value> { self.payload.as_ref() }

    /// Routing policy.
    #[must_use]
    pub const fn route(&self) -> Route { self.route }
}

/// Driver waiting for [`Client::start`].
struct Pending {
    driver: Driver,
    inbox: DriverInbox,
}

/// Handle to a multiplexed gateway client.
#[derive(Clone)]
pub struct Client {
    commands: mpsc::UnboundedSender<Command>,
    notifier: broadcast::Sender<ClientEvent>,
    status: watch::Receiver<Status>,
    queue_capacity: usize,
    pending: Arc<Mutex<Option<Pending>>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("active_connections", &self.active_connections())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Build a client without connecting.
    ///
    /// Subscribe with [`Client::subscribe`] before calling [`Client::start`]
    /// to observe the first `Open` notification.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoHosts`] or [`ClientError::InvalidHost`] when
    /// the configured host list is unusable.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let hosts = HostTable::from_config(&config)?;
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (notifier, _) = broadcast::channel(EVENT_CAPACITY);
        let (status_tx, status) = watch::channel(Status::default());
        let queue_capacity = config.queue_capacity;
        let (driver, inbox) = Driver::new(config, &hosts, commands_rx, notifier.clone(), status_tx);
        Ok(Self {
            commands,
            notifier,
            status,
            queue_capacity,
            pending: Arc::new(Mutex::new(Some(Pending { driver, inbox }))),
        })
    }

    /// Build a client and start connecting to every host.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Client::new`] and [`Client::start`].
    pub fn open(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Self::new(config)?;
        client.start()?;
        Ok(client)
    }

    /// Start connecting to every host. Calling it again has no effect.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoRuntime`] when called outside a Tokio runtime.
    pub fn start(&self) -> Result<(), ClientError> {
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        let pending = match self.pending.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(Pending { driver, inbox }) = pending {
            debug!("starting client driver");
            runtime.spawn(driver.run(inbox));
        }
        Ok(())
    }

    /// Submit `request`.
    ///
    /// With a completion handler the call is registered and the handler runs
    /// exactly once with the reply, an application error, or a local failure
    /// such as [`CallError::Timeout`]. Without one the request is sent as a
    /// notification and any reply is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when no connection is active and
    /// the outbound queue is full; the queued backlog is shed as well. Returns
    /// [`ClientError::Closed`] once the client has shut down. In both cases
    /// the handler is dropped without being called.
    pub fn send(&self, request: Request, completion: Option<Completion>) -> Result<(), ClientError> {
        let status = *self.status.borrow();
        if status.active == 0 && status.queued >= self.queue_capacity {
            debug!(
                queued = status.queued,
                command = request.name(),
                "outbound queue full; refusing request"
            );
            self.commands.send(Command::Shed).map_err(|_| ClientError::Closed)?;
            return Err(ClientError::NotConnected);
        }
        self.commands
            .send(Command::Send {
                request,
                completion,
            })
            .map_err(|_| ClientError::Closed)
    }

    /// Submit `request` and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error reply, or a local [`CallError`] when the
    /// call times out, cannot be queued, or the client closes first.
    pub async fn call(&self, request: Request) -> CallResult {
        let (tx, rx) = oneshot::channel();
        let completion: Completion = Box::new(move |result| {
            if tx.send(result).is_err() {
                trace!("caller stopped waiting for reply");
            }
        });
        self.send(request, Some(completion))
            .map_err(|err| match err {
                ClientError::NotConnected => CallError::NotConnected,
                _ => CallError::Closed,
            })?;
        rx.await.unwrap_or(Err(CallError::Closed))
    }

    /// Send `request` without waiting for a reply.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Client::send`].
    pub fn notify(&self, request: Request) -> Result<(), ClientError> { self.send(request, None) }

    /// Close every connection and stop reconnecting.
    ///
    /// Calls already in flight still complete, by reply or by timeout.
    pub fn close(&self) {
        if self.commands.send(Command::Close).is_err() {
            trace!("client already closed");
        }
    }

    /// Receive lifecycle notifications from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> { self.notifier.subscribe() }

    /// Whether at least one connection is active.
    #[must_use]
    pub fn is_connected(&self) -> bool { self.active_connections() > 0 }

    /// Number of active connections.
    #[must_use]
    pub fn active_connections(&self) -> usize { self.status.borrow().active }

    /// Number of requests waiting for a connection.
    #[must_use]
    pub fn queued(&self) -> usize { self.status.borrow().queued }

    /// Wait until at least one connection is active.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] if the client stops first.
    pub async fn wait_connected(&self) -> Result<(), ClientError> {
        let mut status = self.status.clone();
        status
            .wait_for(|snapshot| snapshot.active > 0)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Closed)
    }

    /// A distributed lock named `name`, served through this client.
    #[must_use]
    pub fn lock(&self, name: impl Into<String>) -> Lock { Lock::new(self.clone(), name) }
}
