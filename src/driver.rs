//! The task that owns a client's mutable state.
//!
//! Public API calls, socket tasks, reconnect timers and the sweep/heartbeat
//! ticker all talk to the driver through channels. The driver applies each
//! message to the pool, registry and queue in turn, so state is never touched
//! concurrently and needs no locking. Work that could grow without bound in a
//! single turn (draining the outbound queue) is split into one step per
//! message.

#![expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! macro usage"
)]

use std::{collections::BTreeMap, time::Duration};

use bytes::Bytes;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

use crate::{
    client::Request,
    config::ClientConfig,
    connection::{self, ConnectionEvent, ConnectionSettings, Outbound},
    error::CallError,
    event::ClientEvent,
    frame::{HEARTBEAT_COMMAND, NO_REPLY, encode_request},
    host::{HostId, HostRecord, HostTable},
    pool::{ConnectionHandle, ConnectionPool, Route},
    queue::{OutboundQueue, QueueShed, QueuedFrame},
    registry::{CallRegistry, Completion},
};

/// Request from the façade.
pub(crate) enum Command {
    Send {
        request: Request,
        completion: Option<Completion>,
    },
    /// A submission was refused because the queue looked full.
    Shed,
    Close,
}

/// Snapshot of the driver's state published to the façade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Status {
    pub active: usize,
    pub queued: usize,
}

/// Work the driver schedules for itself.
#[derive(Debug)]
enum Internal {
    Reconnect(HostId),
    Drain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Connecting,
    Active,
    Deactive,
    Closed,
}

/// Lifetime record for one host: survives every socket made to it.
#[derive(Debug)]
struct Link {
    host: HostRecord,
    state: LinkState,
    attempt: u32,
    /// Socket task while connecting/active, retry timer while deactive.
    task: Option<JoinHandle<()>>,
}

/// Delay before the next connect attempt.
pub(crate) fn backoff_delay(attempt: u32, max_steps: u32, unit: Duration) -> Duration {
    unit.saturating_mul(attempt.min(max_steps))
}

/// Receivers consumed by [`Driver::run`].
pub(crate) struct DriverInbox {
    commands: mpsc::UnboundedReceiver<Command>,
    connections: mpsc::UnboundedReceiver<ConnectionEvent>,
    internal: mpsc::UnboundedReceiver<Internal>,
}

pub(crate) struct Driver {
    config: ClientConfig,
    settings: ConnectionSettings,
    links: BTreeMap<HostId, Link>,
    pool: ConnectionPool,
    registry: CallRegistry,
    queue: OutboundQueue,
    closed: bool,
    notifier: broadcast::Sender<ClientEvent>,
    status: watch::Sender<Status>,
    connection_tx: mpsc::UnboundedSender<ConnectionEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

impl Driver {
    pub(crate) fn new(
        config: ClientConfig,
        hosts: &HostTable,
        commands: mpsc::UnboundedReceiver<Command>,
        notifier: broadcast::Sender<ClientEvent>,
        status: watch::Sender<Status>,
    ) -> (Self, DriverInbox) {
        let (connection_tx, connections) = mpsc::unbounded_channel();
        let (internal_tx, internal) = mpsc::unbounded_channel();
        let links = hosts
            .iter()
            .map(|host| {
                let link = Link {
                    host: host.clone(),
                    state: LinkState::Deactive,
                    attempt: 0,
                    task: None,
                };
                (host.id(), link)
            })
            .collect();
        let driver = Self {
            settings: ConnectionSettings {
                idle_timeout: config.idle_timeout_duration(),
                max_body_len: config.max_body_len,
            },
            queue: OutboundQueue::with_capacity(config.queue_capacity),
            config,
            links,
            pool: ConnectionPool::new(),
            registry: CallRegistry::new(),
            closed: false,
            notifier,
            status,
            connection_tx,
            internal_tx,
        };
        let inbox = DriverInbox {
            commands,
            connections,
            internal,
        };
        (driver, inbox)
    }

    /// Connect every host and process messages until closed and idle.
    pub(crate) async fn run(mut self, mut inbox: DriverInbox) {
        let ids: Vec<HostId> = self.links.keys().copied().collect();
        for id in ids {
            self.connect(id);
        }

        let mut ticker = time::interval(self.config.sweep_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands_open = true;

        loop {
            tokio::select! {
                command = inbox.commands.recv(), if commands_open => match command {
                    Some(Command::Send { request, completion }) => self.send(request, completion),
                    Some(Command::Shed) => self.shed(),
                    Some(Command::Close) => self.close(),
                    None => {
                        // Every client handle is gone.
                        commands_open = false;
                        self.close();
                    }
                },
                Some(event) = inbox.connections.recv() => self.on_connection_event(event),
                Some(internal) = inbox.internal.recv() => match internal {
                    Internal::Reconnect(id) => self.reconnect(id),
                    Internal::Drain => self.drain_step(),
                },
                _ = ticker.tick() => self.tick(Instant::now()),
            }

            if self.is_finished() {
                break;
            }
        }
        debug!("client driver stopped");
    }

    fn send(&mut self, request: Request, completion: Option<Completion>) {
        if self.closed {
            if let Some(complete) = completion {
                complete(Err(CallError::Closed));
            }
            return;
        }

        let call_id = match completion {
            Some(complete) => {
                self.registry
                    .register(complete, self.config.call_timeout(), Instant::now())
            }
            None => NO_REPLY,
        };
        let frame = match encode_request(call_id, request.name(), request.payload()) {
            Ok(frame) => frame,
            Err(error) => {
                warn!(call_id, command = request.name(), %error, "cannot encode request");
                self.registry.fail(call_id, CallError::Encode(error.to_string()));
                return;
            }
        };

        if let Some(host) = self.dispatch(request.route(), &frame) {
            trace!(call_id, command = request.name(), %host, "request written");
            return;
        }

        let entry = QueuedFrame {
            route: request.route(),
            frame,
        };
        match self.queue.push(entry) {
            Ok(()) => trace!(call_id, queued = self.queue.len(), "request queued"),
            Err(QueueShed { dropped }) => {
                self.report_shed(dropped);
                self.registry.fail(call_id, CallError::NotConnected);
            }
        }
        self.publish_status();
    }

    /// Write `frame` to the routed connection, or to any other that still
    /// accepts writes.
    ///
    /// A socket task can exit before its `Closed` event is processed, so the
    /// routed handle may be stale while other connections are live.
    fn dispatch(&mut self, route: Route, frame: &Bytes) -> Option<HostId> {
        let routed = self.pool.pick(route)?;
        let stale = routed.host().id();
        if routed.write(frame.clone()) {
            return Some(stale);
        }
        self.pool
            .iter()
            .filter(|connection| connection.host().id() != stale)
            .find(|connection| connection.write(frame.clone()))
            .map(|connection| connection.host().id())
    }

    /// Clear a full queue after the façade refused a submission.
    fn shed(&mut self) {
        if self.pool.is_connected() || !self.queue.is_full() {
            return;
        }
        let dropped = self.queue.clear();
        self.report_shed(dropped);
        self.publish_status();
    }

    fn report_shed(&self, dropped: usize) {
        warn!(dropped, capacity = self.queue.capacity(), "outbound queue full; shedding");
        self.publish(ClientEvent::Log(format!(
            "outbound queue full; dropped {dropped} queued calls"
        )));
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected { host, writer } => self.on_connected(host, writer),
            ConnectionEvent::Frame { host, frame } => {
                if self.registry.resolve(frame) {
                    trace!(%host, "call resolved");
                }
            }
            ConnectionEvent::Malformed { host, error } => {
                if let Some(record) = self.host(host) {
                    warn!(host = %record, %error, "skipping unreadable frame");
                    self.publish(ClientEvent::Error {
                        host: record,
                        message: error.to_string(),
                    });
                }
            }
            ConnectionEvent::Failed { host, error } => {
                if let Some(record) = self.host(host) {
                    warn!(host = %record, %error, "connection error");
                    self.publish(ClientEvent::Error {
                        host: record,
                        message: error.to_string(),
                    });
                }
            }
            ConnectionEvent::Timeout { host } => {
                if let Some(record) = self.host(host) {
                    warn!(host = %record, "connection idle timeout");
                    self.publish(ClientEvent::Timeout { host: record });
                }
            }
            ConnectionEvent::Closed { host } => self.on_closed(host),
        }
    }

    fn on_connected(&mut self, id: HostId, writer: mpsc::UnboundedSender<Outbound>) {
        let Some(link) = self.links.get_mut(&id) else {
            return;
        };
        let handle = ConnectionHandle::new(link.host.clone(), writer);
        if self.closed {
            handle.end();
            return;
        }
        link.state = LinkState::Active;
        link.attempt = 0;
        info!(host = %link.host, "connected");

        self.pool.activate(handle);
        self.publish_status();
        if self.pool.active_count() == 1 {
            self.publish(ClientEvent::Open);
        }
        // Entries stay queued only while every known connection refused them.
        if !self.queue.is_empty() {
            self.schedule(Internal::Drain);
        }
    }

    fn on_closed(&mut self, id: HostId) {
        let was_active = self.pool.deactivate(id).is_some();
        self.publish_status();
        if was_active && !self.pool.is_connected() {
            info!("no active gateway connections");
            self.publish(ClientEvent::Close);
        }

        let closed = self.closed;
        let step = self.config.backoff_step();
        let max_steps = self.config.max_backoff_steps;
        let internal_tx = self.internal_tx.clone();
        let Some(link) = self.links.get_mut(&id) else {
            return;
        };
        link.task = None;
        if closed {
            link.state = LinkState::Closed;
            return;
        }

        link.state = LinkState::Deactive;
        let delay = backoff_delay(link.attempt, max_steps, step);
        debug!(host = %link.host, attempt = link.attempt, ?delay, "scheduling reconnect");
        link.task = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            if internal_tx.send(Internal::Reconnect(id)).is_err() {
                trace!("driver stopped before reconnect");
            }
        }));
    }

    fn reconnect(&mut self, id: HostId) {
        if self.closed {
            return;
        }
        let Some(link) = self.links.get_mut(&id) else {
            return;
        };
        if link.state != LinkState::Deactive {
            return;
        }
        link.attempt = link.attempt.saturating_add(1);
        let message = format!("retrying to connect to {}", link.host);
        info!(host = %link.host, attempt = link.attempt, "retrying connection");
        self.publish(ClientEvent::Log(message));
        self.connect(id);
    }

    fn connect(&mut self, id: HostId) {
        let settings = self.settings;
        let events = self.connection_tx.clone();
        if let Some(link) = self.links.get_mut(&id) {
            debug!(host = %link.host, "connecting");
            link.state = LinkState::Connecting;
            link.task = Some(connection::spawn(link.host.clone(), settings, events));
        }
    }

    fn drain_step(&mut self) {
        if self.closed {
            return;
        }
        let Some(entry) = self.queue.pop() else {
            return;
        };
        if self.dispatch(entry.route, &entry.frame).is_none() {
            // No connection took it; the next one to connect resumes.
            self.queue.requeue(entry);
            return;
        }
        self.publish_status();
        if !self.queue.is_empty() {
            self.schedule(Internal::Drain);
        }
    }

    fn tick(&mut self, now: Instant) {
        let expired = self.registry.sweep(now);
        if expired > 0 {
            debug!(expired, "calls timed out");
        }
        if self.closed {
            return;
        }
        match encode_request(NO_REPLY, HEARTBEAT_COMMAND, None) {
            Ok(heartbeat) => {
                for connection in self.pool.iter() {
                    connection.write(heartbeat.clone());
                }
            }
            Err(error) => warn!(%error, "cannot encode heartbeat"),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        info!(pending = self.registry.len(), "closing client");

        for link in self.links.values_mut() {
            match link.state {
                LinkState::Connecting | LinkState::Deactive => {
                    if let Some(task) = link.task.take() {
                        task.abort();
                    }
                    link.state = LinkState::Closed;
                }
                // Active sockets report `Closed` once the gateway hangs up.
                LinkState::Active | LinkState::Closed => {}
            }
        }
        for connection in self.pool.iter() {
            connection.end();
        }
    }

    fn is_finished(&self) -> bool {
        self.closed
            && self.registry.is_empty()
            && self.links.values().all(|link| link.state == LinkState::Closed)
    }

    fn host(&self, id: HostId) -> Option<HostRecord> {
        self.links.get(&id).map(|link| link.host.clone())
    }

    fn publish_status(&self) {
        self.status.send_replace(Status {
            active: self.pool.active_count(),
            queued: self.queue.len(),
        });
    }

    fn schedule(&self, internal: Internal) {
        if self.internal_tx.send(internal).is_err() {
            trace!("driver inbox closed");
        }
    }

    fn publish(&self, event: ClientEvent) {
        if self.notifier.send(event).is_err() {
            trace!("no subscribers for client event");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;
    use crate::{
        codec::GatewayCodec,
        frame::Frame,
        registry::CallResult,
    };

    type Outcomes = Arc<Mutex<Vec<(usize, CallResult)>>>;

    struct Harness {
        driver: Driver,
        events: broadcast::Receiver<ClientEvent>,
        outcomes: Outcomes,
        inbox: DriverInbox,
        // Held so the command channel stays open.
        _commands: mpsc::UnboundedSender<Command>,
    }

    impl Harness {
        fn completion(&self, tag: usize) -> Completion {
            let outcomes = Arc::clone(&self.outcomes);
            Box::new(move |result| outcomes.lock().expect("outcomes lock").push((tag, result)))
        }

        fn call(&mut self, tag: usize, name: &str) {
            let completion = self.completion(tag);
            self.driver.send(Request::new(name), Some(completion));
        }

        fn attach(&mut self, id: u32) -> mpsc::UnboundedReceiver<Outbound> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.driver.on_connection_event(ConnectionEvent::Connected {
                host: HostId::new(id),
                writer: tx,
            });
            rx
        }

        fn outcomes(&self) -> Vec<(usize, CallResult)> {
            self.outcomes.lock().expect("outcomes lock").clone()
        }

        fn next_event(&mut self) -> Option<ClientEvent> { self.events.try_recv().ok() }

        /// Run every drain step the driver has scheduled for itself.
        fn pump(&mut self) {
            while let Ok(internal) = self.inbox.internal.try_recv() {
                if matches!(internal, Internal::Drain) {
                    self.driver.drain_step();
                }
            }
        }

        /// Wait for the next reconnect timer and report how long it slept.
        async fn next_reconnect(&mut self) -> (HostId, Duration) {
            let started = Instant::now();
            loop {
                let internal = self.inbox.internal.recv().await.expect("driver channel open");
                if let Internal::Reconnect(id) = internal {
                    return (id, started.elapsed());
                }
            }
        }

        /// Stop the socket task a reconnect spawned before it runs.
        fn abort_socket(&mut self, id: HostId) {
            let link = self.driver.links.get_mut(&id).expect("known host");
            link.task.take().expect("socket task").abort();
        }
    }

    fn written_commands(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<(u32, String)> {
        let mut codec = GatewayCodec::new();
        let mut written = Vec::new();
        while let Ok(Outbound::Frame(bytes)) = rx.try_recv() {
            let mut buf = bytes::BytesMut::from(&bytes[..]);
            let frame = tokio_util::codec::Decoder::decode(&mut codec, &mut buf)
                .expect("decode")
                .expect("whole frame")
                .expect("valid body");
            let name = frame.request_body().expect("request body").name;
            written.push((frame.call_id, name));
        }
        written
    }

    #[fixture]
    fn harness() -> Harness {
        let config = ClientConfig::with_hosts(["gw-a:4848", "gw-b:4848"])
            .timeout(Duration::from_millis(100))
            .queue_capacity(2);
        let hosts = HostTable::from_config(&config).expect("hosts");
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (notifier, events) = broadcast::channel(16);
        let (status, _) = watch::channel(Status::default());
        let (driver, inbox) = Driver::new(config, &hosts, commands_rx, notifier, status);
        Harness {
            driver,
            events,
            outcomes: Outcomes::default(),
            inbox,
            _commands: commands_tx,
        }
    }

    #[rstest]
    #[case(0, Duration::ZERO)]
    #[case(1, Duration::from_secs(1))]
    #[case(5, Duration::from_secs(5))]
    #[case(60, Duration::from_secs(60))]
    #[case(61, Duration::from_secs(60))]
    #[case(u32::MAX, Duration::from_secs(60))]
    fn backoff_grows_linearly_to_cap(#[case] attempt: u32, #[case] expected: Duration) {
        assert_eq!(backoff_delay(attempt, 60, Duration::from_secs(1)), expected);
    }

    #[rstest]
    fn calls_queue_until_first_connection(mut harness: Harness) {
        harness.call(1, "a");
        harness.call(2, "b");
        assert_eq!(harness.driver.queue.len(), 2);

        let mut writer = harness.attach(1);
        assert_eq!(harness.next_event(), Some(ClientEvent::Open));
        harness.driver.drain_step();
        harness.driver.drain_step();

        assert_eq!(written_commands(&mut writer), vec![
            (1, "a".to_owned()),
            (2, "b".to_owned()),
        ]);
        assert!(harness.driver.queue.is_empty());
    }

    #[rstest]
    fn full_queue_fails_submitting_call_and_sheds_backlog(mut harness: Harness) {
        harness.call(1, "a");
        harness.call(2, "b");
        harness.call(3, "c");

        assert_eq!(harness.outcomes(), vec![(3, Err(CallError::NotConnected))]);
        assert!(harness.driver.queue.is_empty());
        // Shed calls stay registered and time out.
        assert_eq!(harness.driver.registry.len(), 2);
        harness
            .driver
            .tick(Instant::now() + Duration::from_millis(100));
        let mut outcomes = harness.outcomes();
        outcomes.sort_by_key(|(tag, _)| *tag);
        assert_eq!(outcomes, vec![
            (1, Err(CallError::Timeout)),
            (2, Err(CallError::Timeout)),
            (3, Err(CallError::NotConnected)),
        ]);
    }

    #[rstest]
    fn reply_frames_resolve_pending_calls(mut harness: Harness) {
        let _writer = harness.attach(1);
        harness.call(7, "triton.echo");

        harness.driver.on_connection_event(ConnectionEvent::Frame {
            host: HostId::new(1),
            frame: Frame::reply(1, json!({"ok": true})),
        });

        assert_eq!(harness.outcomes(), vec![(7, Ok(json!({"ok": true})))]);
        assert!(harness.driver.registry.is_empty());
    }

    #[rstest]
    fn open_and_close_fire_on_first_and_last_connection(mut harness: Harness) {
        let _a = harness.attach(1);
        let _b = harness.attach(2);
        assert_eq!(harness.next_event(), Some(ClientEvent::Open));
        assert_eq!(harness.driver.status.borrow().active, 2);

        harness.driver.closed = true;
        harness
            .driver
            .on_connection_event(ConnectionEvent::Closed { host: HostId::new(1) });
        assert_eq!(harness.next_event(), None);
        harness
            .driver
            .on_connection_event(ConnectionEvent::Closed { host: HostId::new(2) });
        assert_eq!(harness.next_event(), Some(ClientEvent::Close));
        assert_eq!(harness.driver.status.borrow().active, 0);
    }

    #[rstest]
    fn heartbeat_goes_to_every_active_connection(mut harness: Harness) {
        let mut a = harness.attach(1);
        let mut b = harness.attach(2);

        harness.driver.tick(Instant::now());

        let heartbeat = vec![(NO_REPLY, HEARTBEAT_COMMAND.to_owned())];
        assert_eq!(written_commands(&mut a), heartbeat);
        assert_eq!(written_commands(&mut b), heartbeat);
    }

    #[rstest]
    fn close_ends_sockets_and_rejects_new_calls(mut harness: Harness) {
        let mut writer = harness.attach(1);
        harness.call(1, "pending");
        written_commands(&mut writer);

        harness.driver.close();
        assert!(matches!(writer.try_recv(), Ok(Outbound::End)));

        harness.call(2, "late");
        assert_eq!(harness.outcomes(), vec![(2, Err(CallError::Closed))]);
        assert!(!harness.driver.is_finished());

        harness.driver.tick(Instant::now() + Duration::from_millis(100));
        harness
            .driver
            .on_connection_event(ConnectionEvent::Closed { host: HostId::new(1) });
        assert!(harness.driver.is_finished());
        assert!(written_commands(&mut writer).is_empty());
    }

    #[rstest]
    fn unreadable_frames_are_reported_not_fatal(mut harness: Harness) {
        let _writer = harness.attach(1);
        harness.next_event();
        let error = serde_json::from_slice::<serde_json::Value>(b"{")
            .expect_err("truncated json");

        harness.driver.on_connection_event(ConnectionEvent::Malformed {
            host: HostId::new(1),
            error: crate::error::FrameError::Malformed {
                call_id: 4,
                source: error,
            },
        });

        assert!(matches!(
            harness.next_event(),
            Some(ClientEvent::Error { host, .. }) if host.id() == HostId::new(1)
        ));
        assert!(harness.driver.pool.is_connected());
    }

    #[rstest]
    #[tokio::test]
    async fn stale_connection_falls_back_to_a_live_one(mut harness: Harness) {
        let a = harness.attach(1);
        let mut b = harness.attach(2);
        harness.pump();
        // Host 1's socket task has exited but its `Closed` is still in flight.
        drop(a);

        harness.call(1, "first");
        assert_eq!(written_commands(&mut b), vec![(1, "first".to_owned())]);
        assert!(harness.driver.queue.is_empty());

        harness
            .driver
            .on_connection_event(ConnectionEvent::Closed { host: HostId::new(1) });
        harness.call(2, "second");
        assert_eq!(written_commands(&mut b), vec![(2, "second".to_owned())]);
        assert!(harness.outcomes().is_empty());
    }

    #[rstest]
    fn queued_calls_drain_when_any_connection_joins(mut harness: Harness) {
        let a = harness.attach(1);
        let b = harness.attach(2);
        harness.pump();
        drop((a, b));

        harness.call(1, "first");
        assert_eq!(harness.driver.queue.len(), 1);
        assert_eq!(harness.driver.status.borrow().queued, 1);

        // Host 2 is still counted active, so this is not the first connection.
        let mut fresh = harness.attach(1);
        assert_eq!(harness.driver.pool.active_count(), 2);
        harness.pump();

        assert_eq!(written_commands(&mut fresh), vec![(1, "first".to_owned())]);
        assert!(harness.driver.queue.is_empty());
        assert_eq!(harness.driver.status.borrow().queued, 0);
    }

    #[rstest]
    fn shed_clears_a_full_queue_only_while_disconnected(mut harness: Harness) {
        harness.call(1, "a");
        harness.call(2, "b");
        assert_eq!(harness.driver.status.borrow().queued, 2);

        harness.driver.shed();

        assert!(harness.driver.queue.is_empty());
        assert_eq!(harness.driver.status.borrow().queued, 0);
        assert_eq!(
            harness.next_event(),
            Some(ClientEvent::Log("outbound queue full; dropped 2 queued calls".to_owned()))
        );
        // Shed calls are still registered and end by timeout.
        assert_eq!(harness.driver.registry.len(), 2);
        assert!(harness.outcomes().is_empty());
    }

    #[rstest]
    fn shed_leaves_a_queue_with_room_alone(mut harness: Harness) {
        harness.call(1, "a");

        harness.driver.shed();

        assert_eq!(harness.driver.queue.len(), 1);
        assert_eq!(harness.next_event(), None);
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn reconnect_delay_grows_per_attempt_and_resets_on_connect(mut harness: Harness) {
        let host = HostId::new(1);
        let _first = harness.attach(1);
        let mut slept = Vec::new();

        for _ in 0..4 {
            harness
                .driver
                .on_connection_event(ConnectionEvent::Closed { host });
            let (id, delay) = harness.next_reconnect().await;
            assert_eq!(id, host);
            slept.push(delay.as_secs());
            harness.driver.reconnect(host);
            harness.abort_socket(host);
        }
        assert_eq!(harness.driver.links[&host].attempt, 4);

        let _second = harness.attach(1);
        assert_eq!(harness.driver.links[&host].attempt, 0);
        harness
            .driver
            .on_connection_event(ConnectionEvent::Closed { host });
        let (_, delay) = harness.next_reconnect().await;
        slept.push(delay.as_secs());

        // A healthy link retries at once; each failed retry adds one unit.
        assert_eq!(slept, vec![0, 1, 2, 3, 0]);
    }
}
