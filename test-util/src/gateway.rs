//! In-process gateway used by integration suites.
//!
//! [`MockGateway`] binds an ephemeral loopback port and answers a handful of
//! fixed commands. It records every request name it receives, including
//! heartbeats, so tests can assert on traffic without inspecting sockets.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    sync::watch,
    task::JoinHandle,
};
use tokio_util::codec::Framed;
use tracing::{debug, warn};
use triton_client::{
    Frame,
    FrameKind,
    GatewayCodec,
    codes,
    frame::{FrameHeader, HEADER_LEN, NO_REPLY},
    lock::{ACQUIRE_COMMAND, RELEASE_COMMAND},
};

use crate::AnyError;

/// Replies with the request payload.
pub const ECHO_COMMAND: &str = "triton.echo";
/// Replies with an error frame carrying code 500.
pub const FAIL_COMMAND: &str = "triton.fail";
/// Replies with the gateway's label.
pub const WHOAMI_COMMAND: &str = "triton.whoami";
/// Never replies.
pub const SLOW_COMMAND: &str = "triton.slow";
/// Sends an unreadable frame, then echoes like [`ECHO_COMMAND`].
pub const GARBAGE_COMMAND: &str = "triton.garbage";

#[derive(Debug)]
struct Shared {
    label: String,
    received: Mutex<Vec<String>>,
    accepted: AtomicUsize,
    refuse: AtomicUsize,
    owners: AtomicUsize,
}

impl Shared {
    fn record(&self, name: &str) {
        let mut received = match self.received.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        received.push(name.to_owned());
    }

    fn respond(&self, frame: &Frame) -> Option<Frame> {
        let Some(request) = frame.request_body() else {
            warn!(call_id = frame.call_id, "mock gateway got a non-request frame");
            return None;
        };
        self.record(&request.name);
        if frame.call_id == NO_REPLY {
            return None;
        }
        let id = frame.call_id;
        match request.name.as_str() {
            ECHO_COMMAND | GARBAGE_COMMAND => Some(Frame::reply(id, request.body)),
            FAIL_COMMAND => Some(Frame::error(id, "requested failure", Some(codes::server::ERROR))),
            WHOAMI_COMMAND => Some(Frame::reply(id, json!(self.label))),
            SLOW_COMMAND => None,
            ACQUIRE_COMMAND => {
                let n = self.owners.fetch_add(1, Ordering::SeqCst);
                Some(Frame::reply(id, json!(format!("{}-owner-{n}", self.label))))
            }
            RELEASE_COMMAND => Some(Frame::reply(id, Value::Bool(true))),
            _ => Some(Frame::error(id, "unknown command", Some(codes::client::NOT_FOUND))),
        }
    }
}

/// Gateway stand-in listening on `127.0.0.1`.
///
/// Dropping the gateway stops accepting and closes every open connection.
#[derive(Debug)]
pub struct MockGateway {
    addr: SocketAddr,
    shared: Arc<Shared>,
    kick: watch::Sender<u64>,
    accept: JoinHandle<()>,
}

impl MockGateway {
    /// Bind an ephemeral port and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start(label: impl Into<String>) -> Result<Self, AnyError> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            label: label.into(),
            received: Mutex::new(Vec::new()),
            accepted: AtomicUsize::new(0),
            refuse: AtomicUsize::new(0),
            owners: AtomicUsize::new(0),
        });
        let (kick, _) = watch::channel(0);
        let accept = tokio::spawn(accept_loop(listener, Arc::clone(&shared), kick.clone()));
        debug!(%addr, label = %shared.label, "mock gateway listening");
        Ok(Self {
            addr,
            shared,
            kick,
            accept,
        })
    }

    /// Bound port.
    #[must_use]
    pub const fn port(&self) -> u16 { self.addr.port() }

    /// `host:port` entry for a client configuration.
    #[must_use]
    pub fn host(&self) -> String { self.addr.to_string() }

    /// Label returned by [`WHOAMI_COMMAND`].
    #[must_use]
    pub fn label(&self) -> &str { &self.shared.label }

    /// Every request name received so far, in arrival order.
    #[must_use]
    pub fn received(&self) -> Vec<String> {
        match self.shared.received.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// How many requests named `name` have arrived.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.received().iter().filter(|seen| *seen == name).count()
    }

    /// Connections accepted so far, including refused ones.
    #[must_use]
    pub fn accepted(&self) -> usize { self.shared.accepted.load(Ordering::SeqCst) }

    /// Close the next `n` connections immediately after accepting them.
    pub fn refuse_next(&self, n: usize) { self.shared.refuse.store(n, Ordering::SeqCst); }

    /// Close every open connection; the listener keeps accepting.
    pub fn disconnect_all(&self) { self.kick.send_modify(|generation| *generation += 1); }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.accept.abort();
        self.disconnect_all();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>, kick: watch::Sender<u64>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                warn!(%error, "mock gateway accept failed");
                continue;
            }
        };
        shared.accepted.fetch_add(1, Ordering::SeqCst);
        let refused = shared
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            debug!(%peer, "mock gateway dropping connection");
            drop(stream);
            continue;
        }
        tokio::spawn(serve(stream, Arc::clone(&shared), kick.subscribe()));
    }
}

async fn serve(stream: TcpStream, shared: Arc<Shared>, mut kick: watch::Receiver<u64>) {
    let mut framed = Framed::new(stream, GatewayCodec::new());
    loop {
        tokio::select! {
            _ = kick.changed() => break,
            next = framed.next() => match next {
                Some(Ok(Ok(frame))) => {
                    let garbage = frame
                        .request_body()
                        .is_some_and(|request| request.name == GARBAGE_COMMAND);
                    if garbage && send_garbage(&mut framed, frame.call_id).await.is_err() {
                        break;
                    }
                    if let Some(reply) = shared.respond(&frame) {
                        if framed.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Err(error))) => warn!(%error, "mock gateway skipped a frame"),
                Some(Err(_)) | None => break,
            }
        }
    }
}

async fn send_garbage(
    framed: &mut Framed<TcpStream, GatewayCodec>,
    call_id: u32,
) -> Result<(), AnyError> {
    const BODY: &[u8] = b"{not json";
    let header = FrameHeader {
        kind: FrameKind::Reply,
        body_len: u32::try_from(BODY.len())?,
        call_id,
    };
    let mut raw = [0u8; HEADER_LEN];
    header.write_bytes(&mut raw);
    SinkExt::<Frame>::flush(framed).await?;
    let socket = framed.get_mut();
    socket.write_all(&raw).await?;
    socket.write_all(BODY).await?;
    Ok(())
}
