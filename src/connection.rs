//! Socket task for one gateway host.
//!
//! A task connects, reports the write side to the driver, then forwards every
//! decoded frame in wire order. It never touches client state itself; the
//! driver owns that. Whatever happens, the last event a task sends is
//! [`ConnectionEvent::Closed`].

#![expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! macro usage"
)]

use std::{io, time::Duration};

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::{
    io::AsyncWriteExt,
    net::{TcpStream, tcp::OwnedWriteHalf},
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use tokio_util::codec::FramedRead;
use tracing::{debug, trace, warn};

use crate::{
    codec::{DecodedFrame, GatewayCodec},
    error::FrameError,
    frame::Frame,
    host::{HostId, HostRecord},
};

/// Message accepted by a socket writer.
#[derive(Debug, Clone)]
pub(crate) enum Outbound {
    /// Write these bytes.
    Frame(Bytes),
    /// Flush, then half-close the socket.
    End,
}

/// Notification from a socket task to the driver.
#[derive(Debug)]
pub(crate) enum ConnectionEvent {
    Connected {
        host: HostId,
        writer: mpsc::UnboundedSender<Outbound>,
    },
    Frame {
        host: HostId,
        frame: Frame,
    },
    Malformed {
        host: HostId,
        error: FrameError,
    },
    Failed {
        host: HostId,
        error: FrameError,
    },
    Timeout {
        host: HostId,
    },
    Closed {
        host: HostId,
    },
}

/// Socket options taken from the client configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionSettings {
    pub idle_timeout: Option<Duration>,
    pub max_body_len: usize,
}

enum Inbound {
    Decoded(DecodedFrame),
    Failed(FrameError),
    Eof,
    Idle,
}

/// Spawn the socket task for `host`.
pub(crate) fn spawn(
    host: HostRecord,
    settings: ConnectionSettings,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move { run(host, settings, events).await })
}

async fn run(
    host: HostRecord,
    settings: ConnectionSettings,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let id = host.id();
    match connect(&host).await {
        Ok(stream) => serve(stream, &host, settings, &events).await,
        Err(error) => {
            debug!(%host, %error, "connect failed");
            emit(&events, ConnectionEvent::Failed {
                host: id,
                error: error.into(),
            });
        }
    }
    emit(&events, ConnectionEvent::Closed { host: id });
}

async fn connect(host: &HostRecord) -> io::Result<TcpStream> {
    let stream = TcpStream::connect((host.address(), host.port())).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn serve(
    stream: TcpStream,
    host: &HostRecord,
    settings: ConnectionSettings,
    events: &mpsc::UnboundedSender<ConnectionEvent>,
) {
    let id = host.id();
    let (read_half, write_half) = stream.into_split();
    let (writer_tx, writer_rx) = mpsc::unbounded_channel();
    emit(events, ConnectionEvent::Connected {
        host: id,
        writer: writer_tx,
    });

    let mut writer = tokio::spawn(write_loop(write_half, writer_rx));
    let mut writer_done = false;
    let codec = GatewayCodec::new().with_max_body_len(settings.max_body_len);
    let mut frames = FramedRead::new(read_half, codec);

    loop {
        tokio::select! {
            result = &mut writer, if !writer_done => {
                writer_done = true;
                let error = match result {
                    // Half-closed on request; keep reading until the gateway hangs up.
                    Ok(Ok(())) => continue,
                    Ok(Err(error)) => error,
                    Err(join_error) => io::Error::other(join_error),
                };
                warn!(%host, %error, "socket write failed");
                emit(events, ConnectionEvent::Failed { host: id, error: error.into() });
                break;
            }
            inbound = read_next(&mut frames, settings.idle_timeout) => match inbound {
                Inbound::Decoded(Ok(frame)) => {
                    trace!(%host, call_id = frame.call_id, kind = ?frame.kind, "frame received");
                    emit(events, ConnectionEvent::Frame { host: id, frame });
                }
                Inbound::Decoded(Err(error)) => {
                    emit(events, ConnectionEvent::Malformed { host: id, error });
                }
                Inbound::Failed(error) => {
                    warn!(%host, %error, "socket read failed");
                    emit(events, ConnectionEvent::Failed { host: id, error });
                    break;
                }
                Inbound::Idle => {
                    emit(events, ConnectionEvent::Timeout { host: id });
                    break;
                }
                Inbound::Eof => {
                    debug!(%host, "gateway closed the connection");
                    break;
                }
            }
        }
    }

    writer.abort();
}

async fn read_next<R>(frames: &mut FramedRead<R, GatewayCodec>, idle: Option<Duration>) -> Inbound
where
    R: tokio::io::AsyncRead + Unpin,
{
    let next = match idle {
        Some(limit) => match timeout(limit, frames.next()).await {
            Ok(next) => next,
            Err(_) => return Inbound::Idle,
        },
        None => frames.next().await,
    };
    match next {
        Some(Ok(decoded)) => Inbound::Decoded(decoded),
        Some(Err(error)) => Inbound::Failed(error),
        None => Inbound::Eof,
    }
}

async fn write_loop(
    mut half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) -> io::Result<()> {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Frame(bytes) => half.write_all(&bytes).await?,
            Outbound::End => break,
        }
    }
    half.shutdown().await
}

fn emit(events: &mpsc::UnboundedSender<ConnectionEvent>, event: ConnectionEvent) {
    if events.send(event).is_err() {
        trace!("driver stopped; dropping connection event");
    }
}
