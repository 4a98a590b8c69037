//! Client runtime for a clustered RPC gateway.
//!
//! A [`Client`] keeps a TCP connection to every configured gateway host and
//! multiplexes JSON calls over them. Each call is tagged with a call id so
//! replies can arrive in any order; calls that get no reply are failed by a
//! periodic sweep. Dropped connections are retried with a capped linear
//! backoff, and calls made while nothing is connected wait in a bounded
//! queue.
//!
//! ```no_run
//! use serde_json::json;
//! use triton_client::{Client, ClientConfig, Request};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::open(ClientConfig::with_hosts(["10.0.0.1:4848", "10.0.0.2"]))?;
//! client.wait_connected().await?;
//! let reply = client
//!     .call(Request::new("triton.echo").with_payload(json!({"ping": 1})))
//!     .await?;
//! assert_eq!(reply, json!({"ping": 1}));
//! client.close();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod codes;
pub mod config;
mod connection;
mod driver;
pub mod error;
pub mod event;
pub mod frame;
pub mod host;
pub mod lock;
pub mod pool;
pub mod queue;
pub mod registry;

pub use client::{Client, Request};
pub use codec::GatewayCodec;
pub use config::ClientConfig;
pub use error::{CallError, ClientError, FrameError};
pub use event::ClientEvent;
pub use frame::{Frame, FrameKind};
pub use host::{HostId, HostRecord, HostTable};
pub use lock::Lock;
pub use pool::Route;
pub use registry::{CallResult, Completion};
