//! Client configuration.
//!
//! [`ClientConfig`] merges built-in defaults, an optional `triton.toml` in the
//! working directory, and `TRITON_`-prefixed environment variables, in that
//! order of precedence. Programmatic callers can also start from
//! [`ClientConfig::default`] and use the builder helpers.

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Port used when a host entry does not name one.
pub const DEFAULT_PORT: u16 = 4848;
/// File consulted by [`ClientConfig::load`].
pub const CONFIG_FILE: &str = "triton.toml";
/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "TRITON_";

/// Runtime configuration for a [`crate::Client`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Single gateway host, assigned the first host id.
    pub host: Option<String>,
    /// Additional gateways as `host[:port]` strings.
    pub hosts: Vec<String>,
    /// Port for entries that omit one.
    pub port: u16,
    /// Per-call timeout in milliseconds.
    pub timeout: u64,
    /// Period of the expiry sweep and heartbeat, in milliseconds.
    pub sweep_interval_ms: u64,
    /// Length of one backoff step, in milliseconds.
    pub backoff_unit_ms: u64,
    /// Cap on the number of backoff steps between reconnect attempts.
    pub max_backoff_steps: u32,
    /// Calls buffered while no connection is active.
    pub queue_capacity: usize,
    /// Close a connection after this long without inbound data.
    pub idle_timeout_ms: Option<u64>,
    /// Largest accepted inbound frame body, in bytes.
    pub max_body_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: None,
            hosts: Vec::new(),
            port: DEFAULT_PORT,
            timeout: 5_000,
            sweep_interval_ms: 1_000,
            backoff_unit_ms: 1_000,
            max_backoff_steps: 60,
            queue_capacity: 1_000,
            idle_timeout_ms: None,
            max_body_len: 16 * 1024 * 1024,
        }
    }
}

impl ClientConfig {
    /// Figment combining defaults, `triton.toml` and the environment.
    #[must_use]
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when a source cannot be parsed or a
    /// value has the wrong type.
    pub fn load() -> Result<Self, ClientError> { Ok(Self::figment().extract()?) }

    /// Configuration targeting a single host on the default port.
    #[must_use]
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            ..Self::default()
        }
    }

    /// Configuration targeting several `host[:port]` entries.
    #[must_use]
    pub fn with_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Override the per-call timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = duration_ms(timeout);
        self
    }

    /// Override the sweep/heartbeat period.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = duration_ms(interval);
        self
    }

    /// Override the length of one backoff step.
    #[must_use]
    pub fn backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit_ms = duration_ms(unit);
        self
    }

    /// Override the outbound queue capacity.
    #[must_use]
    pub const fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Enable the idle read timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub(crate) const fn call_timeout(&self) -> Duration { Duration::from_millis(self.timeout) }

    pub(crate) fn sweep_period(&self) -> Duration {
        // A zero period would make `tokio::time::interval` panic.
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    pub(crate) const fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    pub(crate) fn idle_timeout_duration(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }
}

fn duration_ms(duration: Duration) -> u64 { u64::try_from(duration.as_millis()).unwrap_or(u64::MAX) }

#[cfg(test)]
mod tests {
    use figment::Jail;
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn defaults_match_gateway_conventions() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.port, 4848);
        assert_eq!(cfg.timeout, 5_000);
        assert_eq!(cfg.queue_capacity, 1_000);
        assert_eq!(cfg.max_backoff_steps, 60);
        assert!(cfg.idle_timeout_ms.is_none());
    }

    #[rstest]
    fn env_config_loading() {
        Jail::expect_with(|j| {
            j.set_env("TRITON_HOST", "10.0.0.5");
            j.set_env("TRITON_PORT", "5000");
            j.set_env("TRITON_TIMEOUT", "250");
            let cfg = ClientConfig::load().expect("load");
            assert_eq!(cfg.host.as_deref(), Some("10.0.0.5"));
            assert_eq!(cfg.port, 5000);
            assert_eq!(cfg.timeout, 250);
            Ok(())
        });
    }

    #[rstest]
    fn loads_hosts_from_file() {
        Jail::expect_with(|j| {
            j.create_file(
                CONFIG_FILE,
                "hosts = [\"10.0.0.1:4000\", \"10.0.0.2\"]\nqueue_capacity = 10",
            )?;
            let cfg = ClientConfig::load().expect("load");
            assert_eq!(cfg.hosts, vec!["10.0.0.1:4000", "10.0.0.2"]);
            assert_eq!(cfg.queue_capacity, 10);
            Ok(())
        });
    }

    #[rstest]
    fn env_overrides_file() {
        Jail::expect_with(|j| {
            j.create_file(CONFIG_FILE, "timeout = 100")?;
            j.set_env("TRITON_TIMEOUT", "900");
            let cfg = ClientConfig::load().expect("load");
            assert_eq!(cfg.timeout, 900);
            Ok(())
        });
    }

    #[rstest]
    fn rejects_mistyped_values() {
        Jail::expect_with(|j| {
            j.set_env("TRITON_PORT", "not-a-port");
            let err = ClientConfig::load().expect_err("port must be numeric");
            assert!(matches!(err, ClientError::Config(_)));
            Ok(())
        });
    }

    #[rstest]
    fn builder_helpers_convert_durations() {
        let cfg = ClientConfig::with_host("gw")
            .timeout(Duration::from_millis(1500))
            .sweep_interval(Duration::from_millis(20))
            .idle_timeout(Duration::from_secs(3));
        assert_eq!(cfg.timeout, 1500);
        assert_eq!(cfg.sweep_interval_ms, 20);
        assert_eq!(cfg.idle_timeout_ms, Some(3000));
    }
}
