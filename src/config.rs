//! Server configuration.
//!
//! The server reads its settings through [`HttpConfig`], so applications can
//! hand over whatever configuration type they already load. [`ServerConfig`]
//! is the ready-made implementation: build it in code, deserialize it with
//! serde (durations in milliseconds), or read it from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings the server snapshots when it is constructed.
///
/// A zero timeout means "no limit".
pub trait HttpConfig {
    /// `host:port` to listen on.
    fn addr(&self) -> &str;

    /// Limit for reading a request's headers, and again for its body.
    fn read_timeout(&self) -> Duration;

    /// Limit for producing a response, handlers included.
    fn write_timeout(&self) -> Duration;

    /// How long shutdown waits for in-flight requests before aborting them.
    fn shutdown_timeout(&self) -> Duration {
        DEFAULT_SHUTDOWN_TIMEOUT
    }
}

/// Plain-data [`HttpConfig`].
///
/// ```rust
/// use std::time::Duration;
/// use switchboard::ServerConfig;
///
/// let config = ServerConfig::new("127.0.0.1:8080")
///     .with_read_timeout(Duration::from_secs(5))
///     .with_write_timeout(Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub addr: String,
    #[serde(rename = "read_timeout_ms", with = "millis")]
    pub read_timeout: Duration,
    #[serde(rename = "write_timeout_ms", with = "millis")]
    pub write_timeout: Duration,
    #[serde(rename = "shutdown_timeout_ms", with = "millis")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:3000".to_owned(),
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into(), ..Self::default() }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Copies the settings out of any [`HttpConfig`].
    pub fn snapshot(config: &(impl HttpConfig + ?Sized)) -> Self {
        Self {
            addr: config.addr().to_owned(),
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }

    /// Reads `SWITCHBOARD_ADDR`, `SWITCHBOARD_READ_TIMEOUT_MS`,
    /// `SWITCHBOARD_WRITE_TIMEOUT_MS` and `SWITCHBOARD_SHUTDOWN_TIMEOUT_MS`
    /// on top of the defaults, then validates the result.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(addr) = lookup("SWITCHBOARD_ADDR") {
            config.addr = addr;
        }
        let millis = |key: &str| -> Result<Option<Duration>, Error> {
            lookup(key)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .map(Duration::from_millis)
                        .map_err(|e| Error::Config(format!("{key}={raw}: {e}")))
                })
                .transpose()
        };
        if let Some(d) = millis("SWITCHBOARD_READ_TIMEOUT_MS")? {
            config.read_timeout = d;
        }
        if let Some(d) = millis("SWITCHBOARD_WRITE_TIMEOUT_MS")? {
            config.write_timeout = d;
        }
        if let Some(d) = millis("SWITCHBOARD_SHUTDOWN_TIMEOUT_MS")? {
            config.shutdown_timeout = d;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that `addr` is a literal socket address.
    pub fn validate(&self) -> Result<SocketAddr, Error> {
        self.addr
            .parse()
            .map_err(|e| Error::Config(format!("invalid address `{}`: {e}", self.addr)))
    }
}

impl HttpConfig for ServerConfig {
    fn addr(&self) -> &str {
        &self.addr
    }

    fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
