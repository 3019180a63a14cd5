//! Client Configuration
//!
//! [`Endpoint`] says where the server is and how to log in,
//! [`ReconnectPolicy`] says what to do when the socket dies, and
//! [`ClientConfig`] bundles both with the timeouts.
//!
//! ```
//! use flashkv_client::{ClientConfig, Endpoint, ReconnectPolicy};
//! use std::time::Duration;
//!
//! let config = ClientConfig::new(Endpoint::new("10.0.0.5", 6380).database(2))
//!     .with_reconnect(ReconnectPolicy::interval_millis(250))
//!     .with_request_timeout(Duration::from_secs(2));
//! assert_eq!(config.endpoint.addr(), "10.0.0.5:6380");
//! ```

use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::fmt;
use std::time::Duration;

/// Default delay between reconnect attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(500);

/// Location and credentials of a Redis-compatible server.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Database index selected after connecting (0 skips SELECT)
    pub database: u32,
    /// ACL user name, only sent together with a password
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: 0,
            username: None,
            password: None,
        }
    }
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn database(mut self, database: u32) -> Self {
        self.database = database;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Returns the `host:port` string used to open the socket.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.port, self.database)
    }
}

// Hand-written so the password never ends up in logs.
impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// What the client does after the socket fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Stay disconnected until [`Client::reconnect`](crate::Client::reconnect) is called
    NoReconnect,
    /// Retry every interval, forever, with no backoff growth
    Interval(Duration),
}

impl ReconnectPolicy {
    pub fn interval_millis(millis: u64) -> Self {
        ReconnectPolicy::Interval(Duration::from_millis(millis))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Interval(DEFAULT_RECONNECT_INTERVAL)
    }
}

/// Full client configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub reconnect: ReconnectPolicy,
    /// Bounds TCP connect plus the AUTH/SELECT handshake
    pub connect_timeout: Option<Duration>,
    /// Bounds one `query` round trip or one whole pipeline
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Default::default()
        }
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}
