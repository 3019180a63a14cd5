//! Request Dispatcher
//!
//! [`Client`] is the public handle. It is cheap to clone and every clone
//! talks to the same connection.
//!
//! Redis answers requests on one stream strictly in order, so the client
//! keeps the order trivially: a query takes the session lock, writes its
//! frame, reads exactly one reply and only then releases the lock.
//! Concurrent callers queue on the lock instead of interleaving on the
//! socket. Pipelines take the same lock for the whole batch.

use crate::client::pipeline::Pipeline;
use crate::client::supervisor::{self, Shared};
use crate::config::{ClientConfig, Endpoint, ReconnectPolicy};
use crate::connection::{ClientStats, Connection, ConnectionState, StatsSnapshot};
use crate::error::{ClientError, ClientResult};
use crate::protocol::{encode_command, RespValue};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Async client for a Redis-compatible server.
///
/// # Example
///
/// ```no_run
/// use flashkv_client::{Client, Endpoint, ReconnectPolicy, RespValue};
///
/// # async fn run() -> flashkv_client::ClientResult<()> {
/// let client = Client::connect(Endpoint::default(), ReconnectPolicy::interval_millis(100)).await?;
///
/// assert_eq!(client.query(&["SET", "foo", "bar"]).await?, RespValue::ok());
/// assert_eq!(client.query(&["GET", "foo"]).await?, RespValue::bulk_string("bar"));
/// assert_eq!(client.query(&["GET", "missing"]).await?, RespValue::Null);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Connects to `endpoint` and performs the handshake.
    ///
    /// The initial connection is not retried; `policy` applies to failures
    /// after this call returned.
    pub async fn connect(endpoint: Endpoint, policy: ReconnectPolicy) -> ClientResult<Self> {
        Self::with_config(ClientConfig::new(endpoint).with_reconnect(policy)).await
    }

    /// Connects with a full configuration.
    pub async fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let stats = Arc::new(ClientStats::new());
        let conn =
            Connection::connect(&config.endpoint, config.connect_timeout, Arc::clone(&stats))
                .await?;

        Ok(Self {
            shared: Arc::new(Shared::new(config, conn, stats)),
        })
    }

    /// Sends one command and returns its reply.
    ///
    /// Server errors come back as `Ok(RespValue::Error(..))`. A transport
    /// failure drops the connection and is returned as is; the command is
    /// never re-sent.
    ///
    /// Dropping the returned future after the command was written costs the
    /// connection: the next request finds it in flight, drops it and fails
    /// with [`ClientError::NotConnected`].
    pub async fn query<A: AsRef<[u8]>>(&self, command: &[A]) -> ClientResult<RespValue> {
        let frame = encode_command(command).map_err(ClientError::InvalidCommand)?;
        let deadline = Deadline::after(self.shared.config.request_timeout);

        let mut session = self.shared.session.lock().await;
        let conn = supervisor::checkout(&self.shared, &mut session)?;

        let result = async {
            conn.begin_request();
            deadline.bound(conn.send(&frame)).await?;
            self.shared.stats.command_sent();
            let reply = deadline.bound(conn.receive()).await;
            if reply.is_ok() {
                conn.end_request();
            }
            reply
        }
        .await;

        match &result {
            Ok(reply) => trace!(reply = %reply, "Query complete"),
            Err(e) => {
                debug!(error = %e, "Query failed");
                supervisor::connection_failed(&self.shared, &mut session, e);
            }
        }
        result
    }

    /// Sends a batch of commands in one write and returns their replies in
    /// order.
    ///
    /// ```no_run
    /// # use flashkv_client::{Client, Endpoint, ReconnectPolicy};
    /// # async fn run(client: Client) -> flashkv_client::ClientResult<()> {
    /// let replies = client
    ///     .query_pipe(&[vec!["SET", "a", "1"], vec!["INCR", "a"], vec!["GET", "a"]])
    ///     .await?;
    /// assert_eq!(replies.len(), 3);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn query_pipe<C, A>(&self, commands: &[C]) -> ClientResult<Vec<RespValue>>
    where
        C: AsRef<[A]>,
        A: AsRef<[u8]>,
    {
        let mut pipeline = Pipeline::with_capacity(commands.len());
        for command in commands {
            pipeline.cmd(command.as_ref())?;
        }
        self.execute(&pipeline).await
    }

    /// Runs a prepared [`Pipeline`]. An empty pipeline returns no replies
    /// without touching the connection.
    pub async fn execute(&self, pipeline: &Pipeline) -> ClientResult<Vec<RespValue>> {
        if pipeline.is_empty() {
            return Ok(Vec::new());
        }
        let deadline = Deadline::after(self.shared.config.request_timeout);

        let mut session = self.shared.session.lock().await;
        let conn = supervisor::checkout(&self.shared, &mut session)?;

        let result = pipeline.run(conn, deadline, &self.shared.stats).await;

        if let Err(e) = &result {
            debug!(error = %e, commands = pipeline.len(), "Pipeline failed");
            supervisor::connection_failed(&self.shared, &mut session, e);
        }
        result
    }

    /// Reconnects now. Returns immediately when already connected.
    pub async fn reconnect(&self) -> ClientResult<()> {
        supervisor::reconnect(&self.shared).await
    }

    /// Closes the connection. Automatic reconnects stop until
    /// [`reconnect`](Self::reconnect) is called.
    pub async fn disconnect(&self) {
        supervisor::disconnect(&self.shared).await
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_rx.borrow()
    }

    /// Watches connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_rx.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.shared.config.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

/// Absolute deadline for one operation, shared by all of its I/O steps.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline(Option<(Instant, Duration)>);

impl Deadline {
    pub(crate) fn after(limit: Option<Duration>) -> Self {
        Deadline(limit.map(|limit| (Instant::now() + limit, limit)))
    }

    pub(crate) async fn bound<T, F>(&self, fut: F) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>>,
    {
        match self.0 {
            Some((at, limit)) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| ClientError::Timeout(limit))?,
            None => fut.await,
        }
    }
}
