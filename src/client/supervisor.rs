//! Reconnection Supervisor
//!
//! The supervisor owns the connection slot of a client and its state
//! machine:
//!
//! ```text
//!                  connect ok
//!  Disconnected ──────────────> Connecting ──────────────> Connected
//!       ▲                           │        handshake ok      │
//!       │        connect failed     │                          │
//!       ├───────────────────────────┘                          │
//!       │                 transport error during a query       │
//!       └──────────────────────────────────────────────────────┘
//! ```
//!
//! After a transport error the socket is dropped and, with
//! [`ReconnectPolicy::Interval`], a background task retries every interval
//! until a handshake succeeds. Queries never wait for it: while the slot is
//! empty they fail with [`ClientError::NotConnected`].
//!
//! A request whose future is dropped between writing and reading leaves
//! its replies on the socket. The connection stays marked in flight, and
//! the next caller to take the lock drops it as if it had failed.
//!
//! Every manual `disconnect`/`reconnect` bumps an epoch counter. A reconnect
//! attempt that finishes under an older epoch throws its socket away, so a
//! stale task can never resurrect a connection the caller closed.

use crate::config::{ClientConfig, ReconnectPolicy};
use crate::connection::{ClientStats, Connection, ConnectionState};
use crate::error::{ClientError, ClientResult};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// State shared by all handles of one client.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,

    /// The dispatcher lock: held for a full write-then-read round trip
    pub(crate) session: Mutex<Session>,

    pub(crate) stats: Arc<ClientStats>,

    /// Mirror of `Session::state` readable without taking the lock
    pub(crate) state_rx: watch::Receiver<ConnectionState>,
}

/// Everything guarded by the dispatcher lock.
pub(crate) struct Session {
    conn: Option<Connection>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    epoch: u64,
    reconnect_task: Option<JoinHandle<()>>,
}

impl Shared {
    pub(crate) fn new(config: ClientConfig, conn: Connection, stats: Arc<ClientStats>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let session = Session {
            conn: Some(conn),
            state: ConnectionState::Connected,
            state_tx,
            epoch: 0,
            reconnect_task: None,
        };

        Self {
            config,
            session: Mutex::new(session),
            stats,
            state_rx,
        }
    }

    async fn connect_attempt(&self) -> ClientResult<Connection> {
        Connection::connect(
            &self.config.endpoint,
            self.config.connect_timeout,
            Arc::clone(&self.stats),
        )
        .await
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.session.get_mut().cancel_reconnect();
    }
}

impl Session {
    /// Returns the live connection, or `NotConnected`.
    pub(crate) fn connection(&mut self) -> ClientResult<&mut Connection> {
        self.conn.as_mut().ok_or(ClientError::NotConnected)
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn install(&mut self, conn: Connection) {
        self.conn = Some(conn);
        self.set_state(ConnectionState::Connected);
    }

    fn cancel_reconnect(&mut self) {
        if let Some(task) = self.reconnect_task.take() {
            task.abort();
        }
    }
}

/// Returns the connection for a new request, dropping it first if a
/// cancelled request left it in flight.
pub(crate) fn checkout<'a>(
    shared: &Arc<Shared>,
    session: &'a mut Session,
) -> ClientResult<&'a mut Connection> {
    if discard_abandoned(shared, session) {
        return Err(ClientError::NotConnected);
    }
    session.connection()
}

fn discard_abandoned(shared: &Arc<Shared>, session: &mut Session) -> bool {
    let abandoned = matches!(&session.conn, Some(conn) if conn.is_in_flight());
    if abandoned {
        connection_failed(shared, session, &ClientError::Abandoned);
    }
    abandoned
}

/// Handles a failed query. Must be called with the session lock held.
///
/// Non-transport errors leave the connection alone. Transport errors drop
/// the socket and apply the reconnect policy.
pub(crate) fn connection_failed(shared: &Arc<Shared>, session: &mut Session, err: &ClientError) {
    if !err.is_transport() {
        return;
    }

    shared.stats.transport_failure();
    session.conn = None;
    session.set_state(ConnectionState::Disconnected);
    warn!(peer = %shared.config.endpoint, error = %err, "Connection lost");

    match shared.config.reconnect {
        ReconnectPolicy::NoReconnect => {
            info!(peer = %shared.config.endpoint, "Automatic reconnect disabled, staying disconnected");
        }
        ReconnectPolicy::Interval(interval) => schedule_reconnect(shared, session, interval),
    }
}

fn schedule_reconnect(shared: &Arc<Shared>, session: &mut Session, interval: Duration) {
    session.cancel_reconnect();
    debug!(
        peer = %shared.config.endpoint,
        interval_ms = interval.as_millis() as u64,
        "Scheduling reconnect"
    );
    let task = tokio::spawn(reconnect_loop(Arc::downgrade(shared), session.epoch, interval));
    session.reconnect_task = Some(task);
}

/// Retries every `interval` until connected, superseded, or rejected by
/// the handshake.
async fn reconnect_loop(weak: Weak<Shared>, epoch: u64, interval: Duration) {
    let mut attempt: u64 = 0;

    loop {
        tokio::time::sleep(interval).await;

        // The client was dropped while we slept.
        let Some(shared) = weak.upgrade() else {
            return;
        };
        attempt += 1;

        {
            let mut session = shared.session.lock().await;
            if session.epoch != epoch || session.state != ConnectionState::Disconnected {
                return;
            }
            session.set_state(ConnectionState::Connecting);
        }

        debug!(peer = %shared.config.endpoint, attempt = attempt, "Attempting reconnect");
        let result = shared.connect_attempt().await;

        let mut session = shared.session.lock().await;
        if session.epoch != epoch {
            return;
        }

        match result {
            Ok(conn) => {
                session.install(conn);
                session.reconnect_task = None;
                shared.stats.reconnected();
                info!(peer = %shared.config.endpoint, attempt = attempt, "Reconnected");
                return;
            }
            Err(e) if e.is_handshake() => {
                session.set_state(ConnectionState::Disconnected);
                session.reconnect_task = None;
                error!(
                    peer = %shared.config.endpoint,
                    error = %e,
                    "Handshake rejected, giving up on automatic reconnect"
                );
                return;
            }
            Err(e) => {
                session.set_state(ConnectionState::Disconnected);
                warn!(
                    peer = %shared.config.endpoint,
                    attempt = attempt,
                    error = %e,
                    retry_in_ms = interval.as_millis() as u64,
                    "Reconnect attempt failed"
                );
            }
        }
    }
}

/// Connects right away, superseding any scheduled attempt.
///
/// Does nothing when already connected.
pub(crate) async fn reconnect(shared: &Arc<Shared>) -> ClientResult<()> {
    let epoch = {
        let mut session = shared.session.lock().await;
        discard_abandoned(shared, &mut session);
        if session.state == ConnectionState::Connected {
            return Ok(());
        }
        session.cancel_reconnect();
        session.epoch += 1;
        session.set_state(ConnectionState::Connecting);
        session.epoch
    };

    info!(peer = %shared.config.endpoint, "Reconnecting");
    let result = shared.connect_attempt().await;

    let mut session = shared.session.lock().await;
    if session.epoch != epoch {
        // A disconnect or another reconnect won the race.
        return Err(ClientError::NotConnected);
    }

    match result {
        Ok(conn) => {
            session.install(conn);
            shared.stats.reconnected();
            Ok(())
        }
        Err(e) => {
            session.set_state(ConnectionState::Disconnected);
            if let ReconnectPolicy::Interval(interval) = shared.config.reconnect {
                if !e.is_handshake() {
                    schedule_reconnect(shared, &mut session, interval);
                }
            }
            Err(e)
        }
    }
}

/// Closes the connection and stops automatic reconnects.
pub(crate) async fn disconnect(shared: &Arc<Shared>) {
    let conn = {
        let mut session = shared.session.lock().await;
        session.cancel_reconnect();
        session.epoch += 1;
        session.set_state(ConnectionState::Disconnected);
        session.conn.take()
    };

    if let Some(conn) = conn {
        conn.shutdown().await;
    }
    info!(peer = %shared.config.endpoint, "Disconnected");
}
