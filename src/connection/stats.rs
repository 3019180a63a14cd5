//! Client Statistics
//!
//! Lock-free counters shared by a client, its connections and its
//! reconnect task. All updates use relaxed ordering; the numbers are for
//! monitoring, not for synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one client.
#[derive(Debug, Default)]
pub struct ClientStats {
    /// Sockets that completed the handshake
    pub connections_opened: AtomicU64,
    /// Successful reconnects after a failure
    pub reconnects: AtomicU64,
    /// Queries that failed with a transport error
    pub transport_failures: AtomicU64,
    /// Single commands written
    pub commands_sent: AtomicU64,
    /// Pipelines written
    pub pipelines_sent: AtomicU64,
    /// Replies decoded
    pub replies_received: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ClientStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reconnected(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pipeline_sent(&self) {
        self.pipelines_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reply_received(&self) {
        self.replies_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Copies the current values into a plain struct.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            pipelines_sent: self.pipelines_sent.load(Ordering::Relaxed),
            replies_received: self.replies_received.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ClientStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_opened: u64,
    pub reconnects: u64,
    pub transport_failures: u64,
    pub commands_sent: u64,
    pub pipelines_sent: u64,
    pub replies_received: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}
