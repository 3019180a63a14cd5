//! Pipeline Executor
//!
//! A [`Pipeline`] buffers encoded commands so the whole batch goes out in a
//! single write. The executor then reads exactly one reply per command, in
//! order, while holding the session lock, so no other query can slip in
//! between the frames or the replies.
//!
//! If the socket fails after the batch was written, the replies that did
//! arrive are handed back inside [`ClientError::PipelineIncomplete`]. The
//! caller can tell exactly which commands were answered; the rest may or
//! may not have run on the server.

use crate::client::dispatcher::Deadline;
use crate::connection::{ClientStats, Connection};
use crate::error::{ClientError, ClientResult};
use crate::protocol::{encode_command_into, RespValue};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

/// A batch of commands sent in one write.
///
/// # Example
///
/// ```
/// use flashkv_client::Pipeline;
///
/// let mut pipe = Pipeline::new();
/// pipe.cmd(&["SET", "a", "1"]).unwrap().cmd(&["GET", "a"]).unwrap();
/// assert_eq!(pipe.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    /// Concatenated frames
    buf: Vec<u8>,
    /// Number of commands in `buf`
    count: usize,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pipeline with room for roughly `commands` small commands.
    pub fn with_capacity(commands: usize) -> Self {
        Self {
            buf: Vec::with_capacity(commands * 32),
            count: 0,
        }
    }

    /// Appends a command. An empty argument list is rejected and leaves the
    /// pipeline unchanged.
    pub fn cmd<A: AsRef<[u8]>>(&mut self, args: &[A]) -> ClientResult<&mut Self> {
        encode_command_into(args, &mut self.buf).map_err(ClientError::InvalidCommand)?;
        self.count += 1;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Discards all buffered commands.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.count = 0;
    }

    /// The encoded batch, exactly as it goes on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Writes the batch and reads one reply per command.
    pub(crate) async fn run<S>(
        &self,
        conn: &mut Connection<S>,
        deadline: Deadline,
        stats: &ClientStats,
    ) -> ClientResult<Vec<RespValue>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        conn.begin_request();
        deadline.bound(conn.send(&self.buf)).await?;
        stats.pipeline_sent();
        trace!(commands = self.count, bytes = self.buf.len(), "Pipeline written");

        let mut replies = Vec::with_capacity(self.count);
        while replies.len() < self.count {
            match deadline.bound(conn.receive()).await {
                Ok(reply) => replies.push(reply),
                Err(source) => {
                    return Err(ClientError::PipelineIncomplete {
                        replies,
                        expected: self.count,
                        source: Box::new(source),
                    })
                }
            }
        }
        conn.end_request();
        Ok(replies)
    }
}
