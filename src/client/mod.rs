//! Client Module
//!
//! The request-facing half of the crate: the dispatcher that serializes
//! queries, the pipeline executor, and the supervisor that owns the
//! connection and reconnects it.
//!
//! ## Architecture
//!
//! ```text
//!   caller tasks ──┐
//!   caller tasks ──┼──> Client::query / Client::execute
//!   caller tasks ──┘              │
//!                                 │ lock (one round trip at a time)
//!                                 ▼
//!                  ┌──────────────────────────────┐
//!                  │           Session            │
//!                  │  Option<Connection> + state  │<──── reconnect task
//!                  └──────────────┬───────────────┘      (Interval policy)
//!                                 │
//!                                 ▼
//!                       send frame(s) / receive
//! ```

pub mod dispatcher;
pub mod pipeline;
mod supervisor;

// Re-export commonly used types
pub use dispatcher::Client;
pub use pipeline::Pipeline;
