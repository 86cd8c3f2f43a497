//! Reliable realtime connection.
//!
//! - **Machine (`machine.rs`)**: pure transition function over connection
//!   events, returning commands for the driver.
//! - **Backoff (`backoff.rs`)**: capped doubling reconnect delay.
//! - **Client (`client.rs`)**: tokio driver task that owns the socket, the
//!   heartbeat and the retry timer, and a sequential dispatch worker that
//!   decodes frames and routes envelopes.

pub mod backoff;
pub mod client;
pub mod machine;

use crate::envelope::Envelope;
use async_trait::async_trait;

pub use client::{WsClient, WsSettings};

/// Receives decoded envelopes, one at a time, in arrival order.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope);
}
