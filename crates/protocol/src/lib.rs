//! modelsync Protocol
//!
//! Types exchanged between a document session and the remote analysis
//! backend. Requests flow client → backend, push messages flow back, and every
//! request/response result is wrapped in a [`ResultEnvelope`].

use thiserror::Error;
use uuid::Uuid;

// Re-exports
pub mod client;
pub mod envelope;
pub mod server;
pub mod types;

pub use client::BackendRequest;
pub use envelope::ResultEnvelope;
pub use server::BackendPush;
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A frame from the backend that does not match the protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed result envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    #[error("malformed push message: {0}")]
    MalformedPush(#[source] serde_json::Error),
}
