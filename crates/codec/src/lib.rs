//! modelsync Codec
//!
//! Compresses document text into a compact, URL-safe string and back. The
//! work runs in an isolated worker reached only through request/response
//! messages; callers correlate responses by the `version` they supplied.

pub mod client;
pub mod compression;
pub mod messages;
pub mod worker;

pub use client::{Accepted, CodecClient};
pub use compression::{compress_text, decompress_text, CodecError, DEFAULT_QUALITY};
pub use messages::{CodecRequest, CodecResponse};
pub use worker::{handle_request, CodecWorker};
