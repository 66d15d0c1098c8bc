//! Caller-side correlation of codec responses.
//!
//! Each operation class (compress, decompress) accepts only its latest
//! version. A response for any other version is stale and is discarded, so
//! an old decompression can never clobber a newer load.
//!
//! Error responses carry no version. The worker answers strictly in arrival
//! order, so an error belongs to the oldest request still in flight, and it
//! only fails the caller when that request is still the latest of its class.

use std::collections::VecDeque;

use crate::messages::{CodecRequest, CodecResponse};

/// Outcome of feeding a response to [`CodecClient::accept`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepted {
    Compressed(String),
    Decompressed(String),
    /// The latest request of a class failed.
    Failed(String),
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Compress,
    Decompress,
}

#[derive(Debug, Default)]
pub struct CodecClient {
    next_version: u64,
    // Posted and not yet answered, oldest first.
    in_flight: VecDeque<(Operation, u64)>,
    latest_compress: Option<u64>,
    latest_decompress: Option<u64>,
}

impl CodecClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a compress request, superseding any outstanding one.
    pub fn compress(&mut self, text: impl Into<String>) -> CodecRequest {
        let version = self.track(Operation::Compress);
        self.latest_compress = Some(version);
        CodecRequest::Compress {
            text: text.into(),
            version,
        }
    }

    /// Build a decompress request, superseding any outstanding one.
    pub fn decompress(&mut self, compressed_text: impl Into<String>) -> CodecRequest {
        let version = self.track(Operation::Decompress);
        self.latest_decompress = Some(version);
        CodecRequest::Decompress {
            compressed_text: compressed_text.into(),
            version,
        }
    }

    /// Forget any outstanding decompression, e.g. after the document was
    /// replaced by other means.
    pub fn supersede_decompress(&mut self) {
        self.latest_decompress = None;
    }

    pub fn has_pending(&self) -> bool {
        self.latest_compress.is_some() || self.latest_decompress.is_some()
    }

    /// Whether the worker still owes an answer to some compress request,
    /// superseded or not.
    pub fn compress_in_flight(&self) -> bool {
        self.in_flight
            .iter()
            .any(|(operation, _)| *operation == Operation::Compress)
    }

    pub fn accept(&mut self, response: CodecResponse) -> Accepted {
        match response {
            CodecResponse::Compressed {
                compressed_text,
                version,
            } => {
                self.answered(version);
                if self.latest_compress != Some(version) {
                    return Accepted::Stale;
                }
                self.latest_compress = None;
                Accepted::Compressed(compressed_text)
            }
            CodecResponse::Decompressed { text, version } => {
                self.answered(version);
                if self.latest_decompress != Some(version) {
                    return Accepted::Stale;
                }
                self.latest_decompress = None;
                Accepted::Decompressed(text)
            }
            CodecResponse::Error { message } => {
                let Some((operation, version)) = self.in_flight.pop_front() else {
                    return Accepted::Stale;
                };
                let latest = match operation {
                    Operation::Compress => &mut self.latest_compress,
                    Operation::Decompress => &mut self.latest_decompress,
                };
                if *latest != Some(version) {
                    return Accepted::Stale;
                }
                *latest = None;
                Accepted::Failed(message)
            }
        }
    }

    /// The worker is gone: nothing in flight will ever be answered.
    pub fn worker_lost(&mut self, message: impl Into<String>) -> Accepted {
        self.in_flight.clear();
        if !self.has_pending() {
            return Accepted::Stale;
        }
        self.latest_compress = None;
        self.latest_decompress = None;
        Accepted::Failed(message.into())
    }

    fn track(&mut self, operation: Operation) -> u64 {
        self.next_version += 1;
        self.in_flight.push_back((operation, self.next_version));
        self.next_version
    }

    fn answered(&mut self, version: u64) {
        if let Some(index) = self.in_flight.iter().position(|(_, v)| *v == version) {
            self.in_flight.remove(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::handle_request;
    use crate::DEFAULT_QUALITY;

    #[test]
    fn superseded_compress_response_is_stale() {
        let mut client = CodecClient::new();
        let first = client.compress("a");
        let second = client.compress("ab");

        let first_response = handle_request(first, DEFAULT_QUALITY);
        let second_response = handle_request(second, DEFAULT_QUALITY);

        assert_eq!(client.accept(first_response), Accepted::Stale);
        assert!(matches!(
            client.accept(second_response),
            Accepted::Compressed(_)
        ));
    }

    #[test]
    fn stale_decompress_cannot_clobber_newer_load() {
        let mut client = CodecClient::new();
        let old = crate::compress_text("old", DEFAULT_QUALITY).unwrap();
        let new = crate::compress_text("new", DEFAULT_QUALITY).unwrap();

        let old_request = client.decompress(old);
        let new_request = client.decompress(new);

        // Responses arrive out of order.
        let new_response = handle_request(new_request, DEFAULT_QUALITY);
        let old_response = handle_request(old_request, DEFAULT_QUALITY);

        assert_eq!(
            client.accept(new_response),
            Accepted::Decompressed("new".into())
        );
        assert_eq!(client.accept(old_response), Accepted::Stale);
    }

    #[test]
    fn classes_are_tracked_independently() {
        let mut client = CodecClient::new();
        let compressed = crate::compress_text("x", DEFAULT_QUALITY).unwrap();
        let decompress = client.decompress(compressed);
        let compress = client.compress("y");

        assert_eq!(
            client.accept(handle_request(decompress, DEFAULT_QUALITY)),
            Accepted::Decompressed("x".into())
        );
        assert!(matches!(
            client.accept(handle_request(compress, DEFAULT_QUALITY)),
            Accepted::Compressed(_)
        ));
        assert!(!client.has_pending());
    }

    #[test]
    fn error_fails_pending_operations_once() {
        let mut client = CodecClient::new();
        client.decompress("garbage");

        let error = CodecResponse::Error {
            message: "bad".into(),
        };
        assert_eq!(client.accept(error.clone()), Accepted::Failed("bad".into()));
        assert_eq!(client.accept(error), Accepted::Stale);
    }

    #[test]
    fn duplicate_response_is_stale() {
        let mut client = CodecClient::new();
        let response = handle_request(client.compress("z"), DEFAULT_QUALITY);
        assert!(matches!(
            client.accept(response.clone()),
            Accepted::Compressed(_)
        ));
        assert_eq!(client.accept(response), Accepted::Stale);
    }

    #[test]
    fn error_for_superseded_request_spares_newer_load() {
        let mut client = CodecClient::new();
        let newer = crate::compress_text("newer", DEFAULT_QUALITY).unwrap();
        let garbage = client.decompress("garbage!!");
        let valid = client.decompress(newer);

        let garbage_response = handle_request(garbage, DEFAULT_QUALITY);
        assert!(matches!(garbage_response, CodecResponse::Error { .. }));
        assert_eq!(client.accept(garbage_response), Accepted::Stale);
        assert_eq!(
            client.accept(handle_request(valid, DEFAULT_QUALITY)),
            Accepted::Decompressed("newer".into())
        );
        assert!(!client.has_pending());
    }

    #[test]
    fn error_is_attributed_to_oldest_request_across_classes() {
        let mut client = CodecClient::new();
        let load = client.decompress("garbage!!");
        let save = client.compress("text");

        assert!(matches!(
            client.accept(handle_request(load, DEFAULT_QUALITY)),
            Accepted::Failed(_)
        ));
        assert!(client.compress_in_flight());
        assert!(matches!(
            client.accept(handle_request(save, DEFAULT_QUALITY)),
            Accepted::Compressed(_)
        ));
        assert!(!client.compress_in_flight());
    }

    #[test]
    fn worker_lost_fails_pending_once() {
        let mut client = CodecClient::new();
        client.compress("a");
        assert_eq!(client.worker_lost("gone"), Accepted::Failed("gone".into()));
        assert!(!client.compress_in_flight());
        assert_eq!(client.worker_lost("gone"), Accepted::Stale);
    }
}
