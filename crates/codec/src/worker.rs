//! Codec worker: an isolated task reached only through message passing.
//!
//! Requests are processed one at a time in arrival order, and answered in
//! that same order. Compression runs on the blocking pool so a large document
//! never stalls the async runtime.
//!
//! Both directions are unbounded: posting never waits, and the worker never
//! waits on a slow reader. Callers keep the queue short by coalescing.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::compression::{compress_text, decompress_text};
use crate::messages::{CodecRequest, CodecResponse};

/// Handle to a running codec worker (cheap to Clone).
#[derive(Clone)]
pub struct CodecWorker {
    request_tx: mpsc::UnboundedSender<CodecRequest>,
}

impl CodecWorker {
    /// Spawn the worker task, returning its handle and the response stream.
    pub fn spawn(quality: u32) -> (CodecWorker, mpsc::UnboundedReceiver<CodecResponse>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        tokio::spawn(worker_loop(quality, request_rx, response_tx));
        (CodecWorker { request_tx }, response_rx)
    }

    /// Post a request. Returns `false` if the worker has shut down.
    pub fn post(&self, request: CodecRequest) -> bool {
        if self.request_tx.send(request).is_err() {
            warn!(
                component = "codec_worker",
                event = "codec.worker_closed",
                "Codec worker channel closed, request dropped"
            );
            return false;
        }
        true
    }
}

async fn worker_loop(
    quality: u32,
    mut request_rx: mpsc::UnboundedReceiver<CodecRequest>,
    response_tx: mpsc::UnboundedSender<CodecResponse>,
) {
    while let Some(request) = request_rx.recv().await {
        let version = request.version();
        let response = tokio::task::spawn_blocking(move || handle_request(request, quality))
            .await
            .unwrap_or_else(|e| CodecResponse::Error {
                message: format!("codec task failed: {e}"),
            });

        debug!(
            component = "codec_worker",
            event = "codec.request_done",
            version,
            "Codec request processed"
        );

        if response_tx.send(response).is_err() {
            // Receiver gone: nobody is waiting for results anymore.
            return;
        }
    }
}

/// Process a single request synchronously. Never panics on bad input;
/// failures become [`CodecResponse::Error`].
pub fn handle_request(request: CodecRequest, quality: u32) -> CodecResponse {
    match request {
        CodecRequest::Compress { text, version } => match compress_text(&text, quality) {
            Ok(compressed_text) => CodecResponse::Compressed {
                compressed_text,
                version,
            },
            Err(e) => CodecResponse::Error {
                message: e.to_string(),
            },
        },
        CodecRequest::Decompress {
            compressed_text,
            version,
        } => match decompress_text(&compressed_text) {
            Ok(text) => CodecResponse::Decompressed { text, version },
            Err(e) => CodecResponse::Error {
                message: e.to_string(),
            },
        },
    }
}
