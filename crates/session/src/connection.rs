//! Connection facade: thin adapter over the external backend transport.
//!
//! The transport itself lives outside this crate. It receives the
//! [`TransportEnds`] half of a [`connection_pair`]: it drains outbound
//! requests, publishes its status through a `watch` channel and forwards raw
//! push frames. The session side only reads status and issues intents.
//!
//! Outbound frames go through an unbounded queue so the session actor never
//! waits on the transport; a transport that stalls while pushing into the
//! bounded inbound queue therefore cannot wedge the actor. Order is kept.

use modelsync_protocol::{BackendPush, BackendRequest, ProtocolError, ResultEnvelope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection to the backend is closed")]
    Closed,

    #[error("backend dropped the request without answering")]
    NoResponse,

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Status reported by the transport. Read-only from the session's side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub opened: bool,
    pub opening: bool,
    pub disconnected_by_user: bool,
    pub network_missing: bool,
    pub errors: Vec<String>,
}

impl ConnectionStatus {
    /// Status shown before a transport has been attached.
    pub fn pending() -> Self {
        Self {
            opening: true,
            ..Self::default()
        }
    }

    pub fn opened() -> Self {
        Self {
            opened: true,
            ..Self::default()
        }
    }
}

/// Frames the transport must deliver to the backend.
#[derive(Debug)]
pub enum Outbound {
    Notify(BackendRequest),
    Request {
        request: BackendRequest,
        reply: oneshot::Sender<Result<Value, ConnectionError>>,
    },
    Connect,
    Disconnect,
}

/// The transport's half of the connection.
pub struct TransportEnds {
    pub outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    pub status_tx: watch::Sender<ConnectionStatus>,
    pub inbound_tx: mpsc::Sender<Value>,
}

/// The session's half: a cloneable facade plus the raw push stream.
pub struct ClientConnection {
    pub facade: ConnectionFacade,
    pub inbound_rx: mpsc::Receiver<Value>,
}

/// `capacity` bounds the inbound push queue.
pub fn connection_pair(capacity: usize) -> (ClientConnection, TransportEnds) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity.max(1));
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::pending());
    (
        ClientConnection {
            facade: ConnectionFacade {
                outbound_tx,
                status_rx,
            },
            inbound_rx,
        },
        TransportEnds {
            outbound_rx,
            status_tx,
            inbound_tx,
        },
    )
}

/// Handle used by the session to talk to the transport (cheap to Clone).
#[derive(Clone)]
pub struct ConnectionFacade {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl ConnectionFacade {
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    /// A receiver that wakes on every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Fire-and-forget request. Never waits.
    pub fn notify(&self, request: BackendRequest) -> Result<(), ConnectionError> {
        self.outbound_tx
            .send(Outbound::Notify(request))
            .map_err(|_| ConnectionError::Closed)
    }

    /// Request/response round-trip. The raw answer is validated against the
    /// result envelope before it is handed back.
    pub async fn request<T: DeserializeOwned>(
        &self,
        request: BackendRequest,
    ) -> Result<ResultEnvelope<T>, ConnectionError> {
        let (reply, response) = oneshot::channel();
        self.outbound_tx
            .send(Outbound::Request { request, reply })
            .map_err(|_| ConnectionError::Closed)?;
        let raw = response.await.map_err(|_| ConnectionError::NoResponse)??;
        Ok(ResultEnvelope::decode(raw)?)
    }

    pub fn connect(&self) {
        self.intent(Outbound::Connect);
    }

    pub fn disconnect(&self) {
        self.intent(Outbound::Disconnect);
    }

    fn intent(&self, frame: Outbound) {
        if self.outbound_tx.send(frame).is_err() {
            warn!(
                component = "connection",
                event = "connection.intent_dropped",
                "Transport channel closed, connection intent dropped"
            );
        }
    }
}

/// Decode a raw push frame. Malformed frames are logged and dropped whole.
pub fn decode_push(frame: Value) -> Option<BackendPush> {
    match BackendPush::decode(frame) {
        Ok(push) => Some(push),
        Err(e) => {
            warn!(
                component = "connection",
                event = "connection.malformed_push",
                error = %e,
                "Dropping push message that does not match the protocol"
            );
            None
        }
    }
}
