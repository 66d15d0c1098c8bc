//! Session actor: owns a DocumentSession and processes commands sequentially.
//!
//! Each session runs as an independent tokio task. External callers
//! communicate via `SessionActorHandle` which sends `SessionCommand`
//! messages over an mpsc channel. Lock-free reads go through `ArcSwap`,
//! and session events fan out over a broadcast channel.
//!
//! IO queued by the session as `Effect`s is executed here, in order. Slow IO
//! (storage, codec work) runs off the actor and reports back as a command,
//! so the command loop never blocks on it.

use std::sync::Arc;

use arc_swap::ArcSwap;
use modelsync_codec::{CodecResponse, CodecWorker};
use modelsync_protocol::{CompletionList, HoverInfo, SemanticsResult};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::connection::{
    decode_push, ClientConnection, ConnectionError, ConnectionFacade, ConnectionStatus,
};
use crate::document::{TransactionError, TransactionSpec};
use crate::logging::report_failure;
use crate::session::{
    ConnectionIntent, DocumentId, DocumentSession, Effect, SaveRequest, SessionEvent,
    SessionSnapshot, StorageOp,
};
use crate::session_command::{SessionCommand, StorageResult};
use crate::storage::Storage;

/// Handle to a running session actor (cheap to Clone).
#[derive(Clone)]
pub struct SessionActorHandle {
    pub id: DocumentId,
    command_tx: mpsc::Sender<SessionCommand>,
    snapshot: Arc<ArcSwap<SessionSnapshot>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionActorHandle {
    /// Spawn the actor for `session`. The session starts in the "pending
    /// client" state; attach a transport with [`Self::attach_client`].
    pub fn spawn(
        session: DocumentSession,
        storage: Arc<dyn Storage>,
        config: &SyncConfig,
    ) -> SessionActorHandle {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (events, _) = broadcast::channel(config.event_capacity);
        let snapshot = Arc::new(ArcSwap::from_pointee(session.snapshot()));
        let id = session.id().clone();

        let (codec, codec_rx) = CodecWorker::spawn(config.compression_quality);
        tokio::spawn(forward_codec_responses(codec_rx, command_tx.downgrade()));

        let actor = SessionActor {
            session,
            storage,
            codec,
            connection: None,
            pump: None,
            command_tx: command_tx.downgrade(),
            snapshot: snapshot.clone(),
            events: events.clone(),
        };
        tokio::spawn(actor.run(command_rx));

        SessionActorHandle {
            id,
            command_tx,
            snapshot,
            events,
        }
    }

    /// Send a command to the actor (fire-and-forget).
    pub async fn send(&self, cmd: SessionCommand) {
        let kind = cmd.kind();
        if self.command_tx.send(cmd).await.is_err() {
            warn!(
                component = "session_actor",
                session_id = %self.id,
                command = kind,
                "Actor channel closed, command dropped"
            );
        }
    }

    /// Try to send a command without awaiting (for non-async contexts).
    pub fn try_send(&self, cmd: SessionCommand) {
        let kind = cmd.kind();
        if self.command_tx.try_send(cmd).is_err() {
            warn!(
                component = "session_actor",
                session_id = %self.id,
                command = kind,
                "Actor channel full or closed"
            );
        }
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshot.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn attach_client(&self, connection: ClientConnection) {
        self.send(SessionCommand::AttachClient { connection }).await;
    }

    /// Apply a transaction and wait for the outcome. A stopped actor behaves
    /// like a disposed session.
    pub async fn dispatch(&self, spec: TransactionSpec) -> Result<(), TransactionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Dispatch {
            spec,
            reply: Some(reply),
        })
        .await;
        rx.await.unwrap_or(Err(TransactionError::Disposed))
    }

    pub async fn save_file(&self) -> SaveRequest {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::SaveFile { reply: Some(reply) })
            .await;
        rx.await.unwrap_or(SaveRequest::NothingToDo)
    }

    pub async fn start_model_generation(&self, random_seed: Option<u64>) -> Option<u64> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::StartModelGeneration {
            random_seed,
            reply: Some(reply),
        })
        .await;
        rx.await.ok().flatten()
    }

    pub async fn content_assist(&self, offset: usize) -> Result<CompletionList, ConnectionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::ContentAssist { offset, reply })
            .await;
        rx.await.map_err(|_| ConnectionError::NoResponse)?
    }

    pub async fn hover(&self, offset: usize) -> Result<Option<HoverInfo>, ConnectionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Hover { offset, reply }).await;
        rx.await.map_err(|_| ConnectionError::NoResponse)?
    }

    pub async fn text(&self) -> Option<String> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::GetText { reply }).await;
        rx.await.ok()
    }

    pub async fn selected_graph(&self) -> Option<SemanticsResult> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::GetSelectedGraph { reply }).await;
        rx.await.ok().flatten()
    }

    pub async fn dispose(&self) {
        self.send(SessionCommand::Dispose).await;
    }
}

struct SessionActor {
    session: DocumentSession,
    storage: Arc<dyn Storage>,
    codec: CodecWorker,
    connection: Option<ConnectionFacade>,
    pump: Option<JoinHandle<()>>,
    // Weak so that background tasks never keep the actor alive.
    command_tx: mpsc::WeakSender<SessionCommand>,
    snapshot: Arc<ArcSwap<SessionSnapshot>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionActor {
    async fn run(mut self, mut command_rx: mpsc::Receiver<SessionCommand>) {
        info!(
            component = "session_actor",
            event = "session_actor.started",
            session_id = %self.session.id(),
            "Session actor started"
        );
        while let Some(cmd) = command_rx.recv().await {
            let dispose = matches!(cmd, SessionCommand::Dispose);
            self.handle(cmd);
            self.run_effects();
            self.publish();
            if dispose {
                break;
            }
        }
        self.shutdown();
    }

    fn handle(&mut self, cmd: SessionCommand) {
        let session = &mut self.session;
        match cmd {
            SessionCommand::Dispatch { spec, reply } => {
                let result = session.dispatch(spec);
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!(
                                component = "session_actor",
                                event = "session_actor.dispatch_rejected",
                                session_id = %session.id(),
                                error = %e,
                                "Transaction rejected"
                            );
                        }
                    }
                }
            }
            SessionCommand::Undo => {
                session.undo();
            }
            SessionCommand::Redo => {
                session.redo();
            }
            SessionCommand::Push { push } => session.handle_push(push),
            SessionCommand::ConnectionStatusChanged { status } => {
                session.connection_status_changed(status)
            }
            SessionCommand::AttachClient { connection } => self.attach(connection),
            SessionCommand::Connect => session.connect(),
            SessionCommand::Disconnect => session.disconnect(),
            SessionCommand::FormatText => {
                session.format_text();
            }
            SessionCommand::GoToDefinition { pos } => {
                session.go_to_definition(pos);
            }
            SessionCommand::ContentAssist { offset, reply } => {
                let request = session.content_assist_request(offset);
                self.round_trip(request, reply, |value: Option<CompletionList>| {
                    value.unwrap_or_default()
                });
            }
            SessionCommand::Hover { offset, reply } => {
                let request = session.hover_request(offset);
                self.round_trip(request, reply, |value: Option<Option<HoverInfo>>| {
                    value.flatten()
                });
            }
            SessionCommand::NextDiagnostic => {
                session.next_diagnostic();
            }
            SessionCommand::ToggleConcretize => session.toggle_concretize(),
            SessionCommand::StartModelGeneration { random_seed, reply } => {
                let seed = session.start_model_generation(random_seed);
                if let Some(reply) = reply {
                    let _ = reply.send(seed);
                }
            }
            SessionCommand::CancelModelGeneration => session.cancel_model_generation(),
            SessionCommand::SelectGeneratedModel { uuid } => {
                session.select_generated_model(uuid.as_deref())
            }
            SessionCommand::DeleteGeneratedModel { uuid } => session.delete_generated_model(&uuid),
            SessionCommand::OpenFile => session.open_file(),
            SessionCommand::SaveFile { reply } => {
                let outcome = session.save_file();
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            SessionCommand::SaveFileAs => {
                session.save_file_as();
            }
            SessionCommand::LoadCompressed { compressed_text } => {
                session.load_compressed(compressed_text)
            }
            SessionCommand::StorageCompleted { result } => match result {
                StorageResult::Opened(result) => session.file_opened(result),
                StorageResult::Saved { version, result } => session.file_saved(version, result),
                StorageResult::SavedAs { version, result } => {
                    session.file_saved_as(version, result)
                }
            },
            SessionCommand::CodecResponse { response } => session.codec_response(response),
            SessionCommand::GetText { reply } => {
                let _ = reply.send(session.contents());
            }
            SessionCommand::GetSelectedGraph { reply } => {
                let _ = reply.send(session.selected_graph().cloned());
            }
            SessionCommand::Dispose => session.dispose(),
        }
    }

    fn attach(&mut self, connection: ClientConnection) {
        let ClientConnection {
            facade,
            inbound_rx,
        } = connection;
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        let mut status_rx = facade.watch_status();
        let status = status_rx.borrow_and_update().clone();
        self.pump = Some(tokio::spawn(connection_pump(
            inbound_rx,
            status_rx,
            self.command_tx.clone(),
        )));
        self.connection = Some(facade);
        self.session.attach_client(status);
    }

    /// Send a request/response pair off the actor. Non-success envelopes
    /// resolve to the caller's empty value.
    fn round_trip<T, R>(
        &self,
        request: Option<modelsync_protocol::BackendRequest>,
        reply: oneshot::Sender<Result<R, ConnectionError>>,
        finish: impl FnOnce(Option<T>) -> R + Send + 'static,
    ) where
        T: serde::de::DeserializeOwned + Send + 'static,
        R: Send + 'static,
    {
        let (Some(request), Some(facade)) = (request, self.connection.clone()) else {
            let _ = reply.send(Ok(finish(None)));
            return;
        };
        let session_id = self.session.id().clone();
        tokio::spawn(async move {
            let kind = request.kind();
            let result = match facade.request::<T>(request).await {
                Ok(envelope) => {
                    if let Some(message) = envelope.error_message() {
                        debug!(
                            component = "session_actor",
                            session_id = %session_id,
                            request = kind,
                            result = envelope.tag(),
                            detail = message,
                            "Backend answered without a value"
                        );
                    }
                    Ok(finish(envelope.into_value()))
                }
                Err(e) => {
                    report_failure("session_actor", "backend.request_failed", &e);
                    Err(e)
                }
            };
            let _ = reply.send(result);
        });
    }

    /// Execute queued IO until the session stops producing more.
    /// Effects never await: a full channel here would stall the actor while
    /// the task on the other end waits on the actor.
    fn run_effects(&mut self) {
        loop {
            let effects = self.session.take_effects();
            if effects.is_empty() {
                return;
            }
            for effect in effects {
                self.run_effect(effect);
            }
        }
    }

    fn run_effect(&mut self, effect: Effect) {
        match effect {
            Effect::Backend(request) => {
                let Some(facade) = &self.connection else {
                    return;
                };
                if let Err(e) = facade.notify(request) {
                    report_failure("session_actor", "backend.send_failed", &e);
                }
            }
            Effect::Connection(intent) => {
                let Some(facade) = &self.connection else {
                    return;
                };
                match intent {
                    ConnectionIntent::Connect => facade.connect(),
                    ConnectionIntent::Disconnect => facade.disconnect(),
                }
            }
            Effect::Storage(op) => self.spawn_storage(op),
            Effect::Codec(request) => {
                if !self.codec.post(request) {
                    // Surfaces through the session as a persistence failure.
                    self.session
                        .codec_worker_lost(modelsync_codec::CodecError::WorkerGone.to_string());
                }
            }
            Effect::Emit(event) => {
                // No subscribers is fine.
                let _ = self.events.send(event);
            }
        }
    }

    fn spawn_storage(&self, op: StorageOp) {
        let storage = self.storage.clone();
        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            let result = match op {
                StorageOp::Open { options } => StorageResult::Opened(storage.open(&options).await),
                StorageOp::Save {
                    handle,
                    text,
                    version,
                } => StorageResult::Saved {
                    version,
                    result: storage.save(&handle, &text).await,
                },
                StorageOp::SaveAs {
                    text,
                    suggested_name,
                    options,
                    version,
                } => StorageResult::SavedAs {
                    version,
                    result: storage.save_as(&text, &suggested_name, &options).await,
                },
            };
            if !send_weak(&command_tx, SessionCommand::StorageCompleted { result }).await {
                debug!(
                    component = "session_actor",
                    "Session gone before storage completed"
                );
            }
        });
    }

    fn publish(&self) {
        self.snapshot.store(Arc::new(self.session.snapshot()));
    }

    fn shutdown(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.connection = None;
        if !self.session.is_disposed() {
            // Every handle was dropped without an explicit dispose.
            self.session.dispose();
            for effect in self.session.take_effects() {
                if let Effect::Emit(event) = effect {
                    let _ = self.events.send(event);
                }
            }
            self.publish();
        }
        info!(
            component = "session_actor",
            event = "session_actor.stopped",
            session_id = %self.session.id(),
            "Session actor stopped"
        );
    }
}

async fn send_weak(command_tx: &mpsc::WeakSender<SessionCommand>, cmd: SessionCommand) -> bool {
    match command_tx.upgrade() {
        Some(tx) => tx.send(cmd).await.is_ok(),
        None => false,
    }
}

async fn forward_codec_responses(
    mut codec_rx: mpsc::UnboundedReceiver<CodecResponse>,
    command_tx: mpsc::WeakSender<SessionCommand>,
) {
    while let Some(response) = codec_rx.recv().await {
        if !send_weak(&command_tx, SessionCommand::CodecResponse { response }).await {
            break;
        }
    }
}

/// Feed inbound frames and status changes from the transport into the actor.
async fn connection_pump(
    mut inbound_rx: mpsc::Receiver<serde_json::Value>,
    mut status_rx: watch::Receiver<ConnectionStatus>,
    command_tx: mpsc::WeakSender<SessionCommand>,
) {
    loop {
        let cmd = tokio::select! {
            frame = inbound_rx.recv() => match frame {
                Some(frame) => match decode_push(frame) {
                    Some(push) => SessionCommand::Push { push },
                    None => continue,
                },
                None => break,
            },
            changed = status_rx.changed() => match changed {
                Ok(()) => SessionCommand::ConnectionStatusChanged {
                    status: status_rx.borrow_and_update().clone(),
                },
                Err(_) => break,
            },
        };
        if !send_weak(&command_tx, cmd).await {
            return;
        }
    }
    warn!(
        component = "session_actor",
        event = "connection.transport_closed",
        "Transport closed, treating connection as lost"
    );
    send_weak(
        &command_tx,
        SessionCommand::ConnectionStatusChanged {
            status: ConnectionStatus::default(),
        },
    )
    .await;
}
