//! Document session: the coordinator for one open document.
//!
//! Every state change happens synchronously through a method on
//! [`DocumentSession`]; no IO happens here. Methods queue [`Effect`]s that the
//! owning actor executes in order, and the results of that IO come back in
//! through the `file_*` / `codec_response` / `handle_push` entry points.
//! After [`DocumentSession::dispose`] every entry point is inert.

use std::fmt;

use modelsync_codec::{Accepted, CodecClient, CodecRequest, CodecResponse};
use modelsync_protocol::{
    new_id, BackendPush, BackendRequest, HighlightRange, Issue, ResultEnvelope, SemanticsResult,
    TextEdit, TextRange,
};
use rand::Rng;
use ropey::Rope;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::SyncConfig;
use crate::connection::ConnectionStatus;
use crate::diagnostics::{DiagnosticCounts, DiagnosticsTracker};
use crate::document::{
    ChangeSet, DocumentState, HistoryMode, Selection, TransactionError, TransactionSpec,
};
use crate::generation::{GeneratedModelSession, GeneratedModelSummary, GenerationRegistry};
use crate::history::History;
use crate::logging::report_failure;
use crate::storage::{simple_name, FileHandle, OpenedFile, PickerOptions, SavedFile, StorageError};

const FALLBACK_SIMPLE_NAME: &str = "graph";

/// Opaque, immutable identifier of a document session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn generate() -> Self {
        Self(new_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisStatus {
    pub analyzing: bool,
    pub semantics_up_to_date: bool,
    pub semantics_error: Option<String>,
    pub propagation_rejected: bool,
}

impl Default for AnalysisStatus {
    fn default() -> Self {
        Self {
            analyzing: false,
            semantics_up_to_date: true,
            semantics_error: None,
            propagation_rejected: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Effects: IO to be executed by the owner of the session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum StorageOp {
    Open {
        options: PickerOptions,
    },
    Save {
        handle: FileHandle,
        text: String,
        version: u64,
    },
    SaveAs {
        text: String,
        suggested_name: String,
        options: PickerOptions,
        version: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionIntent {
    Connect,
    Disconnect,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Backend(BackendRequest),
    Connection(ConnectionIntent),
    Storage(StorageOp),
    Codec(CodecRequest),
    Emit(SessionEvent),
}

/// Notifications for whoever renders the session. State itself is read
/// through snapshots; these carry what a snapshot cannot.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    TextChanged { version: u64 },
    ScrollIntoView { pos: usize },
    FileOpened { name: String },
    FileSaved { name: Option<String> },
    /// Compressed, URL-safe copy of the current text
    Persisted { compressed_text: String },
    PersistenceFailed { message: String },
    Disposed,
}

/// What `save_file` decided to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveRequest {
    NothingToDo,
    Saving,
    SavingAs,
}

/// Read-only view of a session, cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: DocumentId,
    pub text: Rope,
    pub version: u64,
    pub selection: Selection,
    pub unsaved_changes: bool,
    pub file_name: Option<String>,
    pub has_file: bool,
    pub client_attached: bool,
    pub connection: ConnectionStatus,
    pub analysis: AnalysisStatus,
    pub diagnostic_counts: DiagnosticCounts,
    pub type_hashes: Vec<String>,
    pub generated_models: Vec<GeneratedModelSummary>,
    pub selected_generated_model: Option<String>,
    pub generating: bool,
    pub cancel_pending: bool,
    pub concretize: bool,
    pub can_undo: bool,
    pub can_redo: bool,
    pub disposed: bool,
}

// ---------------------------------------------------------------------------
// DocumentSession
// ---------------------------------------------------------------------------

pub struct DocumentSession {
    id: DocumentId,
    document: DocumentState,
    history: History,
    unsaved_changes: bool,
    file: Option<FileHandle>,
    file_name: Option<String>,
    client_attached: bool,
    connection: ConnectionStatus,
    analysis: AnalysisStatus,
    diagnostics: DiagnosticsTracker,
    generations: GenerationRegistry,
    graph: Option<SemanticsResult>,
    concretize: bool,
    codec: CodecClient,
    picker_options: PickerOptions,
    default_file_name: String,
    compress_on_change: bool,
    // A compression was requested while another was still in flight.
    compress_queued: bool,
    disposed: bool,
    effects: Vec<Effect>,
}

impl DocumentSession {
    pub fn new(initial_text: &str, config: &SyncConfig) -> Self {
        let id = DocumentId::generate();
        Self {
            generations: GenerationRegistry::new(id.clone()),
            id,
            document: DocumentState::new(initial_text),
            history: History::new(config.history_depth),
            unsaved_changes: false,
            file: None,
            file_name: None,
            client_attached: false,
            connection: ConnectionStatus::pending(),
            analysis: AnalysisStatus::default(),
            diagnostics: DiagnosticsTracker::new(),
            graph: None,
            concretize: false,
            codec: CodecClient::new(),
            picker_options: PickerOptions::problem_files(),
            default_file_name: config.default_file_name.clone(),
            compress_on_change: config.compress_on_change,
            compress_queued: false,
            disposed: false,
            effects: Vec::new(),
        }
    }

    /// Drain the IO queued since the last call, in order.
    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    // -- Transactions --

    /// Apply `spec` synchronously. Content changes mark the document dirty
    /// and are forwarded to the backend; forwarding never fails here.
    pub fn dispatch(&mut self, spec: TransactionSpec) -> Result<(), TransactionError> {
        if self.inert("dispatch") {
            return Err(TransactionError::Disposed);
        }
        let selection_before = self.document.selection();
        let changes = self.apply(&spec)?;
        if !changes.is_empty() {
            match spec.history {
                HistoryMode::Record => self.history.record(&changes, selection_before),
                // Stored undo steps no longer line up with the text.
                HistoryMode::Skip => self.history.clear(),
            }
        }
        Ok(())
    }

    pub fn undo(&mut self) -> bool {
        if self.inert("undo") {
            return false;
        }
        let Some(entry) = self.history.pop_undo() else {
            return false;
        };
        let selection_before = self.document.selection();
        let spec = TransactionSpec::changes(entry.changes).with_selection(entry.selection);
        match self.apply(&spec) {
            Ok(changes) => {
                self.history.undone(&changes, selection_before);
                debug!(component = "document_session", session_id = %self.id, "Undo");
                true
            }
            Err(e) => {
                warn!(
                    component = "document_session",
                    event = "history.undo_failed",
                    session_id = %self.id,
                    error = %e,
                    "Undo entry no longer applies, clearing history"
                );
                self.history.clear();
                false
            }
        }
    }

    pub fn redo(&mut self) -> bool {
        if self.inert("redo") {
            return false;
        }
        let Some(entry) = self.history.pop_redo() else {
            return false;
        };
        let selection_before = self.document.selection();
        let spec = TransactionSpec::changes(entry.changes).with_selection(entry.selection);
        match self.apply(&spec) {
            Ok(changes) => {
                self.history.redone(&changes, selection_before);
                debug!(component = "document_session", session_id = %self.id, "Redo");
                true
            }
            Err(e) => {
                warn!(
                    component = "document_session",
                    event = "history.redo_failed",
                    session_id = %self.id,
                    error = %e,
                    "Redo entry no longer applies, clearing history"
                );
                self.history.clear();
                false
            }
        }
    }

    fn apply(&mut self, spec: &TransactionSpec) -> Result<ChangeSet, TransactionError> {
        let (next, changes) = self.document.apply(spec)?;
        let required_state_id = self.document.version();
        self.document = next;
        trace!(
            component = "document_session",
            session_id = %self.id,
            version = self.document.version(),
            edits = changes.edits().len(),
            "Editor transaction"
        );

        if !changes.is_empty() {
            self.unsaved_changes = true;
            self.diagnostics.map_through(&changes);
            self.forward(BackendRequest::DocumentChanged {
                state_id: self.document.version(),
                required_state_id,
                changes: changes.to_text_edits(),
            });
            self.emit(SessionEvent::TextChanged {
                version: self.document.version(),
            });
            if self.compress_on_change {
                self.persist_compressed();
            }
        }
        if let Some(pos) = spec.scroll_into_view {
            self.emit(SessionEvent::ScrollIntoView { pos });
        }
        Ok(changes)
    }

    /// Replace the whole buffer, e.g. after loading. Undo history is dropped
    /// so the user cannot undo past the loaded text.
    fn replace_document(&mut self, text: &str) {
        let spec = TransactionSpec::edit(TextEdit::replace(0, self.document.len_chars(), text))
            .with_selection(Selection::cursor(0))
            .scroll_to(0)
            .without_history();
        if let Err(e) = self.apply(&spec) {
            report_failure("document_session", "document.replace_failed", &e);
            return;
        }
        self.history.clear();
        self.codec.supersede_decompress();
    }

    // -- Annotations --

    pub fn update_diagnostics(&mut self, issues: Vec<Issue>) {
        if self.inert("update_diagnostics") {
            return;
        }
        self.diagnostics
            .replace_issues(issues, self.document.version());
    }

    pub fn update_semantic_highlighting(
        &mut self,
        ranges: Vec<HighlightRange>,
        type_hashes: Vec<String>,
    ) {
        if self.inert("update_semantic_highlighting") {
            return;
        }
        self.diagnostics
            .replace_highlighting(ranges, type_hashes, self.document.version());
    }

    /// Replace occurrence highlighting. With `go_to_first`, the selection
    /// jumps to the first write occurrence, else the first read occurrence,
    /// else `fallback`; nothing moves if none of those exist.
    pub fn update_occurrences(
        &mut self,
        write: Vec<TextRange>,
        read: Vec<TextRange>,
        go_to_first: bool,
        fallback: Option<usize>,
    ) {
        if self.inert("update_occurrences") {
            return;
        }
        let target = if go_to_first {
            write
                .first()
                .map(|range| range.from)
                .or_else(|| read.first().map(|range| range.from))
                .or(fallback)
        } else {
            None
        };
        self.diagnostics.replace_occurrences(write, read);

        if let Some(pos) = target {
            let pos = pos.min(self.document.len_chars());
            let spec = TransactionSpec::select(Selection::cursor(pos))
                .scroll_to(pos)
                .without_history();
            if let Err(e) = self.dispatch(spec) {
                warn!(
                    component = "document_session",
                    event = "occurrences.go_to_failed",
                    session_id = %self.id,
                    error = %e,
                    "Could not move selection to occurrence"
                );
            }
        }
    }

    /// Select the next issue after the cursor, wrapping around.
    pub fn next_diagnostic(&mut self) -> bool {
        if self.inert("next_diagnostic") {
            return false;
        }
        let len = self.document.len_chars();
        let Some(range) = self
            .diagnostics
            .next_issue_after(self.document.selection().head)
            .map(|issue| issue.range)
        else {
            return false;
        };
        let from = range.from.min(len);
        let to = range.to.min(len).max(from);
        self.dispatch(
            TransactionSpec::select(Selection::range(from, to))
                .scroll_to(from)
                .without_history(),
        )
        .is_ok()
    }

    // -- Semantics status --

    pub fn analysis_started(&mut self) {
        if self.inert("analysis_started") {
            return;
        }
        self.analysis.analyzing = true;
        self.analysis.semantics_up_to_date = false;
    }

    /// `skipped` means analysis did not run rather than failed, so stale
    /// errors are cleared.
    pub fn analysis_completed(&mut self, skipped: bool) {
        if self.inert("analysis_completed") {
            return;
        }
        self.analysis.analyzing = false;
        if skipped {
            self.analysis.semantics_error = None;
            self.analysis.propagation_rejected = false;
        }
    }

    pub fn set_semantics_error(&mut self, message: Option<String>, propagation_rejected: bool) {
        if self.inert("set_semantics_error") {
            return;
        }
        self.analysis.semantics_error = message;
        self.analysis.propagation_rejected = propagation_rejected;
    }

    /// Result graph of the base document.
    pub fn set_semantics(&mut self, result: SemanticsResult) {
        if self.inert("set_semantics") {
            return;
        }
        self.analysis.semantics_up_to_date = true;
        self.graph = Some(result);
    }

    fn apply_semantics_result(&mut self, envelope: ResultEnvelope<SemanticsResult>) {
        match envelope {
            ResultEnvelope::Success { value } => {
                self.set_semantics(value);
                self.set_semantics_error(None, false);
            }
            ResultEnvelope::Status { value } => {
                debug!(
                    component = "document_session",
                    session_id = %self.id,
                    status = %value,
                    "Semantics status update"
                );
            }
            ResultEnvelope::InvalidProblem { message, issues } => {
                self.update_diagnostics(issues);
                self.set_semantics_error(Some(message), false);
            }
            ResultEnvelope::Unsatisfiable { message } => {
                self.set_semantics_error(Some(message), true);
            }
            other => {
                let message = other.error_message().map(str::to_string);
                self.set_semantics_error(message, false);
            }
        }
    }

    /// Semantics can no longer be trusted once the backend is gone.
    pub fn on_disconnect(&mut self) {
        if self.inert("on_disconnect") {
            return;
        }
        self.analysis.semantics_up_to_date = false;
        self.analysis_completed(true);
        self.generations.clear_cancel_pending();
    }

    /// Route a push message from the backend.
    pub fn handle_push(&mut self, push: BackendPush) {
        if self.inert("handle_push") {
            return;
        }
        match push {
            BackendPush::Diagnostics { issues } => self.update_diagnostics(issues),
            BackendPush::Highlighting {
                ranges,
                type_hashes,
            } => self.update_semantic_highlighting(ranges, type_hashes),
            BackendPush::Occurrences {
                write,
                read,
                go_to_first,
                fallback,
            } => self.update_occurrences(write, read, go_to_first, fallback),
            BackendPush::AnalysisStarted => self.analysis_started(),
            BackendPush::AnalysisCompleted { skipped } => self.analysis_completed(skipped),
            BackendPush::SemanticsError {
                message,
                propagation_rejected,
            } => self.set_semantics_error(message, propagation_rejected),
            BackendPush::Semantics { result } => self.apply_semantics_result(result),
            BackendPush::ModelAdded { uuid, random_seed } => {
                self.add_generated_model(&uuid, random_seed)
            }
            BackendPush::ModelMessage { uuid, message } => {
                self.set_generated_model_message(&uuid, message)
            }
            BackendPush::ModelError { uuid, message } => {
                self.set_generated_model_error(&uuid, message)
            }
            BackendPush::ModelSemantics { uuid, result } => {
                self.set_generated_model_semantics(&uuid, result)
            }
            BackendPush::GenerationCancelled => self.model_generation_cancelled(),
            BackendPush::Disconnected => self.on_disconnect(),
        }
    }

    // -- Connection --

    /// Leave the "pending client" state. The full text goes out as soon as
    /// the connection is open.
    pub fn attach_client(&mut self, status: ConnectionStatus) {
        if self.inert("attach_client") {
            return;
        }
        if self.client_attached {
            warn!(
                component = "document_session",
                event = "connection.reattached",
                session_id = %self.id,
                "Backend client attached twice, replacing"
            );
        }
        self.client_attached = true;
        self.connection = status;
        info!(
            component = "document_session",
            event = "connection.client_attached",
            session_id = %self.id,
            opened = self.connection.opened,
            "Backend client attached"
        );
        if self.connection.opened {
            self.send_full_text();
        }
    }

    pub fn connection_status_changed(&mut self, status: ConnectionStatus) {
        if self.inert("connection_status_changed") {
            return;
        }
        let was_opened = self.connection.opened;
        self.connection = status;
        match (was_opened, self.connection.opened) {
            (true, false) => {
                info!(
                    component = "document_session",
                    event = "connection.lost",
                    session_id = %self.id,
                    network_missing = self.connection.network_missing,
                    disconnected_by_user = self.connection.disconnected_by_user,
                    "Backend connection lost"
                );
                self.on_disconnect();
            }
            (false, true) => self.send_full_text(),
            _ => {}
        }
    }

    fn send_full_text(&mut self) {
        self.forward(BackendRequest::FullText {
            state_id: self.document.version(),
            text: self.document.contents(),
        });
        if self.concretize {
            self.forward(BackendRequest::UpdateConcretize { concretize: true });
        }
    }

    pub fn connect(&mut self) {
        self.connection_intent(ConnectionIntent::Connect);
    }

    pub fn disconnect(&mut self) {
        self.connection_intent(ConnectionIntent::Disconnect);
    }

    fn connection_intent(&mut self, intent: ConnectionIntent) {
        if self.inert("connection_intent") {
            return;
        }
        if !self.client_attached {
            debug!(
                component = "document_session",
                session_id = %self.id,
                ?intent,
                "No backend client yet, ignoring connection intent"
            );
            return;
        }
        self.effects.push(Effect::Connection(intent));
    }

    fn can_send(&self) -> bool {
        self.client_attached && self.connection.opened
    }

    fn forward(&mut self, request: BackendRequest) {
        if !self.can_send() {
            debug!(
                component = "document_session",
                session_id = %self.id,
                request = request.kind(),
                "Backend not connected, request dropped"
            );
            return;
        }
        self.effects.push(Effect::Backend(request));
    }

    // -- Editor services --

    pub fn format_text(&mut self) -> bool {
        if self.inert("format_text") || !self.can_send() {
            return false;
        }
        self.forward(BackendRequest::Format {
            state_id: self.document.version(),
        });
        true
    }

    /// Defaults to the cursor position.
    pub fn go_to_definition(&mut self, pos: Option<usize>) -> bool {
        if self.inert("go_to_definition") || !self.can_send() {
            return false;
        }
        let offset = pos.unwrap_or(self.document.selection().head);
        self.forward(BackendRequest::GoToDefinition {
            state_id: self.document.version(),
            offset,
        });
        true
    }

    /// Request to send for content assist, if the backend is reachable.
    pub fn content_assist_request(&self, offset: usize) -> Option<BackendRequest> {
        (!self.disposed && self.can_send()).then(|| BackendRequest::ContentAssist {
            state_id: self.document.version(),
            offset,
        })
    }

    pub fn hover_request(&self, offset: usize) -> Option<BackendRequest> {
        (!self.disposed && self.can_send()).then(|| BackendRequest::Hover {
            state_id: self.document.version(),
            offset,
        })
    }

    pub fn toggle_concretize(&mut self) {
        if self.inert("toggle_concretize") {
            return;
        }
        self.concretize = !self.concretize;
        debug!(component = "document_session", session_id = %self.id, concretize = self.concretize, "Concretize toggled");
        self.forward(BackendRequest::UpdateConcretize {
            concretize: self.concretize,
        });
    }

    // -- Model generation --

    /// Ask the backend to start a generation job. The job itself appears once
    /// the backend acknowledges it with a uuid. Returns the seed used.
    pub fn start_model_generation(&mut self, random_seed: Option<u64>) -> Option<u64> {
        if self.inert("start_model_generation") {
            return None;
        }
        if !self.can_send() {
            warn!(
                component = "document_session",
                event = "generation.start_dropped",
                session_id = %self.id,
                "Backend not connected, cannot start model generation"
            );
            return None;
        }
        let random_seed =
            random_seed.unwrap_or_else(|| u64::from(rand::thread_rng().gen::<u32>()));
        self.forward(BackendRequest::StartGeneration { random_seed });
        Some(random_seed)
    }

    pub fn add_generated_model(&mut self, uuid: &str, random_seed: u64) {
        if self.inert("add_generated_model") {
            return;
        }
        self.generations.add(uuid, random_seed);
    }

    /// Cancellation is document-wide; at most one request is outstanding.
    pub fn cancel_model_generation(&mut self) {
        if self.inert("cancel_model_generation") {
            return;
        }
        if !self.can_send() {
            warn!(
                component = "document_session",
                event = "generation.cancel_dropped",
                session_id = %self.id,
                "Backend not connected, cannot cancel model generation"
            );
            return;
        }
        if !self.generations.begin_cancel() {
            debug!(
                component = "document_session",
                session_id = %self.id,
                "Nothing to cancel or cancellation already outstanding"
            );
            return;
        }
        self.forward(BackendRequest::CancelGeneration);
    }

    pub fn select_generated_model(&mut self, uuid: Option<&str>) {
        if self.inert("select_generated_model") {
            return;
        }
        self.generations.select(uuid);
    }

    /// Remove a job whatever its status. A running job triggers a
    /// (document-wide) cancellation first.
    pub fn delete_generated_model(&mut self, uuid: &str) {
        if self.inert("delete_generated_model") {
            return;
        }
        if self
            .generations
            .get(uuid)
            .is_some_and(GeneratedModelSession::is_running)
        {
            self.cancel_model_generation();
        }
        self.generations.remove(uuid);
    }

    pub fn model_generation_cancelled(&mut self) {
        if self.inert("model_generation_cancelled") {
            return;
        }
        self.generations.generation_cancelled();
    }

    pub fn set_generated_model_message(&mut self, uuid: &str, message: String) {
        if self.inert("set_generated_model_message") {
            return;
        }
        if !self.generations.set_message(uuid, message) {
            self.ignored_generation_update(uuid, "message");
        }
    }

    pub fn set_generated_model_error(&mut self, uuid: &str, message: String) {
        if self.inert("set_generated_model_error") {
            return;
        }
        if !self.generations.set_error(uuid, message) {
            self.ignored_generation_update(uuid, "error");
        }
    }

    pub fn set_generated_model_semantics(&mut self, uuid: &str, result: SemanticsResult) {
        if self.inert("set_generated_model_semantics") {
            return;
        }
        if !self.generations.set_semantics(uuid, result) {
            self.ignored_generation_update(uuid, "semantics");
        }
    }

    fn ignored_generation_update(&self, uuid: &str, update: &'static str) {
        debug!(
            component = "document_session",
            session_id = %self.id,
            uuid,
            update,
            "Generation update for unknown or finished job ignored"
        );
    }

    // -- Persistence --

    pub fn open_file(&mut self) {
        if self.inert("open_file") {
            return;
        }
        self.effects.push(Effect::Storage(StorageOp::Open {
            options: self.picker_options.clone(),
        }));
    }

    pub fn file_opened(&mut self, result: Result<Option<OpenedFile>, StorageError>) {
        if self.inert("file_opened") {
            return;
        }
        match result {
            Ok(Some(file)) => {
                self.replace_document(&file.text);
                info!(
                    component = "document_session",
                    event = "storage.file_opened",
                    session_id = %self.id,
                    name = %file.name,
                    "Opened file"
                );
                self.file_name = Some(file.name.clone());
                self.file = Some(file.handle);
                self.unsaved_changes = false;
                self.emit(SessionEvent::FileOpened { name: file.name });
            }
            Ok(None) => {
                debug!(component = "document_session", session_id = %self.id, "Open cancelled");
            }
            Err(e) => report_failure("document_session", "storage.open_failed", &e),
        }
    }

    pub fn save_file(&mut self) -> SaveRequest {
        if self.inert("save_file") {
            return SaveRequest::NothingToDo;
        }
        if !self.unsaved_changes {
            debug!(component = "document_session", session_id = %self.id, "No unsaved changes, nothing to do");
            return SaveRequest::NothingToDo;
        }
        let Some(handle) = self.file.clone() else {
            return self.save_file_as();
        };
        self.effects.push(Effect::Storage(StorageOp::Save {
            handle,
            text: self.document.contents(),
            version: self.document.version(),
        }));
        SaveRequest::Saving
    }

    pub fn save_file_as(&mut self) -> SaveRequest {
        if self.inert("save_file_as") {
            return SaveRequest::NothingToDo;
        }
        self.effects.push(Effect::Storage(StorageOp::SaveAs {
            text: self.document.contents(),
            suggested_name: self
                .file_name
                .clone()
                .unwrap_or_else(|| self.default_file_name.clone()),
            options: self.picker_options.clone(),
            version: self.document.version(),
        }));
        SaveRequest::SavingAs
    }

    /// `version` is the document version that was written.
    pub fn file_saved(&mut self, version: u64, result: Result<(), StorageError>) {
        if self.inert("file_saved") {
            return;
        }
        match result {
            Ok(()) => {
                self.mark_saved(version);
                self.emit(SessionEvent::FileSaved {
                    name: self.file_name.clone(),
                });
            }
            Err(e) => report_failure("document_session", "storage.save_failed", &e),
        }
    }

    pub fn file_saved_as(&mut self, version: u64, result: Result<Option<SavedFile>, StorageError>) {
        if self.inert("file_saved_as") {
            return;
        }
        match result {
            Ok(Some(saved)) => {
                info!(
                    component = "document_session",
                    event = "storage.file_saved_as",
                    session_id = %self.id,
                    name = %saved.name,
                    "Saved file"
                );
                self.file_name = Some(saved.name);
                self.file = saved.handle;
                self.mark_saved(version);
                self.emit(SessionEvent::FileSaved {
                    name: self.file_name.clone(),
                });
            }
            Ok(None) => {
                debug!(component = "document_session", session_id = %self.id, "Save as cancelled");
            }
            Err(e) => report_failure("document_session", "storage.save_failed", &e),
        }
    }

    // Edits made while the write was in flight keep the document dirty.
    fn mark_saved(&mut self, version: u64) {
        if self.document.version() == version {
            self.unsaved_changes = false;
        } else {
            debug!(
                component = "document_session",
                session_id = %self.id,
                saved_version = version,
                current_version = self.document.version(),
                "Document changed during save, keeping unsaved flag"
            );
        }
    }

    /// Queue a compressed copy of the current text. At most one compression
    /// is in flight; requests made meanwhile collapse into a single follow-up
    /// for whatever the text is once it returns.
    pub fn persist_compressed(&mut self) {
        if self.inert("persist_compressed") {
            return;
        }
        if self.codec.compress_in_flight() {
            self.compress_queued = true;
            return;
        }
        let request = self.codec.compress(self.document.contents());
        self.effects.push(Effect::Codec(request));
    }

    /// Replace the document with previously compressed text. A later load
    /// supersedes this one if it finishes first.
    pub fn load_compressed(&mut self, compressed_text: String) {
        if self.inert("load_compressed") {
            return;
        }
        let request = self.codec.decompress(compressed_text);
        self.effects.push(Effect::Codec(request));
    }

    pub fn codec_response(&mut self, response: CodecResponse) {
        if self.inert("codec_response") {
            return;
        }
        let accepted = self.codec.accept(response);
        self.settle_codec(accepted);
        if self.compress_queued && !self.codec.compress_in_flight() {
            self.compress_queued = false;
            self.persist_compressed();
        }
    }

    /// The codec worker stopped; nothing in flight will be answered.
    pub fn codec_worker_lost(&mut self, message: String) {
        if self.inert("codec_worker_lost") {
            return;
        }
        self.compress_queued = false;
        let accepted = self.codec.worker_lost(message);
        self.settle_codec(accepted);
    }

    fn settle_codec(&mut self, accepted: Accepted) {
        match accepted {
            Accepted::Compressed(compressed_text) => {
                self.emit(SessionEvent::Persisted { compressed_text });
            }
            Accepted::Decompressed(text) => {
                self.replace_document(&text);
                self.file = None;
                self.file_name = None;
                self.unsaved_changes = false;
                info!(
                    component = "document_session",
                    event = "persistence.loaded",
                    session_id = %self.id,
                    chars = self.document.len_chars(),
                    "Loaded document from compressed text"
                );
            }
            Accepted::Failed(message) => {
                report_failure("document_session", "persistence.codec_failed", &message);
                self.emit(SessionEvent::PersistenceFailed { message });
            }
            Accepted::Stale => {
                debug!(
                    component = "document_session",
                    session_id = %self.id,
                    "Discarding stale codec response"
                );
            }
        }
    }

    // -- Lifecycle --

    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.effects.clear();
        self.effects.push(Effect::Emit(SessionEvent::Disposed));
        info!(
            component = "document_session",
            event = "session.disposed",
            session_id = %self.id,
            "Document session disposed"
        );
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn inert(&self, operation: &'static str) -> bool {
        if self.disposed {
            debug!(
                component = "document_session",
                session_id = %self.id,
                operation,
                "Ignoring operation on disposed session"
            );
        }
        self.disposed
    }

    fn emit(&mut self, event: SessionEvent) {
        self.effects.push(Effect::Emit(event));
    }

    // -- Accessors --

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn document(&self) -> &DocumentState {
        &self.document
    }

    pub fn contents(&self) -> String {
        self.document.contents()
    }

    pub fn selection(&self) -> Selection {
        self.document.selection()
    }

    pub fn has_selection(&self) -> bool {
        self.document.has_selection()
    }

    pub fn unsaved_changes(&self) -> bool {
        self.unsaved_changes
    }

    pub fn file_handle(&self) -> Option<&FileHandle> {
        self.file.as_ref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn simple_name(&self) -> Option<&str> {
        self.file_name.as_deref().map(simple_name)
    }

    pub fn simple_name_or_fallback(&self) -> &str {
        self.simple_name().unwrap_or(FALLBACK_SIMPLE_NAME)
    }

    pub fn client_attached(&self) -> bool {
        self.client_attached
    }

    pub fn connection_status(&self) -> &ConnectionStatus {
        &self.connection
    }

    pub fn analysis(&self) -> &AnalysisStatus {
        &self.analysis
    }

    pub fn diagnostics(&self) -> &DiagnosticsTracker {
        &self.diagnostics
    }

    pub fn diagnostic_counts(&self) -> DiagnosticCounts {
        self.diagnostics.counts()
    }

    pub fn generations(&self) -> &GenerationRegistry {
        &self.generations
    }

    pub fn generating(&self) -> bool {
        self.generations.generating()
    }

    pub fn selected_generated_model(&self) -> Option<&GeneratedModelSession> {
        self.generations.selected()
    }

    /// Graph to display: the selected job's result, else the document's own.
    pub fn selected_graph(&self) -> Option<&SemanticsResult> {
        self.generations
            .selected()
            .and_then(GeneratedModelSession::result)
            .or(self.graph.as_ref())
    }

    pub fn graph(&self) -> Option<&SemanticsResult> {
        self.graph.as_ref()
    }

    pub fn concretize(&self) -> bool {
        self.concretize
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            text: self.document.text().clone(),
            version: self.document.version(),
            selection: self.document.selection(),
            unsaved_changes: self.unsaved_changes,
            file_name: self.file_name.clone(),
            has_file: self.file.is_some(),
            client_attached: self.client_attached,
            connection: self.connection.clone(),
            analysis: self.analysis.clone(),
            diagnostic_counts: self.diagnostics.counts(),
            type_hashes: self.diagnostics.type_hashes().to_vec(),
            generated_models: self.generations.summaries(),
            selected_generated_model: self.generations.selected_uuid().map(str::to_string),
            generating: self.generations.generating(),
            cancel_pending: self.generations.cancel_pending(),
            concretize: self.concretize,
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            disposed: self.disposed,
        }
    }
}
