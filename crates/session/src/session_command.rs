//! Commands sent to a session actor by the UI layer, the connection pump and
//! the actor's own background tasks.

use modelsync_codec::CodecResponse;
use modelsync_protocol::{BackendPush, CompletionList, HoverInfo, SemanticsResult};
use tokio::sync::oneshot;

use crate::connection::{ClientConnection, ConnectionError, ConnectionStatus};
use crate::document::{TransactionError, TransactionSpec};
use crate::session::SaveRequest;
use crate::storage::{OpenedFile, SavedFile, StorageError};

/// Outcome of a storage task, routed back into the actor.
#[derive(Debug)]
pub enum StorageResult {
    Opened(Result<Option<OpenedFile>, StorageError>),
    Saved {
        version: u64,
        result: Result<(), StorageError>,
    },
    SavedAs {
        version: u64,
        result: Result<Option<SavedFile>, StorageError>,
    },
}

/// A command that can be sent to a session actor.
pub enum SessionCommand {
    // -- Editing --
    Dispatch {
        spec: TransactionSpec,
        reply: Option<oneshot::Sender<Result<(), TransactionError>>>,
    },
    Undo,
    Redo,

    // -- Backend --
    Push {
        push: BackendPush,
    },
    ConnectionStatusChanged {
        status: ConnectionStatus,
    },
    /// Second phase of initialization: the network layer is ready.
    AttachClient {
        connection: ClientConnection,
    },
    Connect,
    Disconnect,
    FormatText,
    GoToDefinition {
        pos: Option<usize>,
    },
    ContentAssist {
        offset: usize,
        reply: oneshot::Sender<Result<CompletionList, ConnectionError>>,
    },
    Hover {
        offset: usize,
        reply: oneshot::Sender<Result<Option<HoverInfo>, ConnectionError>>,
    },
    NextDiagnostic,
    ToggleConcretize,

    // -- Model generation --
    StartModelGeneration {
        random_seed: Option<u64>,
        reply: Option<oneshot::Sender<Option<u64>>>,
    },
    CancelModelGeneration,
    SelectGeneratedModel {
        uuid: Option<String>,
    },
    DeleteGeneratedModel {
        uuid: String,
    },

    // -- Persistence --
    OpenFile,
    SaveFile {
        reply: Option<oneshot::Sender<SaveRequest>>,
    },
    SaveFileAs,
    LoadCompressed {
        compressed_text: String,
    },
    StorageCompleted {
        result: StorageResult,
    },
    CodecResponse {
        response: CodecResponse,
    },

    // -- Queries --
    GetText {
        reply: oneshot::Sender<String>,
    },
    GetSelectedGraph {
        reply: oneshot::Sender<Option<SemanticsResult>>,
    },

    Dispose,
}

impl SessionCommand {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionCommand::Dispatch { .. } => "dispatch",
            SessionCommand::Undo => "undo",
            SessionCommand::Redo => "redo",
            SessionCommand::Push { .. } => "push",
            SessionCommand::ConnectionStatusChanged { .. } => "connection_status_changed",
            SessionCommand::AttachClient { .. } => "attach_client",
            SessionCommand::Connect => "connect",
            SessionCommand::Disconnect => "disconnect",
            SessionCommand::FormatText => "format_text",
            SessionCommand::GoToDefinition { .. } => "go_to_definition",
            SessionCommand::ContentAssist { .. } => "content_assist",
            SessionCommand::Hover { .. } => "hover",
            SessionCommand::NextDiagnostic => "next_diagnostic",
            SessionCommand::ToggleConcretize => "toggle_concretize",
            SessionCommand::StartModelGeneration { .. } => "start_model_generation",
            SessionCommand::CancelModelGeneration => "cancel_model_generation",
            SessionCommand::SelectGeneratedModel { .. } => "select_generated_model",
            SessionCommand::DeleteGeneratedModel { .. } => "delete_generated_model",
            SessionCommand::OpenFile => "open_file",
            SessionCommand::SaveFile { .. } => "save_file",
            SessionCommand::SaveFileAs => "save_file_as",
            SessionCommand::LoadCompressed { .. } => "load_compressed",
            SessionCommand::StorageCompleted { .. } => "storage_completed",
            SessionCommand::CodecResponse { .. } => "codec_response",
            SessionCommand::GetText { .. } => "get_text",
            SessionCommand::GetSelectedGraph { .. } => "get_selected_graph",
            SessionCommand::Dispose => "dispose",
        }
    }
}
