//! modelsync
//!
//! Keeps an editable problem document in sync with a remote analysis
//! backend: edit transactions and undo history, backend diagnostics and
//! highlighting, model generation jobs, file storage and a compressed,
//! URL-safe persistence round-trip.
//!
//! Each document is a [`DocumentSession`] driven by a [`SessionActorHandle`].

pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod document;
pub mod generation;
pub mod history;
pub mod logging;
pub mod session;
pub mod session_actor;
pub mod session_command;
pub mod storage;

pub use config::{LogFormat, SyncConfig};
pub use connection::{
    connection_pair, ClientConnection, ConnectionError, ConnectionFacade, ConnectionStatus,
    Outbound, TransportEnds,
};
pub use diagnostics::{DiagnosticCounts, DiagnosticsTracker};
pub use document::{DocumentState, HistoryMode, Selection, TransactionError, TransactionSpec};
pub use generation::{GeneratedModelSession, GenerationRegistry, GenerationStatus};
pub use logging::{init_logging, LoggingHandle};
pub use session::{DocumentId, DocumentSession, SaveRequest, SessionEvent, SessionSnapshot};
pub use session_actor::SessionActorHandle;
pub use session_command::SessionCommand;
pub use storage::{FileHandle, LocalFileStorage, PickerOptions, Storage, StorageError};
