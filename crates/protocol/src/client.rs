//! Client → backend requests

use serde::{Deserialize, Serialize};

use crate::types::TextEdit;

/// Messages sent from a document session to the backend.
///
/// `state_id` is the document version the request refers to. Content assist
/// and hover are request/response; everything else is fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendRequest {
    // Document synchronization
    FullText {
        state_id: u64,
        text: String,
    },
    DocumentChanged {
        state_id: u64,
        required_state_id: u64,
        changes: Vec<TextEdit>,
    },

    // Editor services
    Format {
        state_id: u64,
    },
    GoToDefinition {
        state_id: u64,
        offset: usize,
    },
    ContentAssist {
        state_id: u64,
        offset: usize,
    },
    Hover {
        state_id: u64,
        offset: usize,
    },

    // Model generation
    StartGeneration {
        random_seed: u64,
    },
    CancelGeneration,

    // Semantics options
    UpdateConcretize {
        concretize: bool,
    },
}

impl BackendRequest {
    /// Whether the backend answers this request with a result envelope.
    pub fn expects_response(&self) -> bool {
        matches!(
            self,
            BackendRequest::ContentAssist { .. } | BackendRequest::Hover { .. }
        )
    }

    /// Short name used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendRequest::FullText { .. } => "full_text",
            BackendRequest::DocumentChanged { .. } => "document_changed",
            BackendRequest::Format { .. } => "format",
            BackendRequest::GoToDefinition { .. } => "go_to_definition",
            BackendRequest::ContentAssist { .. } => "content_assist",
            BackendRequest::Hover { .. } => "hover",
            BackendRequest::StartGeneration { .. } => "start_generation",
            BackendRequest::CancelGeneration => "cancel_generation",
            BackendRequest::UpdateConcretize { .. } => "update_concretize",
        }
    }
}
