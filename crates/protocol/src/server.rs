//! Backend → client push messages

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::ResultEnvelope;
use crate::types::*;
use crate::ProtocolError;

/// Messages pushed by the backend to a document session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendPush {
    // Annotations
    Diagnostics {
        issues: Vec<Issue>,
    },
    Highlighting {
        ranges: Vec<HighlightRange>,
        #[serde(default)]
        type_hashes: Vec<String>,
    },
    Occurrences {
        write: Vec<TextRange>,
        read: Vec<TextRange>,
        #[serde(default)]
        go_to_first: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        fallback: Option<usize>,
    },

    // Semantics status
    AnalysisStarted,
    AnalysisCompleted {
        #[serde(default)]
        skipped: bool,
    },
    SemanticsError {
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default)]
        propagation_rejected: bool,
    },
    Semantics {
        result: ResultEnvelope<SemanticsResult>,
    },

    // Model generation lifecycle
    ModelAdded {
        uuid: String,
        random_seed: u64,
    },
    ModelMessage {
        uuid: String,
        message: String,
    },
    ModelError {
        uuid: String,
        message: String,
    },
    ModelSemantics {
        uuid: String,
        result: SemanticsResult,
    },
    GenerationCancelled,

    // Lifecycle
    Disconnected,
}

impl BackendPush {
    /// Decode a raw frame. Frames with an unknown `type` are protocol errors.
    pub fn decode(frame: Value) -> Result<Self, ProtocolError> {
        serde_json::from_value(frame).map_err(ProtocolError::MalformedPush)
    }
}
