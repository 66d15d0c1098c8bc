//! Result envelope wrapping every backend response.
//!
//! The `result` tag selects the variant; any tag outside this set fails to
//! decode and is treated as a protocol violation by callers.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Issue, PropertyIssue};
use crate::ProtocolError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum ResultEnvelope<T> {
    Success {
        value: T,
    },
    /// Intermediate progress report for long-running requests
    Status {
        value: Value,
    },
    Timeout {
        message: String,
    },
    Cancelled {
        message: String,
    },
    RequestError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<Vec<PropertyIssue>>,
    },
    ServerError {
        message: String,
    },
    InvalidProblem {
        message: String,
        issues: Vec<Issue>,
    },
    Unsatisfiable {
        message: String,
    },
}

impl<T: DeserializeOwned> ResultEnvelope<T> {
    /// Validate a raw response against the envelope.
    pub fn decode(raw: Value) -> Result<Self, ProtocolError> {
        serde_json::from_value(raw).map_err(ProtocolError::MalformedEnvelope)
    }
}

impl<T> ResultEnvelope<T> {
    /// Wire name of the `result` tag.
    pub fn tag(&self) -> &'static str {
        match self {
            ResultEnvelope::Success { .. } => "success",
            ResultEnvelope::Status { .. } => "status",
            ResultEnvelope::Timeout { .. } => "timeout",
            ResultEnvelope::Cancelled { .. } => "cancelled",
            ResultEnvelope::RequestError { .. } => "requestError",
            ResultEnvelope::ServerError { .. } => "serverError",
            ResultEnvelope::InvalidProblem { .. } => "invalidProblem",
            ResultEnvelope::Unsatisfiable { .. } => "unsatisfiable",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultEnvelope::Success { .. })
    }

    /// Failure message, if this is one of the error variants.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            ResultEnvelope::Success { .. } | ResultEnvelope::Status { .. } => None,
            ResultEnvelope::Timeout { message }
            | ResultEnvelope::Cancelled { message }
            | ResultEnvelope::RequestError { message, .. }
            | ResultEnvelope::ServerError { message }
            | ResultEnvelope::InvalidProblem { message, .. }
            | ResultEnvelope::Unsatisfiable { message } => Some(message),
        }
    }

    /// The success payload, dropping every other variant.
    pub fn into_value(self) -> Option<T> {
        match self {
            ResultEnvelope::Success { value } => Some(value),
            _ => None,
        }
    }
}
