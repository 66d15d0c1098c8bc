//! Messages exchanged with the codec worker

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CodecRequest {
    Compress { text: String, version: u64 },
    Decompress { compressed_text: String, version: u64 },
}

impl CodecRequest {
    pub fn version(&self) -> u64 {
        match self {
            CodecRequest::Compress { version, .. } | CodecRequest::Decompress { version, .. } => {
                *version
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CodecResponse {
    Compressed { compressed_text: String, version: u64 },
    Decompressed { text: String, version: u64 },
    /// Not correlated to a version: fails whatever is pending.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_use_camel_case_wire_names() {
        let json = serde_json::to_value(CodecRequest::Decompress {
            compressed_text: "abc".into(),
            version: 7,
        })
        .unwrap();
        assert_eq!(
            json,
            json!({"request": "decompress", "compressedText": "abc", "version": 7})
        );
    }

    #[test]
    fn error_response_has_no_version() {
        let response: CodecResponse =
            serde_json::from_value(json!({"response": "error", "message": "boom"})).unwrap();
        assert_eq!(
            response,
            CodecResponse::Error {
                message: "boom".into()
            }
        );
    }
}
