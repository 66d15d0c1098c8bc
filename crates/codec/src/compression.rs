//! Text ⇄ compressed URL-safe string.
//!
//! `encode(text) = base64url(brotli(utf8(text)))`, where base64url is the
//! standard alphabet with `+` → `-` and `/` → `_`. Padding is emitted on
//! encode and optional on decode, since links often lose trailing `=`.

use std::io::{Read, Write};
use std::string::FromUtf8Error;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use thiserror::Error;

/// Brotli quality used when the caller has no preference
pub const DEFAULT_QUALITY: u32 = 9;

const LG_WINDOW: u32 = 22;
const BUFFER_SIZE: usize = 4096;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("compression stream error: {0}")]
    Io(#[from] std::io::Error),

    #[error("decompressed payload is not UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("codec worker is not running")]
    WorkerGone,
}

/// Compress `text` and transcode the bytes to the URL-safe alphabet.
pub fn compress_text(text: &str, quality: u32) -> Result<String, CodecError> {
    let mut writer =
        brotli::CompressorWriter::new(Vec::new(), BUFFER_SIZE, quality.min(11), LG_WINDOW);
    writer.write_all(text.as_bytes())?;
    writer.flush()?;
    let compressed = writer.into_inner();
    Ok(URL_SAFE_LENIENT.encode(compressed))
}

/// Reverse of [`compress_text`].
pub fn decompress_text(compressed_text: &str) -> Result<String, CodecError> {
    let bytes = URL_SAFE_LENIENT.decode(compressed_text.trim())?;
    let mut decompressor = brotli::Decompressor::new(bytes.as_slice(), BUFFER_SIZE);
    let mut raw = Vec::new();
    decompressor.read_to_end(&mut raw)?;
    Ok(String::from_utf8(raw)?)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn round_trip(text: &str) -> String {
        let compressed = compress_text(text, DEFAULT_QUALITY).unwrap();
        decompress_text(&compressed).unwrap()
    }

    #[test]
    fn round_trips_empty_string() {
        assert_eq!(round_trip(""), "");
    }

    #[test]
    fn round_trips_non_ascii() {
        let text = "class Személy.\nárvíztűrő tükörfúrógép 🚀 — λx.x";
        assert_eq!(round_trip(text), text);
    }

    #[test]
    fn round_trips_at_every_quality() {
        let text = "class Person {\n    Person[] friend opposite friend\n}\n".repeat(20);
        for quality in 0..=11 {
            let compressed = compress_text(&text, quality).unwrap();
            assert_eq!(decompress_text(&compressed).unwrap(), text);
        }
    }

    #[test]
    fn output_uses_url_safe_alphabet() {
        // Enough entropy that the standard alphabet would almost surely need + or /.
        let text: String = (0..2000u32)
            .map(|i| char::from_u32(0x20 + (i * 7919) % 0x5e).unwrap_or('x'))
            .collect();
        let compressed = compress_text(&text, DEFAULT_QUALITY).unwrap();
        assert!(!compressed.contains('+'));
        assert!(!compressed.contains('/'));
    }

    #[test]
    fn accepts_unpadded_input() {
        let compressed = compress_text("pred edge(node, node).", DEFAULT_QUALITY).unwrap();
        let unpadded = compressed.trim_end_matches('=');
        assert_eq!(decompress_text(unpadded).unwrap(), "pred edge(node, node).");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn any_string_round_trips(text in any::<String>(), quality in 0u32..=11) {
            let compressed = compress_text(&text, quality).unwrap();
            prop_assert!(!compressed.contains('+') && !compressed.contains('/'));
            prop_assert_eq!(decompress_text(&compressed).unwrap(), text);
        }
    }

    #[test]
    fn rejects_standard_alphabet_characters() {
        let err = decompress_text("ab+/").unwrap_err();
        assert!(matches!(err, CodecError::Base64(_)));
    }
}
