//! Text and binary content encoding for reads and writes.

use base64::{Engine, engine::general_purpose::STANDARD};
use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};
use serde::Serialize;

use crate::error::FsError;

/// How file content travels over the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    /// Decoded text in a named encoding.
    #[default]
    Text,
    /// Raw bytes as standard base64.
    Binary,
}

/// Look up a WHATWG encoding label; `None` means UTF-8.
pub(crate) fn encoding_for(label: Option<&str>) -> Result<&'static Encoding, FsError> {
    match label.map(str::trim).filter(|l| !l.is_empty()) {
        None => Ok(UTF_8),
        Some(label) => Encoding::for_label(label.as_bytes())
            .ok_or_else(|| FsError::InvalidArgument(format!("unknown encoding: {label}"))),
    }
}

/// Decode `bytes`, replacing malformed sequences with U+FFFD.
///
/// Returns the text and whether anything was replaced.
pub(crate) fn decode_text(bytes: &[u8], encoding: &'static Encoding) -> (String, bool) {
    let (text, lossy) = encoding.decode_without_bom_handling(bytes);
    (text.into_owned(), lossy)
}

/// Encode `text`; unmappable characters become numeric character references.
///
/// Returns the bytes and whether anything was replaced.
pub(crate) fn encode_text(text: &str, encoding: &'static Encoding) -> (Vec<u8>, bool) {
    // encoding_rs only encodes to ASCII-compatible targets; UTF-16 is done by hand.
    if encoding == UTF_16LE {
        return (text.encode_utf16().flat_map(u16::to_le_bytes).collect(), false);
    }
    if encoding == UTF_16BE {
        return (text.encode_utf16().flat_map(u16::to_be_bytes).collect(), false);
    }
    let (bytes, _, lossy) = encoding.encode(text);
    (bytes.into_owned(), lossy)
}

pub(crate) fn encode_binary(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub(crate) fn decode_binary(content: &str) -> Result<Vec<u8>, FsError> {
    STANDARD
        .decode(content.trim())
        .map_err(|e| FsError::InvalidArgument(format!("invalid base64 content: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_utf8() {
        assert_eq!(encoding_for(None).unwrap(), UTF_8);
        assert_eq!(encoding_for(Some(" ")).unwrap(), UTF_8);
        assert_eq!(encoding_for(Some("latin1")).unwrap().name(), "windows-1252");
    }

    #[test]
    fn unknown_label() {
        let err = encoding_for(Some("klingon")).unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[test]
    fn lossy_decode_never_fails() {
        let (text, lossy) = decode_text(b"ok \xff\xfe end", UTF_8);
        assert_eq!(text, "ok \u{fffd}\u{fffd} end");
        assert!(lossy);
    }

    #[test]
    fn utf16_encoding_round_trips() {
        let (bytes, lossy) = encode_text("hé", UTF_16LE);
        assert_eq!(bytes, [0x68, 0x00, 0xe9, 0x00]);
        assert!(!lossy);
        assert_eq!(decode_text(&bytes, UTF_16LE).0, "hé");
    }

    #[test]
    fn unmappable_characters_are_replaced() {
        let (bytes, lossy) = encode_text("€ ✓", encoding_for(Some("iso-8859-2")).unwrap());
        assert!(lossy);
        assert!(String::from_utf8_lossy(&bytes).contains("&#10003;"));
    }

    #[test]
    fn bad_base64() {
        assert_eq!(decode_binary("not base64!").unwrap_err().code(), "invalid_argument");
        assert_eq!(decode_binary("aGk=").unwrap(), b"hi");
    }
}
