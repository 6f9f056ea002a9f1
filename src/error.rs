//! Decode error types.
//!
//! Only conditions that make the whole file unusable are errors. Everything
//! the decoder can work around (resynchronization, missing metadata, spanners
//! that cannot be matched) is reported through [`crate::diagnostics`] instead.

use thiserror::Error;

/// Fatal decode failures. No partial score is returned alongside any of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The first four bytes are neither `SCOW` nor `SCO5`.
    #[error("invalid file magic {}", format_magic(.0))]
    InvalidMagic([u8; 4]),

    /// A measure element carried a type code with no known record layout.
    #[error("unsupported element type {type_code} at offset 0x{offset:x}")]
    UnknownElementType { type_code: u8, offset: usize },

    /// A field read ran past the end of the buffer.
    #[error("unexpected end of data at offset 0x{offset:x} (needed {needed} bytes)")]
    UnexpectedEof { offset: usize, needed: usize },

    /// The decoded model could not be serialized.
    #[error("JSON serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Serialization(e.to_string())
    }
}

fn format_magic(magic: &[u8; 4]) -> String {
    if magic.iter().all(|b| b.is_ascii_graphic()) {
        format!("'{}'", magic.iter().map(|&b| b as char).collect::<String>())
    } else {
        format!(
            "{:02X} {:02X} {:02X} {:02X}",
            magic[0], magic[1], magic[2], magic[3]
        )
    }
}
