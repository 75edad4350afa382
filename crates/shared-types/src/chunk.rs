//! # Chunk
//!
//! The unit of data that flows through a pipe.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// One discrete unit written to or read from a pipe.
///
/// Pipes carry opaque chunks; only modules interpret them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Chunk {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes (e.g. a child process's stdout).
    Bytes(Vec<u8>),
    /// A structured value.
    Json(serde_json::Value),
}

impl Chunk {
    /// Render the chunk as text.
    ///
    /// Bytes are decoded lossily; JSON values are serialized compactly.
    #[must_use]
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Chunk::Text(s) => Cow::Borrowed(s.as_str()),
            Chunk::Bytes(b) => String::from_utf8_lossy(b),
            Chunk::Json(v) => Cow::Owned(v.to_string()),
        }
    }

    /// Render the chunk as bytes, for writing to a byte stream.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Chunk::Text(s) => s.into_bytes(),
            Chunk::Bytes(b) => b,
            Chunk::Json(v) => v.to_string().into_bytes(),
        }
    }

    /// Number of payload bytes, for logging.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Chunk::Text(s) => s.len(),
            Chunk::Bytes(b) => b.len(),
            Chunk::Json(v) => v.to_string().len(),
        }
    }

    /// True when the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Chunk {
    fn from(value: &str) -> Self {
        Chunk::Text(value.to_string())
    }
}

impl From<String> for Chunk {
    fn from(value: String) -> Self {
        Chunk::Text(value)
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(value: Vec<u8>) -> Self {
        Chunk::Bytes(value)
    }
}

impl From<serde_json::Value> for Chunk {
    fn from(value: serde_json::Value) -> Self {
        Chunk::Json(value)
    }
}
