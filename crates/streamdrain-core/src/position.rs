//! Position cursor.
//!
//! A [`Position`] is an opaque token describing how far a stream has been
//! consumed. Only the source that issued it can interpret it; this crate never
//! looks inside. Reopening a source at the position produced by record `R`
//! yields the stream starting strictly after `R`.
//!
//! Positions live in process memory only. They serialize with `serde` so a
//! caller can persist them if it wants to.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// Opaque resume token issued by a stream source.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position(Bytes);

impl Position {
    pub fn new(token: impl Into<Bytes>) -> Self {
        Self(token.into())
    }

    /// Encode a `u64` as an 8-byte big-endian token.
    ///
    /// Sources with numeric offsets use this so their tokens sort the same way
    /// bytewise as numerically.
    pub fn from_u64(value: u64) -> Self {
        Self(Bytes::copy_from_slice(&value.to_be_bytes()))
    }

    /// Decode a token written by [`Position::from_u64`].
    pub fn to_u64(&self) -> Result<u64> {
        let raw: [u8; 8] = self.0[..].try_into().map_err(|_| {
            StreamError::InvalidCursor(format!(
                "expected an 8-byte position, got {} bytes",
                self.0.len()
            ))
        })?;
        Ok(u64::from_be_bytes(raw))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// An empty token means "no position": start from the beginning.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Normalise an optional cursor so that an empty token counts as absent.
    pub fn resume_point(position: Option<&Position>) -> Option<&Position> {
        position.filter(|p| !p.is_empty())
    }
}

impl std::fmt::Debug for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Position({})", self)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<start>");
        }
        for byte in self.0.iter() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
