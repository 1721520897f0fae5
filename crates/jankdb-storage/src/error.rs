use std::{io, path::PathBuf};

use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors produced by [`crate::Store`] and the atomic write protocol.
/// Every variant names the path it failed on.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store options: {reason}")]
    InvalidOptions { reason: String },
    #[error("failed to stat {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Read, write, mkdir or rename failure.
    #[error("failed to {op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize data for {}: {source}", .path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to deserialize {}: {source}", .path.display())]
    Deserialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encrypt data for {}: {source}", .path.display())]
    Encryption {
        path: PathBuf,
        #[source]
        source: CryptoError,
    },
    #[error("failed to decrypt {}: {source}", .path.display())]
    Decryption {
        path: PathBuf,
        #[source]
        source: CryptoError,
    },
}

impl StoreError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            op,
            path: path.into(),
            source,
        }
    }
}
