//! Error taxonomy for the storage engine (component C1).
//!
//! Every failure the engine can surface is represented here so the HTTP
//! adapter can map it to the exact wire status required by the protocol
//! without re-deriving meaning from a generic [`git2::Error`].

use crate::types::LockInfo;
use thiserror::Error;

/// The error type shared by the Git session, storage engine and backend
/// orchestrator.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The atomic branch push lost the race to another acquirer. This is an
    /// internal signal the orchestrator recovers from; it should never
    /// reach the HTTP layer directly.
    #[error("lock was already acquired by someone else")]
    LockingConflict,

    /// Someone else holds the lock. Carries the raw bytes the client sent
    /// when it originally acquired the lock, so the caller can return them
    /// verbatim, plus the parsed view for logging/inspection.
    #[error("the state was already locked by {}: {}", .parsed.who.as_deref().unwrap_or("unknown"), .parsed.id)]
    Locked {
        raw: Vec<u8>,
        parsed: Box<LockInfo>,
    },

    /// No lock branch exists for this state.
    #[error("state was not locked")]
    LockMissing,

    /// The ref exists but the state file does not.
    #[error("state did not exist")]
    StateDidNotExist,

    /// HTTP authentication failed.
    #[error("unauthorized")]
    Unauthorized,

    /// Request parameters failed validation (empty repository/state, etc).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown storage backend name.
    #[error("unknown storage type: {0}")]
    UnknownStorageType(String),

    /// Git repository error not otherwise classified above.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// Filesystem error while manipulating the working tree.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Lock metadata failed to parse as JSON.
    #[error("invalid lock metadata: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Encryption/decryption failure that is not the graceful-degradation
    /// case (those return the input unchanged rather than erroring).
    #[error("encryption error: {0}")]
    Encryption(String),
}

/// A specialized [`Result`] for storage-engine operations.
pub type Result<T> = std::result::Result<T, CoreError>;
