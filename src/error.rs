use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the XMSS[MT] engine.
///
/// Integrity failures on cached subtrees are repaired internally by
/// regeneration and normally never reach the caller; [`Error::Corrupt`]
/// only escapes when regeneration was not attempted.  Failures of the
/// durable sequence-number update are fatal and bubble up unmodified:
/// the caller must not treat the sequence number as used.
#[derive(Error, Debug)]
pub enum Error {
    /// Unsupported parameter combination (bad n, w, or d that does not
    /// divide the full height).
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// Signature verification failed.  Deliberately carries no detail.
    #[error("invalid signature")]
    InvalidSignature,

    /// Every sequence number of the keypair has been used.
    #[error("signature sequence numbers exhausted")]
    Exhausted,

    /// Another process holds the lock on the private-key container.
    #[error("{0} is locked by another process")]
    Locked(PathBuf),

    /// A cached subtree failed its integrity check and regeneration was
    /// not attempted.
    #[error("cached subtree failed its integrity check")]
    Corrupt,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed header, signature, public key or container file.
    #[error("malformed encoding: {0}")]
    Serde(String),
}

impl Error {
    /// Whether this error was caused by a held container lock.
    pub fn locked(&self) -> bool {
        matches!(self, Error::Locked(_))
    }
}
