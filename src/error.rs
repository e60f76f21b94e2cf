//! Error types for ticket-folder-sync

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A required setting is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required folder path does not resolve.
    #[error("Folder not found: {0}")]
    Resolution(String),

    /// The operation was invoked on a folder it does not apply to.
    #[error("{0}")]
    Precondition(String),

    /// An underlying folder or message operation failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// A lifecycle move could not be confirmed afterwards.
    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Timed out after {after:?} while {what}")]
    Timeout { what: String, after: Duration },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error came from the mail backend rather than from
    /// configuration or the state of the folder tree.
    #[must_use]
    pub const fn is_provider(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::Imap(_) | Self::Tls(_) | Self::Io(_) | Self::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
