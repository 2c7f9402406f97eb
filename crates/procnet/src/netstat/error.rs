//! Error types for socket table scans.

use std::io;
use std::path::PathBuf;

use super::scan::Scan;
use super::types::NamespaceId;

/// Result type for scan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while scanning socket tables.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error outside of a specific table or namespace.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error reported while reading process information.
    #[error("procfs error: {0}")]
    Proc(#[from] procfs::ProcError),

    /// One table record could not be decoded.
    #[error("malformed record: {reason}")]
    MalformedRecord {
        /// What was wrong with the record.
        reason: String,
    },

    /// A whole protocol table is missing or unreadable.
    #[error("socket table {} unavailable: {source}", path.display())]
    SourceUnavailable {
        /// Path of the table that could not be opened.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A target network namespace could not be entered.
    #[error("cannot enter network namespace {namespace}: {source}")]
    NamespaceAccessDenied {
        /// The namespace that was refused.
        namespace: NamespaceId,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A process disappeared while it was being inspected.
    #[error("process {pid} vanished during scan")]
    ProcessVanished {
        /// The pid that disappeared.
        pid: u32,
    },

    /// The caller cancelled the scan.
    ///
    /// `partial` holds every namespace that was completely scanned before the
    /// cancellation was observed. It is never a complete result.
    #[error("scan cancelled after {} namespace(s)", partial.report.namespaces_scanned.len())]
    Cancelled {
        /// Entries of the namespaces finished before cancellation.
        partial: Box<Scan>,
    },

    /// Returning to the original network namespace failed.
    ///
    /// The calling thread is left in a foreign namespace; the scan is aborted.
    #[error("failed to restore original network namespace: {source}")]
    NamespaceRestoreFailed {
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Named namespace does not exist.
    #[error("namespace not found: {name}")]
    NamespaceNotFound {
        /// The namespace name that was not found.
        name: String,
    },
}

impl Error {
    /// Create a malformed-record error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }

    fn io_source(&self) -> Option<&io::Error> {
        match self {
            Self::Io(e)
            | Self::SourceUnavailable { source: e, .. }
            | Self::NamespaceAccessDenied { source: e, .. }
            | Self::NamespaceRestoreFailed { source: e } => Some(e),
            _ => None,
        }
    }

    /// Check if this is a "not found" error (ENOENT, missing namespace).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NamespaceNotFound { .. } | Self::ProcessVanished { .. } => true,
            Self::Proc(procfs::ProcError::NotFound(_)) => true,
            other => other
                .io_source()
                .is_some_and(|e| e.kind() == io::ErrorKind::NotFound),
        }
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        if let Self::Proc(procfs::ProcError::PermissionDenied(_)) = self {
            return true;
        }
        self.io_source().is_some_and(|e| {
            e.kind() == io::ErrorKind::PermissionDenied || e.raw_os_error() == Some(libc::EPERM)
        })
    }

    /// Check if this error leaves the calling thread in an unknown state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NamespaceRestoreFailed { .. })
    }

    /// Check if the scan was cancelled by the caller.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Get the errno value if this wraps an OS error.
    pub fn errno(&self) -> Option<i32> {
        self.io_source().and_then(io::Error::raw_os_error)
    }
}
