use std::io;

use thiserror::Error;

/// Errors produced by the tailing engines.
///
/// Per-file errors retire the file they name; `NotificationUnsupported`,
/// `ChannelFailure` and `SinkClosed` end the whole session.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("no such file or directory")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("not a regular file, pipe, or character device")]
    UnsupportedFileKind,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("inotify is not available on this system")]
    NotificationUnsupported,

    #[error("notification channel failed: {0}")]
    ChannelFailure(io::Error),

    #[error("output sink closed")]
    SinkClosed,
}

impl TailError {
    /// Classify the result of an `open()` call.
    pub fn from_open(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => TailError::NotFound,
            io::ErrorKind::PermissionDenied => TailError::PermissionDenied,
            _ => TailError::Io(err),
        }
    }

    /// True for errors that terminate the session rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TailError::NotificationUnsupported
                | TailError::ChannelFailure(_)
                | TailError::SinkClosed
        )
    }
}
