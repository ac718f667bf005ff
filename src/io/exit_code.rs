//! Process exit codes for the CLI.
//!
//! `0` success, `1` general failure, `2` unrecoverable failure, `3` not
//! found, `4`-`7` specific recoverable failures. Codes above 125 are left
//! to the shell.

use crate::error::EngineError;

/// Exit codes the binary terminates with.
///
/// Scripts wrapping the CLI branch on these; the numbering is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// The command did what was asked
    Success = 0,

    /// Failure with no more specific code
    GeneralError = 1,

    /// Unrecoverable failure, e.g. a corrupt artifact
    BlockingError = 2,

    /// The query ran but matched nothing, or the paper is not indexed
    NotFound = 3,

    /// The embedding backend is unavailable or encoding failed
    EncoderError = 4,

    /// Reading or writing an artifact failed
    IoError = 5,

    /// Settings could not be loaded or are invalid
    ConfigError = 6,

    /// A push or pull against the remote store failed
    RemoteError = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// Determine the exit code for a query from its result set.
    ///
    /// Returns `Success` when anything was found, `NotFound` otherwise.
    pub fn from_search_results<T>(results: &[T]) -> Self {
        if results.is_empty() {
            ExitCode::NotFound
        } else {
            ExitCode::Success
        }
    }

    /// Map an `EngineError` to the exit code the process should end with.
    pub fn from_error(error: &EngineError) -> Self {
        match error {
            // Not-found errors are recoverable: update or pull first
            EngineError::PaperNotIndexed { .. } | EngineError::MatrixMissing { .. } => {
                ExitCode::NotFound
            }

            // An unreadable artifact should halt automation
            EngineError::LoadError { .. } => ExitCode::BlockingError,

            // Specific recoverable errors
            EngineError::EncoderNotReady { .. } | EngineError::EncodingFailed { .. } => {
                ExitCode::EncoderError
            }
            EngineError::FileRead { .. }
            | EngineError::FileWrite { .. }
            | EngineError::PersistenceError { .. } => ExitCode::IoError,
            EngineError::ConfigError { .. } => ExitCode::ConfigError,
            EngineError::RemoteError { .. } => ExitCode::RemoteError,

            // Everything else is a general error
            _ => ExitCode::GeneralError,
        }
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}
