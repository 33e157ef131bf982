//! Error types for packaging operations.
//!
//! Provides contextual error chaining, filesystem errors that carry the
//! offending path, and dedicated variants for external tool failures.
//!
//! # Features
//!
//! - **Context trait**: Add context to errors similar to anyhow
//! - **ErrorExt trait**: Filesystem operations with automatic path context
//! - **bail! macro**: Early return with formatted error messages
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use appimage_packager::error::{Context, ErrorExt, Result};
//!
//! fn read_manifest(path: &Path) -> Result<serde_json::Value> {
//!     let contents = std::fs::read_to_string(path)
//!         .fs_context("reading manifest", path)?;
//!
//!     serde_json::from_str(&contents)
//!         .map_err(Into::into)
//!         .context("parsing manifest JSON")
//! }
//! ```

use std::{
    fmt::Display,
    io,
    path::{self, PathBuf},
};
use thiserror::Error as DeriveError;

/// Errors returned by the packager.
///
/// This enum covers all error conditions that can occur while staging an
/// application and driving the external packaging tool.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// Error with context. Created by the [`Context`] trait.
    ///
    /// Allows wrapping errors with additional context strings for better debugging.
    #[error("{0}: {1}")]
    Context(String, Box<Self>),

    /// File system error with path context.
    ///
    /// Automatically includes the path that caused the error for better diagnostics.
    /// Created by the [`ErrorExt`] trait's `fs_context` method.
    #[error("{context} {path}: {error}")]
    Fs {
        /// Context describing the operation (e.g., "reading binary")
        context: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: io::Error,
    },

    /// Child process could not be started.
    ///
    /// Used when spawning the external packaging tool fails outright, before
    /// the tool has a chance to run.
    #[error("failed to run command {command}: {error}")]
    CommandFailed {
        /// Command that failed to execute
        command: String,
        /// The underlying error
        error: io::Error,
    },

    /// The packaging tool exited unsuccessfully.
    ///
    /// Carries the exit code (absent when the process was killed by a signal)
    /// and whatever the tool wrote to stderr.
    #[error("{}", tool_failure_message(.code, .stderr))]
    ToolFailed {
        /// Exit code reported by the tool, if any
        code: Option<i32>,
        /// Accumulated stderr output
        stderr: String,
    },

    /// The packaging tool binary could not be located.
    #[error("packaging tool {tool} not found: {error}")]
    ToolNotFound {
        /// Tool name that was searched for
        tool: String,
        /// The underlying lookup error
        error: which::Error,
    },

    /// Generic I/O error.
    #[error("{0}")]
    IoError(#[from] io::Error),

    /// Error walking a directory tree (used while mirroring).
    #[error("{0}")]
    WalkdirError(#[from] walkdir::Error),

    /// Path prefix stripping error.
    #[error("{0}")]
    StripError(#[from] path::StripPrefixError),

    /// JSON serialization/deserialization error.
    #[error("{0}")]
    JsonError(#[from] serde_json::error::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    GenericError(String),
}

fn tool_failure_message(code: &Option<i32>, stderr: &str) -> String {
    let status = match code {
        Some(code) => format!("packaging tool failed with exit code {code}"),
        None => "packaging tool terminated by signal".to_string(),
    };
    if stderr.is_empty() {
        status
    } else {
        format!("{status}: {stderr}")
    }
}

/// Convenient type alias for Result.
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for adding context to errors.
///
/// Similar to `anyhow::Context` but integrated with the packager's Error type.
/// Works with both `Result<T>` and `Option<T>`.
pub trait Context<T> {
    /// Add context to an error.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Add context to an error using a closure (lazy evaluation).
    ///
    /// Use this when context string construction is expensive.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Context(context.to_string(), Box::new(e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::Context(f().to_string(), Box::new(e)))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

/// Extension trait for filesystem operations with automatic path context.
///
/// Wraps I/O errors with the path that caused them for better diagnostics.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
///
/// use appimage_packager::error::{ErrorExt, Result};
///
/// fn create_stage_dir(path: &Path) -> Result<()> {
///     std::fs::create_dir_all(path).fs_context("creating stage directory", path)
/// }
/// ```
pub trait ErrorExt<T> {
    /// Add filesystem context to an I/O error.
    ///
    /// The `context` should be a present-tense verb phrase describing the operation,
    /// e.g., "reading file", "creating directory", "copying binary".
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}

/// Macro for early return with error.
///
/// Converts the message into a [`Error::GenericError`] and returns immediately.
///
/// # Examples
///
/// ```ignore
/// bail!("operation failed");
/// bail!("invalid value: {}", value);
/// ```
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::error::Error::GenericError($msg.into()))
    };
    ($err:expr $(,)?) => {
        return Err($crate::error::Error::GenericError($err.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::error::Error::GenericError(format!($fmt, $($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_wraps_message() {
        let inner: Result<()> = Err(Error::GenericError("boom".into()));
        let err = inner.context("staging application").unwrap_err();
        assert_eq!(err.to_string(), "staging application: boom");
    }

    #[test]
    fn fs_context_includes_path() {
        let io: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::NotFound, "missing"));
        let err = io.fs_context("reading binary", "/tmp/app").unwrap_err();
        assert_eq!(err.to_string(), "reading binary /tmp/app: missing");
    }

    #[test]
    fn tool_failed_formats_exit_code_and_stderr() {
        let err = Error::ToolFailed {
            code: Some(2),
            stderr: "no such target".into(),
        };
        assert_eq!(
            err.to_string(),
            "packaging tool failed with exit code 2: no such target"
        );

        let silent = Error::ToolFailed {
            code: Some(1),
            stderr: String::new(),
        };
        assert_eq!(silent.to_string(), "packaging tool failed with exit code 1");
    }

    #[test]
    fn option_context_produces_generic_error() {
        let missing: Option<u32> = None;
        let err = missing.context("no product name configured").unwrap_err();
        assert!(matches!(err, Error::GenericError(_)));
    }
}
