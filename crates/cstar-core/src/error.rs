use std::path::PathBuf;
use thiserror::Error;

/// The error kinds named in the core's error-handling design: each variant
/// is one of the fatal-or-advisory policies, not a source-language type name.
#[derive(Error, Debug)]
pub enum CStarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XDG base directory error: {0}")]
    Xdg(#[from] xdg::BaseDirectoriesError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "Environment variable '{env_var}' points to a repository whose remote ({actual_remote}) does not match the expected source ({expected_remote}). Your environment may be misconfigured."
    )]
    EnvironmentMismatch {
        env_var: String,
        expected_remote: String,
        actual_remote: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(
        "Command `{command}` failed with exit code {code:?}.\n[stderr]\n{stderr}"
    )]
    Subprocess {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to launch command `{command}`: {source}")]
    ProcessLaunchFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Hash mismatch for {location}: expected {expected}, got {actual}. File deleted for safety."
    )]
    Integrity {
        location: String,
        expected: String,
        actual: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{message}\n{alternatives}")]
    NotFoundWithAlternatives { message: String, alternatives: String },

    #[error("Operation aborted by user: {0}")]
    InteractiveAbort(String),

    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    #[error("I/O error on path '{path}': {source}")]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, CStarError>;
