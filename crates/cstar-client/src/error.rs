use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Core(#[from] cstar_core::CStarError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Exec(#[from] cstar_exec::ExecError),

    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Unknown system '{0}'. No system context is registered under that name.")]
    UnknownSystem(String),

    #[error(
        "Could not determine host identity: none of LMOD_SYSHOST, LMOD_SYSTEM_NAME, or \
         <platform>_<machine> resolved to a usable name."
    )]
    HostIdentificationFailed,

    #[error("Could not classify source '{0}': {1}")]
    ClassificationFailed(String, String),

    #[error("'{0}' is an HTML page, not a supported remote source type.")]
    HtmlSourceRejected(String),

    #[error("Reading a {0} into memory is not a supported operation.")]
    Unimplemented(String),

    #[error("Staging target directory '{0}' exists and is not empty (required empty for a repository clone).")]
    StageTargetNotEmpty(std::path::PathBuf),

    #[error("Staging target directory '{0}' exists and is not a directory.")]
    StageTargetNotADirectory(std::path::PathBuf),
}

pub type Result<T> = std::result::Result<T, ClientError>;
