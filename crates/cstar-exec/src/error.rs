use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error(transparent)]
    Core(#[from] cstar_core::CStarError),
}

pub type Result<T> = std::result::Result<T, ExecError>;
