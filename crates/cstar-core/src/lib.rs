pub mod env;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{CStarError, Result};
