pub mod environment;
pub mod manager;
pub mod name;

pub use environment::CStarEnvironment;
pub use manager::{get_system_context, with_system_context, SystemContext, CSTAR_SYSMGR};
pub use name::{identify_host, SystemName};
