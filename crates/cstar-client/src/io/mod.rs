//! Source classification, retrieval, staging, and external-codebase
//! lifecycle (§4.G–§4.L).

pub mod classify;
pub mod confirm;
pub mod external_codebase;
pub mod retriever;
pub mod source;
pub mod stager;
pub mod staged;

pub use classify::{classify, FileEncoding, LocationType, SourceClassification, SourceType};
pub use confirm::{Confirm, FixedConfirm, PromptOutcome, StdinConfirm};
pub use external_codebase::{ExternalCodeBase, LocalConfigStatus};
pub use source::Source;
pub use stager::{stage, stage_cached_repository};
pub use staged::{StagedDataCollection, StagedFile, StagedHandle, StagedRepository};
