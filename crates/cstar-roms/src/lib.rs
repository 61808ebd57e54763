//! The ROMS `.in` runtime-settings codec (§4.K): a round-tripping
//! parser/serialiser for the Fortran-style configuration file that drives
//! the scientific model.

pub mod emit;
pub mod parse;
pub mod runtime_settings;

pub use emit::{emit, to_file};
pub use parse::{from_file, parse};
pub use runtime_settings::{
    BottomDrag, Initial, LinRhoEos, MarblBiogeochemistry, MyBakMixing, ROMSRuntimeSettings,
    SCoord, TimeStepping, VerticalMixing, DEFAULT_OUTPUT_ROOT_NAME,
};
