//! Device templates
//!
//! Maps a meter's firmware signature to its register layout and turns raw
//! register dumps into scaled, named measurements.

pub mod extract;
pub mod registry;
pub mod types;

pub use extract::{extract, parse};
pub use registry::{check_registry, resolve, template, TEMPLATES};
pub use types::*;
