//! Report and export of match runs.

mod summary;
mod tables;

pub use summary::*;
pub use tables::*;
