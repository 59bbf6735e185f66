//! Domain models for catalog reconciliation.

mod outcome;
mod record;
mod scoring;

pub use outcome::*;
pub use record::*;
pub use scoring::*;
