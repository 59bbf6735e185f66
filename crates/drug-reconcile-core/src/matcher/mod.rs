//! Catalog matching: normalization, attribute scoring, weighting and the run loop.

mod combination;
mod engine;
mod generic;
mod normalizer;
mod price;
mod similarity;
mod sink;
mod vectorizer;
mod weighting;

pub use combination::*;
pub use engine::*;
pub use generic::*;
pub use normalizer::*;
pub use price::*;
pub use similarity::*;
pub use sink::*;
pub use vectorizer::*;
pub use weighting::*;
