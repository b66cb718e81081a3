//! Core library modules for butterfly-access
//!
//! Decay and catchment weighting, OD matrices, the two-step engine, SPAR
//! normalization and the run pipeline that ties them together.

pub mod analysis;
pub mod catchment;
pub mod config;
pub mod decay;
pub mod engine;
pub mod error;
pub mod location;
pub mod matrix;
pub mod normalize;
pub mod summary;
pub mod volume;

pub use analysis::{Analysis, AnalysisOutput, RunOptions};
