//! # Butterfly-access Library
//!
//! Spatial accessibility scoring with the two-step floating catchment area
//! family: E2SFCA (three fixed zones) and V2SFCA (one threshold with
//! continuous Gaussian decay). Scores are normalized to the Spatial Access
//! Ratio (SPAR), whose mean over all demand points is 1.0.
//!
//! ## Features
//!
//! - **Two methods**: fixed zones with a boundary policy, or a single threshold
//! - **Pluggable routing**: any [`OdMatrixProvider`] supplies travel costs
//! - **Parallel aggregation**: both steps run on the rayon pool
//! - **Progress tracking**: optional stage callbacks for custom UIs
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use butterfly_access::{AnalysisConfig, CsvMatrixProvider, LocationTable};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let params = AnalysisConfig::from_path("access.yaml")?.validate()?;
//!     let mut hospitals = LocationTable::from_csv_path("hospitals.csv", &params.supply_id_field)?;
//!     let mut tracts = LocationTable::from_csv_path("tracts.csv", &params.demand_id_field)?;
//!     let provider = CsvMatrixProvider::new("od.csv");
//!
//!     let output = butterfly_access::run(&params, &mut hospitals, &mut tracts, &provider)?;
//!     println!("Mean SPAR: {}", output.summary.mean_spar);
//!
//!     tracts.write_csv_path("tracts_scored.csv")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Progress Tracking
//!
//! ```rust,no_run
//! # use butterfly_access::{AnalysisConfig, LocationTable, OdPair, StaticMatrixProvider};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let params = AnalysisConfig::from_path("access.yaml")?.validate()?;
//! # let mut supply = LocationTable::from_csv_path("supply.csv", "id")?;
//! # let mut demand = LocationTable::from_csv_path("demand.csv", "id")?;
//! let provider = StaticMatrixProvider::new(vec![OdPair::new("s1", "d1", 4.5)])?;
//! butterfly_access::run_with_progress(&params, &mut supply, &mut demand, &provider, |stage| {
//!     println!("{stage}");
//! })?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub use crate::core::analysis::{Analysis, AnalysisOutput, RunOptions};
pub use crate::core::catchment::{BoundaryPolicy, Breakpoints, ThresholdCatchment, Zone, ZoneCatchment};
pub use crate::core::config::{
    AnalysisConfig, AnalysisParameters, CatchmentParameters, FieldNames, Method,
};
pub use crate::core::decay::{gaussian_weight, solve_coefficient, DecayMode, GaussianDecay};
pub use crate::core::engine::{
    AccessibilityEngine, AccessibilityScores, DemandScore, Stage, StageCallback, SupplyScore,
    UnreachableSupplyPolicy,
};
pub use crate::core::error::{AggregationFailure, Error, FailureReason, Result};
pub use crate::core::location::{AttributeStore, DemandLocation, LocationTable, SupplyLocation};
pub use crate::core::matrix::{
    CsvMatrixProvider, Direction, OdIndex, OdMatrix, OdMatrixProvider, OdPair, OdRequest,
    StaticMatrixProvider,
};
pub use crate::core::normalize::{
    deflated_mean_score, DemandSpar, SparNormalizer, SparOutcome, DEFAULT_SPAR_TOLERANCE,
};
pub use crate::core::summary::{DecayParameters, ExcludedSupply, RunSummary, ZoneParameters};
pub use crate::core::volume::{VolumeMode, VolumeResolver};

pub mod core;

/// Score supply and demand locations with the configured method
///
/// Volumes are resolved first (constants are written to their fields), then
/// Step-1, Step-2 and SPAR fields are written once the whole run succeeds.
pub fn run<S, D, P>(
    params: &AnalysisParameters,
    supply: &mut S,
    demand: &mut D,
    provider: &P,
) -> Result<AnalysisOutput>
where
    S: AttributeStore,
    D: AttributeStore,
    P: OdMatrixProvider + ?Sized,
{
    run_with_options(params, supply, demand, provider, RunOptions::default())
}

/// Run with a callback invoked as the engine enters each [`Stage`]
pub fn run_with_progress<S, D, P, F>(
    params: &AnalysisParameters,
    supply: &mut S,
    demand: &mut D,
    provider: &P,
    progress: F,
) -> Result<AnalysisOutput>
where
    S: AttributeStore,
    D: AttributeStore,
    P: OdMatrixProvider + ?Sized,
    F: Fn(Stage) + Send + Sync + 'static,
{
    let options = RunOptions {
        progress: Some(Arc::new(progress)),
    };
    run_with_options(params, supply, demand, provider, options)
}

/// Run with explicit [`RunOptions`]
pub fn run_with_options<S, D, P>(
    params: &AnalysisParameters,
    supply: &mut S,
    demand: &mut D,
    provider: &P,
    options: RunOptions,
) -> Result<AnalysisOutput>
where
    S: AttributeStore,
    D: AttributeStore,
    P: OdMatrixProvider + ?Sized,
{
    Analysis::new(params, options).run(supply, demand, provider)
}
