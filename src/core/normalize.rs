//! Spatial Access Ratio (SPAR) normalization
//!
//! Each Step-2 score is divided by the mean over all demand points, so the
//! mean SPAR is 1.0 by construction. The recomputed mean is kept as a
//! self-check and flagged, not failed, when it drifts past the tolerance.

use log::{debug, warn};
use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::core::engine::DemandScore;
use crate::core::error::{Error, Result};

/// Default relative tolerance on the mean SPAR self-check
pub const DEFAULT_SPAR_TOLERANCE: f64 = 1e-6;

/// Normalized score for one demand point
#[derive(Debug, Clone, PartialEq)]
pub struct DemandSpar {
    pub id: String,
    pub step2: f64,
    pub spar: f64,
}

/// Normalization result and its diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct SparOutcome {
    pub scores: Vec<DemandSpar>,
    /// Mean Step-2 score over every demand point, unreached ones included
    pub mean_score: f64,
    pub mean_spar: f64,
    /// False when `mean_spar` deviates from 1.0 by more than the tolerance
    pub within_tolerance: bool,
    pub demand_count: usize,
    pub unreached_count: usize,
    /// Distinct positive Step-2 values
    pub unique_scores: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparNormalizer {
    tolerance: f64,
}

impl Default for SparNormalizer {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_SPAR_TOLERANCE,
        }
    }
}

impl SparNormalizer {
    pub fn new(tolerance: f64) -> Result<Self> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "SPAR tolerance must be a non-negative number, got {tolerance}"
            )));
        }
        Ok(Self { tolerance })
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn normalize(&self, demand: &[DemandScore]) -> Result<SparOutcome> {
        let demand_count = demand.len();
        if demand_count == 0 {
            return Err(Error::DivisionByZero(
                "there are no demand locations to normalize".to_string(),
            ));
        }

        let total: f64 = demand.iter().map(|d| d.step2).sum();
        let mean_score = total / demand_count as f64;
        if !mean_score.is_finite() {
            return Err(Error::InvalidParameter(format!(
                "mean Step-2 score is {mean_score}; Step-2 scores overflowed, check supply volumes and multiplier"
            )));
        }
        if mean_score == 0.0 {
            return Err(Error::DivisionByZero(
                "mean Step-2 score is 0; no demand location reached any supply".to_string(),
            ));
        }

        let scores: Vec<DemandSpar> = demand
            .par_iter()
            .map(|d| DemandSpar {
                id: d.id.clone(),
                step2: d.step2,
                spar: d.step2 / mean_score,
            })
            .collect();

        let mean_spar = scores.iter().map(|s| s.spar).sum::<f64>() / demand_count as f64;
        let deviation = (mean_spar - 1.0).abs();
        let within_tolerance = deviation <= self.tolerance;
        if within_tolerance {
            debug!("Mean SPAR {mean_spar} (deviation {deviation:e})");
        } else {
            warn!(
                "Mean SPAR is {mean_spar}, deviating from 1.0 by {deviation:e} (tolerance {:e}); check input data quality",
                self.tolerance
            );
        }

        let unreached_count = demand.iter().filter(|d| d.reachable_supplies == 0).count();
        let unique_scores = demand
            .iter()
            .filter(|d| d.step2 > 0.0)
            .map(|d| d.step2.to_bits())
            .collect::<FxHashSet<u64>>()
            .len();

        Ok(SparOutcome {
            scores,
            mean_score,
            mean_spar,
            within_tolerance,
            demand_count,
            unreached_count,
            unique_scores,
        })
    }
}

/// Mean score with a uniform E2SFCA multiplier taken back out
pub fn deflated_mean_score(mean_score: f64, multiplier: f64) -> Option<f64> {
    if multiplier > 0.0 {
        Some(mean_score / multiplier)
    } else {
        None
    }
}
