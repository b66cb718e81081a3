//! Run summary
//!
//! Everything a caller needs to report after a run: the decay parameters
//! actually used, mean scores and the SPAR self-check, and counts.
//! Serializes to JSON for the CLI.

use serde::Serialize;

use crate::core::config::{AnalysisParameters, CatchmentParameters};
use crate::core::decay::DecayMode;
use crate::core::engine::AccessibilityScores;
use crate::core::error::AggregationFailure;
use crate::core::normalize::{deflated_mean_score, SparOutcome};

/// Decay parameters in effect for a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecayParameters {
    pub method: String,
    /// Gaussian coefficient, given or solved
    pub coefficient: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_weight: Option<f64>,
    /// Routing cutoff handed to the OD provider
    pub cutoff: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zones: Option<ZoneParameters>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneParameters {
    pub boundary: String,
    pub limits: [f64; 3],
    pub weighting_distances: [f64; 3],
    pub weights: [f64; 3],
}

impl DecayParameters {
    pub fn from_parameters(params: &AnalysisParameters) -> Self {
        let target_weight = match params.decay_mode {
            DecayMode::UseTargetWeight(w) => Some(w),
            DecayMode::UseCoefficient(_) => None,
        };
        let zones = match &params.catchment {
            CatchmentParameters::Zones(zones) => Some(ZoneParameters {
                boundary: zones.policy().to_string(),
                limits: zones.breakpoints().values(),
                weighting_distances: zones.representative(),
                weights: zones.weights(),
            }),
            CatchmentParameters::Threshold(_) => None,
        };
        Self {
            method: params.method().to_string(),
            coefficient: params.catchment.coefficient(),
            target_weight,
            cutoff: params.catchment.cutoff(),
            zones,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedSupply {
    pub id: String,
    pub reason: String,
}

impl From<&AggregationFailure> for ExcludedSupply {
    fn from(failure: &AggregationFailure) -> Self {
        Self {
            id: failure.supply_id.clone(),
            reason: failure.to_string(),
        }
    }
}

/// Summary of one completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub decay: DecayParameters,
    pub mean_score: f64,
    /// E2SFCA mean with the multiplier divided back out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deflated_mean_score: Option<f64>,
    pub mean_spar: f64,
    pub spar_tolerance: f64,
    pub spar_within_tolerance: bool,
    pub supply_count: usize,
    pub demand_count: usize,
    /// Demand points with no positively weighted scored supply
    pub unreached_demand: usize,
    pub unique_scores: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded_supplies: Vec<ExcludedSupply>,
}

impl RunSummary {
    pub fn new(params: &AnalysisParameters, scores: &AccessibilityScores, spar: &SparOutcome) -> Self {
        let deflated = match params.catchment {
            CatchmentParameters::Zones(_) if params.multiplier != 1.0 => {
                deflated_mean_score(spar.mean_score, params.multiplier)
            }
            _ => None,
        };
        Self {
            decay: DecayParameters::from_parameters(params),
            mean_score: spar.mean_score,
            deflated_mean_score: deflated,
            mean_spar: spar.mean_spar,
            spar_tolerance: params.normalizer.tolerance(),
            spar_within_tolerance: spar.within_tolerance,
            supply_count: scores.supply.len(),
            demand_count: spar.demand_count,
            unreached_demand: spar.unreached_count,
            unique_scores: spar.unique_scores,
            excluded_supplies: scores.excluded.iter().map(ExcludedSupply::from).collect(),
        }
    }

    /// Human-readable lines for log output
    pub fn report_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "{} decay coefficient: {}",
            self.decay.method, self.decay.coefficient
        )];
        if let Some(zones) = &self.decay.zones {
            lines.push(format!(
                "Zone weights ({}): {:?} at {:?}",
                zones.boundary, zones.weights, zones.weighting_distances
            ));
        }
        lines.push(format!("Mean Step-2 score: {}", self.mean_score));
        if let Some(deflated) = self.deflated_mean_score {
            lines.push(format!("Mean score without multiplier: {deflated}"));
        }
        lines.push(format!("Mean SPAR: {}", self.mean_spar));
        lines.push(format!(
            "Demand locations: {} ({} unreached, {} unique scores)",
            self.demand_count, self.unreached_demand, self.unique_scores
        ));
        if !self.excluded_supplies.is_empty() {
            lines.push(format!(
                "Excluded supplies: {} of {}",
                self.excluded_supplies.len(),
                self.supply_count
            ));
        }
        lines
    }
}
