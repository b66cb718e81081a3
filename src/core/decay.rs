//! Gaussian distance decay
//!
//! `weight(d, c) = exp(-d² / c)`, and its inverse which solves the
//! coefficient that yields a target weight at a reference distance.

use crate::core::error::{Error, Result};

/// How the decay coefficient is chosen
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecayMode {
    /// Use the given coefficient directly
    UseCoefficient(f64),
    /// Solve the coefficient so the reference distance receives this weight
    UseTargetWeight(f64),
}

/// Gaussian decay kernel with a validated, strictly positive coefficient
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianDecay {
    coefficient: f64,
}

impl GaussianDecay {
    /// Create a kernel from an explicit coefficient
    pub fn new(coefficient: f64) -> Result<Self> {
        if !coefficient.is_finite() || coefficient <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "decay coefficient must be a positive number, got {coefficient}"
            )));
        }
        Ok(Self { coefficient })
    }

    /// Create a kernel whose weight at `reference_distance` equals `target_weight`
    pub fn from_target_weight(reference_distance: f64, target_weight: f64) -> Result<Self> {
        Self::new(solve_coefficient(reference_distance, target_weight)?)
    }

    /// Resolve a decay mode against the distance the target weight refers to
    pub fn from_mode(mode: DecayMode, reference_distance: f64) -> Result<Self> {
        match mode {
            DecayMode::UseCoefficient(c) => Self::new(c),
            DecayMode::UseTargetWeight(w) => Self::from_target_weight(reference_distance, w),
        }
    }

    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    pub fn weight(&self, distance: f64) -> f64 {
        gaussian_weight(distance, self.coefficient)
    }
}

/// Gaussian decay weight at `distance`
pub fn gaussian_weight(distance: f64, coefficient: f64) -> f64 {
    (-(distance * distance) / coefficient).exp()
}

/// Solve the coefficient such that `gaussian_weight(reference_distance, c) == target_weight`
///
/// Requires `reference_distance > 0` and `0 < target_weight < 1`; outside that
/// range `ln(target_weight) >= 0` and the coefficient is non-positive or undefined.
pub fn solve_coefficient(reference_distance: f64, target_weight: f64) -> Result<f64> {
    if !reference_distance.is_finite() || reference_distance <= 0.0 {
        return Err(Error::InvalidParameter(format!(
            "reference distance must be positive, got {reference_distance}"
        )));
    }
    if !(target_weight > 0.0 && target_weight < 1.0) {
        return Err(Error::InvalidParameter(format!(
            "target weight must lie strictly between 0 and 1, got {target_weight}"
        )));
    }
    Ok(-(reference_distance * reference_distance) / target_weight.ln())
}
