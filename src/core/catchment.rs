//! Catchment zones and thresholds
//!
//! E2SFCA splits the catchment into three nested bands `(0, d0]`, `(d0, d1]`,
//! `(d1, d2]`, each with one Gaussian weight evaluated at a representative
//! distance chosen by a [`BoundaryPolicy`]. V2SFCA uses a single threshold and
//! weights each pair continuously by its travel cost.

use std::fmt;
use std::str::FromStr;

use crate::core::decay::{DecayMode, GaussianDecay};
use crate::core::error::{normalize_choice, unsupported_choice, Error, Result};

/// Where inside each band the zone weight is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryPolicy {
    /// Outer edge of each band: `(d0, d1, d2)`
    Outside,
    /// Inner edge of each band: `(0, d0, d1)`
    Inside,
    /// Middle of each band: `(d0/2, (d0+d1)/2, (d1+d2)/2)`
    Midpoint,
}

impl FromStr for BoundaryPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_choice(s).as_str() {
            "outside" => Ok(BoundaryPolicy::Outside),
            "inside" => Ok(BoundaryPolicy::Inside),
            "midpoint" | "middle" => Ok(BoundaryPolicy::Midpoint),
            _ => Err(unsupported_choice(
                "boundary policy",
                s,
                &["outside", "inside", "midpoint"],
            )),
        }
    }
}

impl fmt::Display for BoundaryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoundaryPolicy::Outside => "OUTSIDE",
            BoundaryPolicy::Inside => "INSIDE",
            BoundaryPolicy::Midpoint => "MIDPOINT",
        };
        f.write_str(name)
    }
}

/// Outcome of assigning a travel cost to an E2SFCA band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    First,
    Second,
    Third,
    Unreachable,
}

impl Zone {
    fn index(self) -> Option<usize> {
        match self {
            Zone::First => Some(0),
            Zone::Second => Some(1),
            Zone::Third => Some(2),
            Zone::Unreachable => None,
        }
    }
}

/// Three sorted, distinct, positive band limits `d0 < d1 < d2`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoints([f64; 3]);

impl Breakpoints {
    /// Deduplicate and sort user distances; exactly three distinct values are required
    pub fn from_distances(distances: &[f64]) -> Result<Self> {
        if let Some(bad) = distances.iter().find(|d| !d.is_finite() || **d <= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "catchment distances must be positive numbers, got {bad}"
            )));
        }

        let mut sorted = distances.to_vec();
        sorted.sort_by(f64::total_cmp);
        sorted.dedup();

        match sorted.as_slice() {
            [d0, d1, d2] => Ok(Self([*d0, *d1, *d2])),
            other => Err(Error::InvalidParameter(format!(
                "E2SFCA needs exactly 3 distinct catchment distances, got {} ({:?})",
                other.len(),
                other
            ))),
        }
    }

    pub fn values(&self) -> [f64; 3] {
        self.0
    }

    /// Outermost limit, used as the routing cutoff
    pub fn outermost(&self) -> f64 {
        self.0[2]
    }

    /// Weighting distance of each band under `policy`
    pub fn representative(&self, policy: BoundaryPolicy) -> [f64; 3] {
        let [d0, d1, d2] = self.0;
        match policy {
            BoundaryPolicy::Outside => [d0, d1, d2],
            BoundaryPolicy::Inside => [0.0, d0, d1],
            BoundaryPolicy::Midpoint => [d0 / 2.0, (d0 + d1) / 2.0, (d1 + d2) / 2.0],
        }
    }
}

/// Fixed-zone (E2SFCA) weighting parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneCatchment {
    breakpoints: Breakpoints,
    policy: BoundaryPolicy,
    representative: [f64; 3],
    weights: [f64; 3],
    decay: GaussianDecay,
    include_zero_cost: bool,
}

impl ZoneCatchment {
    /// Derive zone weights from breakpoints, a boundary policy and a decay mode
    ///
    /// With a target weight the coefficient is solved at the third
    /// representative distance, and the third weight is the target itself.
    pub fn new(breakpoints: Breakpoints, policy: BoundaryPolicy, mode: DecayMode) -> Result<Self> {
        let representative = breakpoints.representative(policy);
        let [catch1, catch2, catch3] = representative;

        let (decay, weights) = match mode {
            DecayMode::UseCoefficient(c) => {
                let decay = GaussianDecay::new(c)?;
                let weights = [decay.weight(catch1), decay.weight(catch2), decay.weight(catch3)];
                (decay, weights)
            }
            DecayMode::UseTargetWeight(w) => {
                let decay = GaussianDecay::from_target_weight(catch3, w)?;
                (decay, [decay.weight(catch1), decay.weight(catch2), w])
            }
        };

        Ok(Self {
            breakpoints,
            policy,
            representative,
            weights,
            decay,
            include_zero_cost: false,
        })
    }

    /// Count zero-cost pairs (co-located points) as part of the first band
    pub fn with_zero_cost(mut self, include: bool) -> Self {
        self.include_zero_cost = include;
        self
    }

    /// Assign a travel cost to a band; limits are the breakpoints, whatever the policy
    pub fn zone_of(&self, travel_cost: f64) -> Zone {
        let [d0, d1, d2] = self.breakpoints.values();
        let t = travel_cost;
        let inner_ok = t > 0.0 || (self.include_zero_cost && t == 0.0);
        if inner_ok && t <= d0 {
            Zone::First
        } else if d0 < t && t <= d1 {
            Zone::Second
        } else if d1 < t && t <= d2 {
            Zone::Third
        } else {
            Zone::Unreachable
        }
    }

    pub fn weight_for(&self, travel_cost: f64) -> f64 {
        self.zone_of(travel_cost)
            .index()
            .map(|i| self.weights[i])
            .unwrap_or(0.0)
    }

    pub fn breakpoints(&self) -> Breakpoints {
        self.breakpoints
    }

    pub fn policy(&self) -> BoundaryPolicy {
        self.policy
    }

    pub fn representative(&self) -> [f64; 3] {
        self.representative
    }

    pub fn weights(&self) -> [f64; 3] {
        self.weights
    }

    pub fn coefficient(&self) -> f64 {
        self.decay.coefficient()
    }

    pub fn cutoff(&self) -> f64 {
        self.breakpoints.outermost()
    }
}

/// Variable-threshold (V2SFCA) weighting parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdCatchment {
    distance: f64,
    decay: GaussianDecay,
    include_zero_cost: bool,
}

impl ThresholdCatchment {
    /// With a target weight the coefficient is solved at the threshold itself
    pub fn new(distance: f64, mode: DecayMode) -> Result<Self> {
        if !distance.is_finite() || distance <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "V2SFCA distance threshold must be positive, got {distance}"
            )));
        }
        Ok(Self {
            distance,
            decay: GaussianDecay::from_mode(mode, distance)?,
            include_zero_cost: false,
        })
    }

    pub fn with_zero_cost(mut self, include: bool) -> Self {
        self.include_zero_cost = include;
        self
    }

    /// Continuous weight inside the threshold, zero outside
    pub fn weight_for(&self, travel_cost: f64) -> f64 {
        let t = travel_cost;
        let inner_ok = t > 0.0 || (self.include_zero_cost && t == 0.0);
        if inner_ok && t <= self.distance {
            self.decay.weight(t)
        } else {
            0.0
        }
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn coefficient(&self) -> f64 {
        self.decay.coefficient()
    }
}
