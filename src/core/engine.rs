//! Two-step floating catchment aggregation
//!
//! Step 1 scores every supply by its volume over the weighted demand inside
//! its catchment; Step 2 sums the weighted Step-1 scores reachable from every
//! demand point. Both steps are per-entity reductions over an [`OdIndex`] and
//! run on the rayon pool. Step 2 starts only once every Step-1 score is known.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use log::{info, warn};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::catchment::{ThresholdCatchment, ZoneCatchment};
use crate::core::error::{
    normalize_choice, unsupported_choice, AggregationFailure, Error, FailureReason, Result,
};
use crate::core::location::{DemandLocation, SupplyLocation};
use crate::core::matrix::{OdIndex, OdMatrix};

/// What to do with supplies whose Step-1 denominator is zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnreachableSupplyPolicy {
    /// Abort the run, reporting every failing supply
    #[default]
    Fail,
    /// Leave failing supplies unscored and out of Step 2
    Exclude,
}

impl FromStr for UnreachableSupplyPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_choice(s).as_str() {
            "fail" | "abort" => Ok(UnreachableSupplyPolicy::Fail),
            "exclude" | "skip" => Ok(UnreachableSupplyPolicy::Exclude),
            _ => Err(unsupported_choice(
                "unreachable supply policy",
                s,
                &["fail", "exclude"],
            )),
        }
    }
}

/// Engine progress stages, reported to an optional callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    IndexingMatrix,
    FirstStepWeights,
    FirstStepScores,
    SecondStepWeights,
    SecondStepScores,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Stage::IndexingMatrix => "Indexing Origin-Destination Matrix...",
            Stage::FirstStepWeights => "First Step: Applying weights...",
            Stage::FirstStepScores => "First Step: Calculating scores...",
            Stage::SecondStepWeights => "Second Step: Applying weights...",
            Stage::SecondStepScores => "Second Step: Calculating scores...",
        };
        f.write_str(message)
    }
}

/// Stage callback type
pub type StageCallback = Arc<dyn Fn(Stage) + Send + Sync>;

/// Step-1 outcome for one supply; `None` when excluded
#[derive(Debug, Clone, PartialEq)]
pub struct SupplyScore {
    pub id: String,
    pub step1: Option<f64>,
}

/// Step-2 outcome for one demand point
#[derive(Debug, Clone, PartialEq)]
pub struct DemandScore {
    pub id: String,
    pub step2: f64,
    /// Pairs with positive weight to a scored supply
    pub reachable_supplies: usize,
}

/// Raw scores from one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccessibilityScores {
    pub supply: Vec<SupplyScore>,
    pub demand: Vec<DemandScore>,
    /// Supplies left unscored under [`UnreachableSupplyPolicy::Exclude`]
    pub excluded: Vec<AggregationFailure>,
}

/// Which end of a Step-2 pair is the demand point
#[derive(Clone, Copy)]
enum DemandEnd {
    /// Supply-to-demand matrix, shared with Step 1
    Destination,
    /// Separate demand-to-supply matrix
    Origin,
}

/// Two-step floating catchment engine
#[derive(Clone, Default)]
pub struct AccessibilityEngine {
    policy: UnreachableSupplyPolicy,
    progress: Option<StageCallback>,
}

impl fmt::Debug for AccessibilityEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessibilityEngine")
            .field("policy", &self.policy)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl AccessibilityEngine {
    pub fn new(policy: UnreachableSupplyPolicy) -> Self {
        Self {
            policy,
            progress: None,
        }
    }

    /// Report stages to `callback` as the run advances
    pub fn with_progress(mut self, callback: StageCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn policy(&self) -> UnreachableSupplyPolicy {
        self.policy
    }

    /// E2SFCA over one supply-to-demand matrix
    ///
    /// Zone weights are computed once per pair and the same values feed both
    /// steps. Step-1 scores are scaled by each supply's multiplier.
    pub fn e2sfca(
        &self,
        supplies: &[SupplyLocation],
        demands: &[DemandLocation],
        matrix: &OdMatrix,
        zones: &ZoneCatchment,
    ) -> Result<AccessibilityScores> {
        let supply_ids = checked_supply_ids(supplies)?;
        let demand_volumes = checked_demand_volumes(demands)?;
        let demand_ids: FxHashSet<&str> = demand_volumes.keys().copied().collect();

        self.report(Stage::IndexingMatrix);
        let index = OdIndex::build(matrix, &supply_ids, &demand_ids)?;

        self.report(Stage::FirstStepWeights);
        let weights: Vec<f64> = matrix
            .pairs()
            .par_iter()
            .map(|p| zones.weight_for(p.travel_cost))
            .collect();

        self.report(Stage::FirstStepScores);
        let (supply, excluded) = self.step1(supplies, &index, &weights, &demand_volumes, true)?;

        self.report(Stage::SecondStepWeights);
        let step1 = scored(&supply);

        self.report(Stage::SecondStepScores);
        let demand = step2(demands, &index, &weights, &step1, DemandEnd::Destination);

        Ok(AccessibilityScores {
            supply,
            demand,
            excluded,
        })
    }

    /// V2SFCA over two independently routed matrices
    ///
    /// `forward` runs supply to demand and feeds Step 1; `backward` runs
    /// demand to supply and feeds Step 2. Multipliers are ignored.
    pub fn v2sfca(
        &self,
        supplies: &[SupplyLocation],
        demands: &[DemandLocation],
        forward: &OdMatrix,
        backward: &OdMatrix,
        threshold: &ThresholdCatchment,
    ) -> Result<AccessibilityScores> {
        let supply_ids = checked_supply_ids(supplies)?;
        let demand_volumes = checked_demand_volumes(demands)?;
        let demand_ids: FxHashSet<&str> = demand_volumes.keys().copied().collect();

        self.report(Stage::IndexingMatrix);
        let forward_index = OdIndex::build(forward, &supply_ids, &demand_ids)?;
        let backward_index = OdIndex::build(backward, &demand_ids, &supply_ids)?;

        self.report(Stage::FirstStepWeights);
        let forward_weights = continuous_weights(forward, threshold);

        self.report(Stage::FirstStepScores);
        let (supply, excluded) =
            self.step1(supplies, &forward_index, &forward_weights, &demand_volumes, false)?;

        self.report(Stage::SecondStepWeights);
        let backward_weights = continuous_weights(backward, threshold);
        let step1 = scored(&supply);

        self.report(Stage::SecondStepScores);
        let demand = step2(
            demands,
            &backward_index,
            &backward_weights,
            &step1,
            DemandEnd::Origin,
        );

        Ok(AccessibilityScores {
            supply,
            demand,
            excluded,
        })
    }

    fn report(&self, stage: Stage) {
        info!("{stage}");
        if let Some(callback) = &self.progress {
            callback(stage);
        }
    }

    /// Per-supply reduction over pairs leaving the supply
    ///
    /// Failures are gathered for every supply before the policy is applied.
    fn step1(
        &self,
        supplies: &[SupplyLocation],
        index: &OdIndex<'_>,
        weights: &[f64],
        demand_volumes: &FxHashMap<&str, f64>,
        apply_multiplier: bool,
    ) -> Result<(Vec<SupplyScore>, Vec<AggregationFailure>)> {
        let outcomes: Vec<std::result::Result<f64, FailureReason>> = supplies
            .par_iter()
            .map(|supply| {
                let pairs = index.from_origin(&supply.id);
                if pairs.is_empty() {
                    return Err(FailureReason::NoReachableDemand);
                }
                let weighted_demand: f64 = pairs
                    .iter()
                    .map(|&i| {
                        let volume = demand_volumes
                            .get(index.pair(i).destination.as_str())
                            .copied()
                            .unwrap_or(0.0);
                        volume * weights[i]
                    })
                    .sum();
                if weighted_demand <= 0.0 {
                    return Err(FailureReason::ZeroWeightedDemand);
                }
                let multiplier = if apply_multiplier { supply.multiplier } else { 1.0 };
                Ok(multiplier * supply.volume / weighted_demand)
            })
            .collect();

        let mut scores = Vec::with_capacity(supplies.len());
        let mut failures = Vec::new();
        for (supply, outcome) in supplies.iter().zip(outcomes) {
            match outcome {
                Ok(score) => scores.push(SupplyScore {
                    id: supply.id.clone(),
                    step1: Some(score),
                }),
                Err(reason) => {
                    failures.push(AggregationFailure {
                        supply_id: supply.id.clone(),
                        reason,
                    });
                    scores.push(SupplyScore {
                        id: supply.id.clone(),
                        step1: None,
                    });
                }
            }
        }

        if failures.is_empty() {
            return Ok((scores, failures));
        }
        match self.policy {
            UnreachableSupplyPolicy::Fail => Err(Error::Aggregation(failures)),
            UnreachableSupplyPolicy::Exclude => {
                for failure in &failures {
                    warn!("{failure} (excluded from Step 2)");
                }
                Ok((scores, failures))
            }
        }
    }
}

/// Per-demand reduction; demand points without pairs score exactly 0
fn step2(
    demands: &[DemandLocation],
    index: &OdIndex<'_>,
    weights: &[f64],
    step1: &FxHashMap<&str, f64>,
    end: DemandEnd,
) -> Vec<DemandScore> {
    demands
        .par_iter()
        .map(|demand| {
            let pairs = match end {
                DemandEnd::Destination => index.to_destination(&demand.id),
                DemandEnd::Origin => index.from_origin(&demand.id),
            };
            let mut total = 0.0;
            let mut reachable = 0;
            for &i in pairs {
                let pair = index.pair(i);
                let supply_id = match end {
                    DemandEnd::Destination => pair.origin.as_str(),
                    DemandEnd::Origin => pair.destination.as_str(),
                };
                if let Some(score) = step1.get(supply_id) {
                    total += weights[i] * score;
                    if weights[i] > 0.0 {
                        reachable += 1;
                    }
                }
            }
            DemandScore {
                id: demand.id.clone(),
                step2: total,
                reachable_supplies: reachable,
            }
        })
        .collect()
}

fn continuous_weights(matrix: &OdMatrix, threshold: &ThresholdCatchment) -> Vec<f64> {
    matrix
        .pairs()
        .par_iter()
        .map(|p| threshold.weight_for(p.travel_cost))
        .collect()
}

fn scored(scores: &[SupplyScore]) -> FxHashMap<&str, f64> {
    scores
        .iter()
        .filter_map(|s| s.step1.map(|v| (s.id.as_str(), v)))
        .collect()
}

fn checked_supply_ids(supplies: &[SupplyLocation]) -> Result<FxHashSet<&str>> {
    let mut ids = FxHashSet::default();
    for supply in supplies {
        if !(supply.volume.is_finite() && supply.volume >= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "supply '{}' has invalid volume {}",
                supply.id, supply.volume
            )));
        }
        if !(supply.multiplier.is_finite() && supply.multiplier >= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "supply '{}' has invalid multiplier {}",
                supply.id, supply.multiplier
            )));
        }
        if !ids.insert(supply.id.as_str()) {
            return Err(Error::InvalidParameter(format!(
                "duplicate supply id '{}'",
                supply.id
            )));
        }
    }
    Ok(ids)
}

fn checked_demand_volumes(demands: &[DemandLocation]) -> Result<FxHashMap<&str, f64>> {
    let mut volumes = FxHashMap::default();
    for demand in demands {
        if !(demand.volume.is_finite() && demand.volume >= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "demand '{}' has invalid volume {}",
                demand.id, demand.volume
            )));
        }
        if volumes.insert(demand.id.as_str(), demand.volume).is_some() {
            return Err(Error::InvalidParameter(format!(
                "duplicate demand id '{}'",
                demand.id
            )));
        }
    }
    Ok(volumes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catchment::{BoundaryPolicy, Breakpoints};
    use crate::core::decay::DecayMode;
    use crate::core::matrix::OdPair;
    use std::sync::Mutex;

    fn supply(id: &str, volume: f64) -> SupplyLocation {
        SupplyLocation {
            id: id.to_string(),
            volume,
            multiplier: 1.0,
        }
    }

    fn demand(id: &str, volume: f64) -> DemandLocation {
        DemandLocation {
            id: id.to_string(),
            volume,
        }
    }

    fn zones() -> ZoneCatchment {
        ZoneCatchment::new(
            Breakpoints::from_distances(&[5.0, 10.0, 15.0]).unwrap(),
            BoundaryPolicy::Outside,
            DecayMode::UseCoefficient(50.0),
        )
        .unwrap()
    }

    fn matrix(pairs: &[(&str, &str, f64)]) -> OdMatrix {
        OdMatrix::new(pairs.iter().map(|(o, d, c)| OdPair::new(o, d, *c)).collect()).unwrap()
    }

    #[test]
    fn test_e2sfca_single_pair() {
        let scores = AccessibilityEngine::default()
            .e2sfca(
                &[supply("s", 10.0)],
                &[demand("d", 100.0)],
                &matrix(&[("s", "d", 7.0)]),
                &zones(),
            )
            .unwrap();

        let w = (-2.0f64).exp();
        let step1 = scores.supply[0].step1.unwrap();
        assert!((step1 - 10.0 / (100.0 * w)).abs() < 1e-12);
        assert!((scores.demand[0].step2 - 0.1).abs() < 1e-12);
        assert_eq!(scores.demand[0].reachable_supplies, 1);
    }

    #[test]
    fn test_e2sfca_competition_between_demands() {
        // d1 in zone 1, d2 in zone 3 of the same supply
        let scores = AccessibilityEngine::default()
            .e2sfca(
                &[supply("s", 50.0)],
                &[demand("d1", 100.0), demand("d2", 100.0)],
                &matrix(&[("s", "d1", 3.0), ("s", "d2", 12.0)]),
                &zones(),
            )
            .unwrap();

        let [w1, _, w3] = zones().weights();
        let step1 = 50.0 / (100.0 * w1 + 100.0 * w3);
        assert!((scores.supply[0].step1.unwrap() - step1).abs() < 1e-12);
        assert!((scores.demand[0].step2 - w1 * step1).abs() < 1e-12);
        assert!((scores.demand[1].step2 - w3 * step1).abs() < 1e-12);
        assert!(scores.demand[0].step2 > scores.demand[1].step2);
    }

    #[test]
    fn test_e2sfca_applies_multiplier() {
        let plain = AccessibilityEngine::default()
            .e2sfca(
                &[supply("s", 10.0)],
                &[demand("d", 100.0)],
                &matrix(&[("s", "d", 7.0)]),
                &zones(),
            )
            .unwrap();
        let mut boosted_supply = supply("s", 10.0);
        boosted_supply.multiplier = 1000.0;
        let boosted = AccessibilityEngine::default()
            .e2sfca(
                &[boosted_supply],
                &[demand("d", 100.0)],
                &matrix(&[("s", "d", 7.0)]),
                &zones(),
            )
            .unwrap();
        let ratio = boosted.demand[0].step2 / plain.demand[0].step2;
        assert!((ratio - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_unreached_demand_scores_zero() {
        let scores = AccessibilityEngine::default()
            .e2sfca(
                &[supply("s", 10.0)],
                &[demand("near", 100.0), demand("far", 100.0), demand("nowhere", 5.0)],
                &matrix(&[("s", "near", 2.0), ("s", "far", 40.0)]),
                &zones(),
            )
            .unwrap();
        assert!(scores.demand[0].step2 > 0.0);
        assert_eq!(scores.demand[1].step2, 0.0);
        assert_eq!(scores.demand[1].reachable_supplies, 0);
        assert_eq!(scores.demand[2].step2, 0.0);
    }

    #[test]
    fn test_isolated_supply_fails_with_every_id() {
        let err = AccessibilityEngine::default()
            .e2sfca(
                &[supply("ok", 1.0), supply("lonely", 1.0), supply("empty", 1.0)],
                &[demand("d", 10.0), demand("ghost_town", 0.0)],
                &matrix(&[("ok", "d", 1.0), ("empty", "ghost_town", 1.0)]),
                &zones(),
            )
            .unwrap_err();
        match err {
            Error::Aggregation(failures) => {
                assert_eq!(
                    failures,
                    vec![
                        AggregationFailure {
                            supply_id: "lonely".to_string(),
                            reason: FailureReason::NoReachableDemand,
                        },
                        AggregationFailure {
                            supply_id: "empty".to_string(),
                            reason: FailureReason::ZeroWeightedDemand,
                        },
                    ]
                );
            }
            other => panic!("expected aggregation error, got {other:?}"),
        }
    }

    #[test]
    fn test_exclude_policy_drops_failed_supplies() {
        let scores = AccessibilityEngine::new(UnreachableSupplyPolicy::Exclude)
            .e2sfca(
                &[supply("ok", 1.0), supply("lonely", 1.0)],
                &[demand("d", 10.0)],
                &matrix(&[("ok", "d", 1.0)]),
                &zones(),
            )
            .unwrap();
        assert_eq!(scores.supply[1].step1, None);
        assert_eq!(scores.excluded.len(), 1);
        assert_eq!(scores.excluded[0].supply_id, "lonely");
        assert!(scores.demand[0].step2 > 0.0);
    }

    #[test]
    fn test_v2sfca_uses_backward_matrix_for_step2() {
        let threshold = ThresholdCatchment::new(10.0, DecayMode::UseTargetWeight(0.5)).unwrap();
        let forward = matrix(&[("s", "d", 10.0)]);
        // asymmetric network: the way back is shorter
        let backward = matrix(&[("d", "s", 5.0)]);

        let scores = AccessibilityEngine::default()
            .v2sfca(&[supply("s", 4.0)], &[demand("d", 8.0)], &forward, &backward, &threshold)
            .unwrap();

        let step1 = 4.0 / (8.0 * 0.5);
        assert!((scores.supply[0].step1.unwrap() - step1).abs() < 1e-9);
        let expected = threshold.weight_for(5.0) * step1;
        assert!((scores.demand[0].step2 - expected).abs() < 1e-9);
    }

    #[test]
    fn test_v2sfca_isolated_supply_fails() {
        let threshold = ThresholdCatchment::new(10.0, DecayMode::UseCoefficient(100.0)).unwrap();
        let forward = matrix(&[("s", "d", 3.0)]);
        let err = AccessibilityEngine::default()
            .v2sfca(
                &[supply("s", 4.0), supply("lonely", 2.0)],
                &[demand("d", 8.0)],
                &forward,
                &forward.transposed(),
                &threshold,
            )
            .unwrap_err();
        match err {
            Error::Aggregation(failures) => {
                assert_eq!(
                    failures,
                    vec![AggregationFailure {
                        supply_id: "lonely".to_string(),
                        reason: FailureReason::NoReachableDemand,
                    }]
                );
            }
            other => panic!("expected aggregation error, got {other:?}"),
        }
    }

    #[test]
    fn test_v2sfca_ignores_multiplier() {
        let threshold = ThresholdCatchment::new(10.0, DecayMode::UseCoefficient(100.0)).unwrap();
        let forward = matrix(&[("s", "d", 3.0)]);
        let mut s = supply("s", 4.0);
        s.multiplier = 7.0;
        let scores = AccessibilityEngine::default()
            .v2sfca(&[s], &[demand("d", 8.0)], &forward, &forward.transposed(), &threshold)
            .unwrap();
        let w = threshold.weight_for(3.0);
        assert!((scores.supply[0].step1.unwrap() - 4.0 / (8.0 * w)).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_locations_rejected() {
        let engine = AccessibilityEngine::default();
        let m = matrix(&[("s", "d", 1.0)]);
        assert!(matches!(
            engine.e2sfca(&[supply("s", -1.0)], &[demand("d", 1.0)], &m, &zones()),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            engine.e2sfca(&[supply("s", 1.0)], &[demand("d", 1.0), demand("d", 2.0)], &m, &zones()),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_progress_reports_stages_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let engine = AccessibilityEngine::default().with_progress(Arc::new(move |stage: Stage| {
            sink.lock().unwrap().push(stage);
        }));
        engine
            .e2sfca(
                &[supply("s", 1.0)],
                &[demand("d", 1.0)],
                &matrix(&[("s", "d", 1.0)]),
                &zones(),
            )
            .unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Stage::IndexingMatrix,
                Stage::FirstStepWeights,
                Stage::FirstStepScores,
                Stage::SecondStepWeights,
                Stage::SecondStepScores,
            ]
        );
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "Exclude".parse::<UnreachableSupplyPolicy>().unwrap(),
            UnreachableSupplyPolicy::Exclude
        );
        assert!("ignore".parse::<UnreachableSupplyPolicy>().is_err());
    }
}
