//! End-to-end accessibility run
//!
//! Resolves volumes, asks the OD provider for the matrices the method
//! needs, scores, normalizes and writes the score fields back. Nothing is
//! written until volumes and routing have succeeded; score fields only
//! after the whole run has.

use log::{debug, info};

use crate::core::config::{AnalysisParameters, CatchmentParameters};
use crate::core::engine::{AccessibilityEngine, AccessibilityScores, StageCallback};
use crate::core::error::{Error, Result};
use crate::core::location::{AttributeStore, DemandLocation, SupplyLocation};
use crate::core::matrix::{Direction, OdMatrix, OdMatrixProvider, OdRequest};
use crate::core::normalize::SparOutcome;
use crate::core::summary::RunSummary;
use crate::core::volume::VolumeResolver;

/// Options for a run
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Called as the engine enters each stage
    pub progress: Option<StageCallback>,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    pub scores: AccessibilityScores,
    pub spar: SparOutcome,
    pub summary: RunSummary,
}

/// A configured run, reusable across location sets
pub struct Analysis<'p> {
    params: &'p AnalysisParameters,
    engine: AccessibilityEngine,
}

impl<'p> Analysis<'p> {
    pub fn new(params: &'p AnalysisParameters, options: RunOptions) -> Self {
        let mut engine = AccessibilityEngine::new(params.policy);
        if let Some(progress) = options.progress {
            engine = engine.with_progress(progress);
        }
        Self { params, engine }
    }

    pub fn run<S, D, P>(&self, supply: &mut S, demand: &mut D, provider: &P) -> Result<AnalysisOutput>
    where
        S: AttributeStore,
        D: AttributeStore,
        P: OdMatrixProvider + ?Sized,
    {
        let params = self.params;
        let fields = &params.fields;

        let supply_resolver = VolumeResolver::new(&params.supply_volume, &fields.supply_volume);
        let demand_resolver = VolumeResolver::new(&params.demand_volume, &fields.demand_volume);

        let supplies: Vec<SupplyLocation> = supply_resolver
            .resolve(&*supply)?
            .into_iter()
            .map(|(id, volume)| SupplyLocation {
                id,
                volume,
                multiplier: params.multiplier,
            })
            .collect();
        let demands: Vec<DemandLocation> = demand_resolver
            .resolve(&*demand)?
            .into_iter()
            .map(|(id, volume)| DemandLocation { id, volume })
            .collect();
        info!(
            "Scoring {} supply and {} demand locations with {}",
            supplies.len(),
            demands.len(),
            params.method()
        );

        let supply_ids: Vec<String> = supplies.iter().map(|s| s.id.clone()).collect();
        let demand_ids: Vec<String> = demands.iter().map(|d| d.id.clone()).collect();
        let cutoff = params.catchment.cutoff();

        // constants are written once routing has succeeded, before scoring
        let scores = match &params.catchment {
            CatchmentParameters::Zones(zones) => {
                let matrix = solve(
                    provider,
                    &supply_ids,
                    &demand_ids,
                    cutoff,
                    Direction::SupplyToDemand,
                )?;
                supply_resolver.write_constant(supply)?;
                demand_resolver.write_constant(demand)?;
                self.engine.e2sfca(&supplies, &demands, &matrix, zones)?
            }
            CatchmentParameters::Threshold(threshold) => {
                let forward = solve(
                    provider,
                    &supply_ids,
                    &demand_ids,
                    cutoff,
                    Direction::SupplyToDemand,
                )?;
                let backward = solve(
                    provider,
                    &demand_ids,
                    &supply_ids,
                    cutoff,
                    Direction::DemandToSupply,
                )?;
                supply_resolver.write_constant(supply)?;
                demand_resolver.write_constant(demand)?;
                self.engine
                    .v2sfca(&supplies, &demands, &forward, &backward, threshold)?
            }
        };

        let spar = params.normalizer.normalize(&scores.demand)?;
        let summary = RunSummary::new(params, &scores, &spar);

        for score in &scores.supply {
            supply.set_number(&score.id, &fields.step1_score, score.step1)?;
        }
        for score in &spar.scores {
            demand.set_number(&score.id, &fields.step2_score, Some(score.step2))?;
            demand.set_number(&score.id, &fields.spar, Some(score.spar))?;
        }

        for line in summary.report_lines() {
            info!("{line}");
        }

        Ok(AnalysisOutput {
            scores,
            spar,
            summary,
        })
    }
}

/// Ask the provider for one matrix; any provider failure is an upstream routing failure
fn solve<P: OdMatrixProvider + ?Sized>(
    provider: &P,
    origins: &[String],
    destinations: &[String],
    cutoff: f64,
    direction: Direction,
) -> Result<OdMatrix> {
    let request = OdRequest {
        origins,
        destinations,
        cutoff,
        direction,
    };
    let matrix = provider.solve(&request).map_err(|e| match e {
        Error::UpstreamRouting(_) => e,
        other => Error::UpstreamRouting(other.to_string()),
    })?;
    debug!("{direction:?} matrix: {} pairs within {cutoff}", matrix.len());
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AnalysisConfig;
    use crate::core::location::LocationTable;
    use crate::core::matrix::{OdPair, StaticMatrixProvider};

    struct FailingProvider;

    impl OdMatrixProvider for FailingProvider {
        fn solve(&self, _request: &OdRequest<'_>) -> Result<OdMatrix> {
            Err(Error::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "network dataset missing",
            )))
        }
    }

    fn params(method_block: &str) -> AnalysisParameters {
        let text = format!(
            "supply: {{ id_field: id, volume: {{ mode: from_field, field: beds }} }}
demand: {{ id_field: id, volume: {{ mode: constant, value: 100 }} }}
{method_block}"
        );
        AnalysisConfig::from_yaml_str(&text).unwrap().validate().unwrap()
    }

    fn params_with_volumes(supply: &str, demand: &str) -> AnalysisParameters {
        let text = format!(
            "method: e2sfca
supply: {{ id_field: id, volume: {supply} }}
demand: {{ id_field: id, volume: {demand} }}
decay: {{ mode: use_coefficient, coefficient: 50 }}
catchment: {{ distances: [5, 10, 15], boundary: outside }}
"
        );
        AnalysisConfig::from_yaml_str(&text).unwrap().validate().unwrap()
    }

    fn e2sfca() -> AnalysisParameters {
        params(
            "method: e2sfca
decay: { mode: use_coefficient, coefficient: 50 }
catchment: { distances: [5, 10, 15], boundary: outside }
",
        )
    }

    fn tables() -> (LocationTable, LocationTable) {
        let mut supply = LocationTable::new("id");
        supply.push("s", &[("beds", 10.0)]).unwrap();
        let mut demand = LocationTable::new("id");
        demand.push("d", &[]).unwrap();
        (supply, demand)
    }

    #[test]
    fn test_run_writes_scores_back() {
        let params = e2sfca();
        let (mut supply, mut demand) = tables();
        let provider = StaticMatrixProvider::new(vec![OdPair::new("s", "d", 7.0)]).unwrap();

        let output = Analysis::new(&params, RunOptions::default())
            .run(&mut supply, &mut demand, &provider)
            .unwrap();

        assert!((output.spar.scores[0].step2 - 0.1).abs() < 1e-12);
        assert_eq!(demand.number("d", "SPAR"), Some(1.0));
        assert_eq!(demand.number("d", "Demand_Vol"), Some(100.0));
        assert!((demand.number("d", "Step2_Score").unwrap() - 0.1).abs() < 1e-12);
        assert!(supply.number("s", "Step1_Score").unwrap() > 0.0);
        assert!(!supply.has_field("Supply_Vol"));
    }

    #[test]
    fn test_pairs_beyond_cutoff_are_dropped() {
        let params = e2sfca();
        let (mut supply, mut demand) = tables();
        demand.push("far", &[]).unwrap();
        let provider = StaticMatrixProvider::new(vec![
            OdPair::new("s", "d", 7.0),
            OdPair::new("s", "far", 15.5),
        ])
        .unwrap();

        let output = Analysis::new(&params, RunOptions::default())
            .run(&mut supply, &mut demand, &provider)
            .unwrap();
        assert_eq!(output.summary.unreached_demand, 1);
        assert_eq!(demand.number("far", "Step2_Score"), Some(0.0));
    }

    #[test]
    fn test_provider_failure_is_upstream_routing() {
        let params = e2sfca();
        let (mut supply, mut demand) = tables();
        let err = Analysis::new(&params, RunOptions::default())
            .run(&mut supply, &mut demand, &FailingProvider)
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamRouting(msg) if msg.contains("network dataset missing")));
        assert!(!demand.has_field("SPAR"));
    }

    #[test]
    fn test_failed_run_writes_no_scores() {
        let params = e2sfca();
        let (mut supply, mut demand) = tables();
        supply.push("isolated", &[("beds", 3.0)]).unwrap();
        let provider = StaticMatrixProvider::new(vec![OdPair::new("s", "d", 7.0)]).unwrap();

        let err = Analysis::new(&params, RunOptions::default())
            .run(&mut supply, &mut demand, &provider)
            .unwrap_err();
        assert!(matches!(err, Error::Aggregation(_)));
        assert!(!supply.has_field("Step1_Score"));
        assert!(!demand.has_field("Step2_Score"));
    }

    #[test]
    fn test_demand_volume_error_leaves_supply_untouched() {
        let params = params_with_volumes(
            "{ mode: constant, value: 1 }",
            "{ mode: from_field, field: pop }",
        );
        let mut supply = LocationTable::new("id");
        supply.push("s", &[]).unwrap();
        let mut demand = LocationTable::new("id");
        demand.push("d", &[("popp", 10.0)]).unwrap();
        let provider = StaticMatrixProvider::new(vec![OdPair::new("s", "d", 7.0)]).unwrap();

        let err = Analysis::new(&params, RunOptions::default())
            .run(&mut supply, &mut demand, &provider)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(msg) if msg.contains("did you mean 'popp'")));
        assert!(!supply.has_field("Supply_Vol"));
    }

    #[test]
    fn test_routing_failure_leaves_constants_unwritten() {
        let params = params_with_volumes(
            "{ mode: constant, value: 1 }",
            "{ mode: constant, value: 100 }",
        );
        let (mut supply, mut demand) = tables();
        let err = Analysis::new(&params, RunOptions::default())
            .run(&mut supply, &mut demand, &FailingProvider)
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamRouting(_)));
        assert!(!supply.has_field("Supply_Vol"));
        assert!(!demand.has_field("Demand_Vol"));
    }

    #[test]
    fn test_v2sfca_requests_both_directions() {
        let params = params(
            "method: v2sfca
decay: { mode: use_target_weight, target_weight: 0.5 }
catchment: { distance: 10 }
",
        );
        let (mut supply, mut demand) = tables();
        let provider = StaticMatrixProvider::new(vec![OdPair::new("s", "d", 10.0)])
            .unwrap()
            .with_reverse(vec![OdPair::new("d", "s", 5.0)])
            .unwrap();

        let output = Analysis::new(&params, RunOptions::default())
            .run(&mut supply, &mut demand, &provider)
            .unwrap();
        let step1 = output.scores.supply[0].step1.unwrap();
        assert!((step1 - 10.0 / (100.0 * 0.5)).abs() < 1e-12);
        assert!(output.scores.demand[0].step2 > 0.5 * step1);
        assert_eq!(output.summary.decay.target_weight, Some(0.5));
    }
}
