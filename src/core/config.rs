//! Analysis configuration
//!
//! A YAML document is deserialized into [`AnalysisConfig`], whose choice
//! strings are free text, and validated once into [`AnalysisParameters`],
//! whose choices are closed enums. Nothing downstream re-parses text.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::catchment::{BoundaryPolicy, Breakpoints, ThresholdCatchment, ZoneCatchment};
use crate::core::decay::DecayMode;
use crate::core::engine::UnreachableSupplyPolicy;
use crate::core::error::{normalize_choice, unsupported_choice, Error, Result};
use crate::core::normalize::{SparNormalizer, DEFAULT_SPAR_TOLERANCE};
use crate::core::volume::VolumeMode;

/// Accessibility method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Three fixed zones, one shared OD matrix
    E2sfca,
    /// One threshold, continuous decay, one OD matrix per direction
    V2sfca,
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_choice(s).as_str() {
            "e2sfca" | "enhanced" => Ok(Method::E2sfca),
            "v2sfca" | "variable" => Ok(Method::V2sfca),
            _ => Err(unsupported_choice("method", s, &["e2sfca", "v2sfca"])),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::E2sfca => f.write_str("E2SFCA"),
            Method::V2sfca => f.write_str("V2SFCA"),
        }
    }
}

/// Attribute names written by a run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldNames {
    /// Holds a constant supply volume
    pub supply_volume: String,
    /// Holds a constant demand volume
    pub demand_volume: String,
    pub step1_score: String,
    pub step2_score: String,
    pub spar: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            supply_volume: "Supply_Vol".to_string(),
            demand_volume: "Demand_Vol".to_string(),
            step1_score: "Step1_Score".to_string(),
            step2_score: "Step2_Score".to_string(),
            spar: "SPAR".to_string(),
        }
    }
}

impl FieldNames {
    fn validate(&self) -> Result<()> {
        let names = [
            &self.supply_volume,
            &self.demand_volume,
            &self.step1_score,
            &self.step2_score,
            &self.spar,
        ];
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err(Error::InvalidParameter(
                "output field names must not be blank".to_string(),
            ));
        }
        // supply and demand fields live in different tables
        let demand_side = [&self.demand_volume, &self.step2_score, &self.spar];
        for (i, a) in demand_side.iter().enumerate() {
            if demand_side[i + 1..].contains(a) {
                return Err(Error::InvalidParameter(format!(
                    "output field name '{a}' is used twice"
                )));
            }
        }
        if self.supply_volume == self.step1_score {
            return Err(Error::InvalidParameter(format!(
                "output field name '{}' is used twice",
                self.step1_score
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeConfig {
    pub mode: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationConfig {
    pub id_field: String,
    pub volume: VolumeConfig,
    /// E2SFCA supply only
    #[serde(default)]
    pub multiplier: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecayConfig {
    pub mode: String,
    #[serde(default)]
    pub coefficient: Option<f64>,
    #[serde(default)]
    pub target_weight: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatchmentConfig {
    /// E2SFCA zone limits
    #[serde(default)]
    pub distances: Option<Vec<f64>>,
    /// E2SFCA boundary policy
    #[serde(default)]
    pub boundary: Option<String>,
    /// V2SFCA threshold
    #[serde(default)]
    pub distance: Option<f64>,
}

fn default_spar_tolerance() -> f64 {
    DEFAULT_SPAR_TOLERANCE
}

/// Raw configuration as written by the user
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    pub method: String,
    pub supply: LocationConfig,
    pub demand: LocationConfig,
    pub decay: DecayConfig,
    #[serde(default)]
    pub catchment: CatchmentConfig,
    /// Count zero-cost pairs as inside the catchment
    #[serde(default)]
    pub include_zero_cost: bool,
    #[serde(default = "default_spar_tolerance")]
    pub spar_tolerance: f64,
    #[serde(default)]
    pub on_unreachable_supply: Option<String>,
    #[serde(default)]
    pub fields: FieldNames,
}

/// Validated weighting parameters for either method
#[derive(Debug, Clone, PartialEq)]
pub enum CatchmentParameters {
    Zones(ZoneCatchment),
    Threshold(ThresholdCatchment),
}

impl CatchmentParameters {
    pub fn method(&self) -> Method {
        match self {
            CatchmentParameters::Zones(_) => Method::E2sfca,
            CatchmentParameters::Threshold(_) => Method::V2sfca,
        }
    }

    /// Routing cutoff: outermost zone limit or the threshold
    pub fn cutoff(&self) -> f64 {
        match self {
            CatchmentParameters::Zones(zones) => zones.cutoff(),
            CatchmentParameters::Threshold(threshold) => threshold.distance(),
        }
    }

    pub fn coefficient(&self) -> f64 {
        match self {
            CatchmentParameters::Zones(zones) => zones.coefficient(),
            CatchmentParameters::Threshold(threshold) => threshold.coefficient(),
        }
    }
}

/// Fully validated parameters for one run
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisParameters {
    pub supply_id_field: String,
    pub demand_id_field: String,
    pub supply_volume: VolumeMode,
    pub demand_volume: VolumeMode,
    /// Uniform Step-1 multiplier; always 1.0 for V2SFCA
    pub multiplier: f64,
    pub decay_mode: DecayMode,
    pub catchment: CatchmentParameters,
    pub policy: UnreachableSupplyPolicy,
    pub normalizer: SparNormalizer,
    pub fields: FieldNames,
}

impl AnalysisParameters {
    pub fn method(&self) -> Method {
        self.catchment.method()
    }
}

impl AnalysisConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Validate every choice and value; nothing is read from location data here
    pub fn validate(&self) -> Result<AnalysisParameters> {
        let method: Method = self.method.parse()?;

        let supply_id_field = required_name(&self.supply.id_field, "supply.id_field")?;
        let demand_id_field = required_name(&self.demand.id_field, "demand.id_field")?;
        let supply_volume = volume_mode(&self.supply.volume)?;
        let demand_volume = volume_mode(&self.demand.volume)?;
        if self.demand.multiplier.is_some() {
            return Err(Error::InvalidParameter(
                "multiplier applies to supply locations only".to_string(),
            ));
        }

        let multiplier = match (method, self.supply.multiplier) {
            (_, None) => 1.0,
            (Method::E2sfca, Some(m)) if m.is_finite() && m >= 0.0 => m,
            (Method::E2sfca, Some(m)) => {
                return Err(Error::InvalidParameter(format!(
                    "supply multiplier must be a non-negative number, got {m}"
                )))
            }
            (Method::V2sfca, Some(_)) => {
                return Err(Error::InvalidParameter(
                    "supply multiplier is only supported by E2SFCA".to_string(),
                ))
            }
        };

        let decay_mode = decay_mode(&self.decay)?;
        let catchment = match method {
            Method::E2sfca => CatchmentParameters::Zones(self.zone_catchment(decay_mode)?),
            Method::V2sfca => {
                CatchmentParameters::Threshold(self.threshold_catchment(decay_mode)?)
            }
        };

        let policy = match &self.on_unreachable_supply {
            Some(choice) => choice.parse()?,
            None => UnreachableSupplyPolicy::default(),
        };

        self.fields.validate()?;

        Ok(AnalysisParameters {
            supply_id_field,
            demand_id_field,
            supply_volume,
            demand_volume,
            multiplier,
            decay_mode,
            catchment,
            policy,
            normalizer: SparNormalizer::new(self.spar_tolerance)?,
            fields: self.fields.clone(),
        })
    }

    fn zone_catchment(&self, mode: DecayMode) -> Result<ZoneCatchment> {
        let config = &self.catchment;
        if config.distance.is_some() {
            return Err(Error::InvalidParameter(
                "catchment.distance is a V2SFCA setting; E2SFCA uses catchment.distances".to_string(),
            ));
        }
        let distances = config.distances.as_deref().ok_or_else(|| {
            Error::InvalidParameter("E2SFCA requires catchment.distances (3 values)".to_string())
        })?;
        let boundary: BoundaryPolicy = config
            .boundary
            .as_deref()
            .ok_or_else(|| {
                Error::InvalidParameter(
                    "E2SFCA requires catchment.boundary (outside, inside or midpoint)".to_string(),
                )
            })?
            .parse()?;

        let zones = ZoneCatchment::new(Breakpoints::from_distances(distances)?, boundary, mode)?;
        Ok(zones.with_zero_cost(self.include_zero_cost))
    }

    fn threshold_catchment(&self, mode: DecayMode) -> Result<ThresholdCatchment> {
        let config = &self.catchment;
        if config.distances.is_some() || config.boundary.is_some() {
            return Err(Error::InvalidParameter(
                "catchment.distances and catchment.boundary are E2SFCA settings; V2SFCA uses catchment.distance"
                    .to_string(),
            ));
        }
        let distance = config.distance.ok_or_else(|| {
            Error::InvalidParameter("V2SFCA requires catchment.distance".to_string())
        })?;
        Ok(ThresholdCatchment::new(distance, mode)?.with_zero_cost(self.include_zero_cost))
    }
}

fn required_name(value: &str, what: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::InvalidParameter(format!("{what} must not be blank")))
    } else {
        Ok(trimmed.to_string())
    }
}

fn volume_mode(config: &VolumeConfig) -> Result<VolumeMode> {
    VolumeMode::from_choice(&config.mode, config.field.as_deref(), config.value)
}

fn decay_mode(config: &DecayConfig) -> Result<DecayMode> {
    match normalize_choice(&config.mode).as_str() {
        "use_coefficient" | "coefficient" => config
            .coefficient
            .map(DecayMode::UseCoefficient)
            .ok_or_else(|| {
                Error::InvalidParameter("decay mode 'use_coefficient' requires decay.coefficient".to_string())
            }),
        "use_target_weight" | "target_weight" => config
            .target_weight
            .map(DecayMode::UseTargetWeight)
            .ok_or_else(|| {
                Error::InvalidParameter(
                    "decay mode 'use_target_weight' requires decay.target_weight".to_string(),
                )
            }),
        _ => Err(unsupported_choice(
            "decay mode",
            &config.mode,
            &["use_coefficient", "use_target_weight"],
        )),
    }
}
