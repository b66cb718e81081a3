//! Volume resolution for supply and demand locations
//!
//! A volume is either read verbatim from an existing attribute or set to one
//! constant for every location of the class. Constants are written into the
//! attribute store once, before any scoring.

use std::str::FromStr;

use log::{debug, info};

use crate::core::error::{normalize_choice, unsupported_choice, Error, Result};
use crate::core::location::{missing_field_error, AttributeStore};

/// How a location class gets its volume
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeMode {
    /// Read the named attribute as-is
    FromField(String),
    /// Give every location the same value
    Constant(f64),
}

/// The bare choice, before its field or value is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeChoice {
    FromField,
    Constant,
}

impl FromStr for VolumeChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_choice(s).as_str() {
            "from_field" | "volume_from_field" | "field" => Ok(VolumeChoice::FromField),
            "constant" | "constant_volume_value" | "constant_value" => Ok(VolumeChoice::Constant),
            _ => Err(unsupported_choice("volume mode", s, &["from_field", "constant"])),
        }
    }
}

impl VolumeMode {
    /// Build a validated mode from a choice string and its companion parameter
    pub fn from_choice(choice: &str, field: Option<&str>, value: Option<f64>) -> Result<Self> {
        match choice.parse::<VolumeChoice>()? {
            VolumeChoice::FromField => match field.map(str::trim) {
                Some(name) if !name.is_empty() => Ok(VolumeMode::FromField(name.to_string())),
                _ => Err(Error::InvalidParameter(
                    "volume mode 'from_field' requires a field name".to_string(),
                )),
            },
            VolumeChoice::Constant => match value {
                Some(v) => {
                    check_volume(v, "constant volume")?;
                    Ok(VolumeMode::Constant(v))
                }
                None => Err(Error::InvalidParameter(
                    "volume mode 'constant' requires a value".to_string(),
                )),
            },
        }
    }
}

/// Resolves volumes for one location class against an attribute store
#[derive(Debug, Clone)]
pub struct VolumeResolver<'a> {
    mode: &'a VolumeMode,
    constant_field: &'a str,
}

impl<'a> VolumeResolver<'a> {
    /// `constant_field` is the attribute a constant volume is written to
    pub fn new(mode: &'a VolumeMode, constant_field: &'a str) -> Self {
        Self {
            mode,
            constant_field,
        }
    }

    /// Name of the attribute that holds volumes after resolution
    pub fn volume_field(&self) -> &str {
        match self.mode {
            VolumeMode::FromField(field) => field,
            VolumeMode::Constant(_) => self.constant_field,
        }
    }

    /// Resolve every location's volume, returned as `(id, volume)` in store order
    ///
    /// Read-only: constant volumes are reported here and written by
    /// [`VolumeResolver::write_constant`].
    pub fn resolve<S: AttributeStore>(&self, store: &S) -> Result<Vec<(String, f64)>> {
        let ids = store.ids();

        match self.mode {
            VolumeMode::FromField(field) => {
                if !store.has_field(field) {
                    return Err(missing_field_error("volume field", field, &store.field_names()));
                }
                debug!("Reading volumes from field '{field}' for {} locations", ids.len());
                ids.into_iter()
                    .map(|id| {
                        let volume = store.number(id, field).ok_or_else(|| {
                            Error::InvalidParameter(format!(
                                "location '{id}' has no numeric value in volume field '{field}'"
                            ))
                        })?;
                        check_volume(volume, &format!("volume of location '{id}'"))?;
                        Ok((id.to_string(), volume))
                    })
                    .collect()
            }
            VolumeMode::Constant(value) => Ok(ids
                .into_iter()
                .map(|id| (id.to_string(), *value))
                .collect()),
        }
    }

    /// Write a constant volume into its field on every location; no-op for `FromField`
    pub fn write_constant<S: AttributeStore>(&self, store: &mut S) -> Result<()> {
        let VolumeMode::Constant(value) = self.mode else {
            return Ok(());
        };
        let ids: Vec<String> = store.ids().into_iter().map(str::to_string).collect();
        info!(
            "Writing constant volume {value} to field '{}' on {} locations",
            self.constant_field,
            ids.len()
        );
        for id in &ids {
            store.set_number(id, self.constant_field, Some(*value))?;
        }
        Ok(())
    }
}

fn check_volume(value: f64, what: &str) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "{what} must be a non-negative number, got {value}"
        )))
    }
}
