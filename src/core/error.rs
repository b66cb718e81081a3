//! Error types for butterfly-access library
//!
//! Provides the error kinds surfaced by configuration, routing input,
//! aggregation and normalization, plus fuzzy "did you mean" suggestions for
//! misspelled choices and field names.

use std::fmt;

use strsim::{jaro_winkler, normalized_levenshtein};
use thiserror::Error;

/// Why a supply location could not receive a Step-1 score
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The supply has no OD pairs at all
    NoReachableDemand,
    /// The supply has OD pairs, but every weighted demand is zero
    ZeroWeightedDemand,
}

/// A single per-supply Step-1 failure (zero aggregation denominator)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationFailure {
    pub supply_id: String,
    pub reason: FailureReason,
}

impl fmt::Display for AggregationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            FailureReason::NoReachableDemand => write!(
                f,
                "AggregationError: no reachable demand for supply {}",
                self.supply_id
            ),
            FailureReason::ZeroWeightedDemand => write!(
                f,
                "AggregationError: zero weighted demand in catchment of supply {}",
                self.supply_id
            ),
        }
    }
}

/// Main error type for butterfly-access operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing configuration
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// One or more supply locations have zero total weighted demand
    #[error("{}", format_failures(.0))]
    Aggregation(Vec<AggregationFailure>),

    /// SPAR normalization cannot proceed
    #[error("Division by zero: {0}")]
    DivisionByZero(String),

    /// The OD matrix provider failed to produce a usable matrix
    #[error("Upstream routing failure: {0}")]
    UpstreamRouting(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// CSV attribute store error
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Configuration file could not be parsed
    #[error("Configuration error: {0}")]
    ConfigError(#[from] serde_yaml::Error),
}

fn format_failures(failures: &[AggregationFailure]) -> String {
    let lines: Vec<String> = failures.iter().map(|f| f.to_string()).collect();
    match lines.len() {
        0 => "AggregationError: no failures recorded".to_string(),
        1 => lines[0].clone(),
        n => format!("{n} supply locations failed:\n  {}", lines.join("\n  ")),
    }
}

/// Convenience result type for butterfly-access operations
pub type Result<T> = std::result::Result<T, Error>;

/// Find the closest candidate to `input`, if any is close enough
///
/// Scores are 70% Jaro-Winkler plus 30% normalized Levenshtein, computed on
/// lowercase strings with spaces, dashes and underscores treated alike.
pub fn suggest_correction<S: AsRef<str>>(input: &str, candidates: &[S]) -> Option<String> {
    let min_threshold = 0.7;
    let needle = normalize_choice(input);
    if needle.is_empty() {
        return None;
    }

    let mut best_match = None;
    let mut best_score = 0.0f64;
    for candidate in candidates {
        let candidate = candidate.as_ref();
        let normalized = normalize_choice(candidate);
        if normalized == needle {
            return None;
        }
        let score = jaro_winkler(&needle, &normalized) * 0.7
            + normalized_levenshtein(&needle, &normalized) * 0.3;
        if score >= min_threshold && score > best_score {
            best_score = score;
            best_match = Some(candidate.to_string());
        }
    }

    best_match
}

/// Normalize a free-text choice: trim, lowercase, and fold spaces and dashes into underscores
pub fn normalize_choice(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Build an `InvalidParameter` for an unsupported choice, with a suggestion when one is close
pub fn unsupported_choice(kind: &str, value: &str, accepted: &[&str]) -> Error {
    if value.trim().is_empty() {
        return Error::InvalidParameter(format!(
            "{kind} is blank (expected one of: {})",
            accepted.join(", ")
        ));
    }
    match suggest_correction(value, accepted) {
        Some(suggestion) => Error::InvalidParameter(format!(
            "unsupported {kind} '{value}' (did you mean '{suggestion}'?)"
        )),
        None => Error::InvalidParameter(format!(
            "unsupported {kind} '{value}' (expected one of: {})",
            accepted.join(", ")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregation_failure_display() {
        let failure = AggregationFailure {
            supply_id: "H7".to_string(),
            reason: FailureReason::NoReachableDemand,
        };
        assert_eq!(
            failure.to_string(),
            "AggregationError: no reachable demand for supply H7"
        );
    }

    #[test]
    fn test_aggregation_error_lists_every_supply() {
        let err = Error::Aggregation(vec![
            AggregationFailure {
                supply_id: "a".to_string(),
                reason: FailureReason::NoReachableDemand,
            },
            AggregationFailure {
                supply_id: "b".to_string(),
                reason: FailureReason::ZeroWeightedDemand,
            },
        ]);
        let message = err.to_string();
        assert!(message.starts_with("2 supply locations failed"));
        assert!(message.contains("supply a"));
        assert!(message.contains("supply b"));
    }

    #[test]
    fn test_normalize_choice() {
        assert_eq!(normalize_choice("Use target weight"), "use_target_weight");
        assert_eq!(normalize_choice("  OUTSIDE "), "outside");
        assert_eq!(normalize_choice("from-field"), "from_field");
    }

    #[test]
    fn test_suggest_correction_typos() {
        let fields = ["Population", "Beds", "Name"];
        assert_eq!(
            suggest_correction("populaton", &fields),
            Some("Population".to_string())
        );
        assert_eq!(suggest_correction("bed", &fields), Some("Beds".to_string()));
    }

    #[test]
    fn test_suggest_correction_no_match() {
        let fields = ["Population", "Beds"];
        assert_eq!(suggest_correction("Population", &fields), None);
        assert_eq!(suggest_correction("zzzzzzzz", &fields), None);
        assert_eq!(suggest_correction("", &fields), None);
    }

    #[test]
    fn test_unsupported_choice_blank() {
        let err = unsupported_choice("volume mode", "  ", &["from_field", "constant"]);
        assert!(matches!(err, Error::InvalidParameter(msg) if msg.contains("blank")));
    }

    #[test]
    fn test_unsupported_choice_suggests() {
        let err = unsupported_choice("boundary policy", "outsde", &["outside", "inside", "midpoint"]);
        assert!(matches!(err, Error::InvalidParameter(msg) if msg.contains("did you mean 'outside'")));
    }
}
