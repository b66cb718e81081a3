//! Origin-destination cost matrices
//!
//! The routing solver that produces travel costs is an external
//! collaborator; this module defines its contract ([`OdMatrixProvider`]),
//! two providers (precomputed CSV tables and in-memory pairs) and the
//! origin/destination index the engine aggregates over.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;

use crate::core::error::{Error, Result};

/// One reachable origin-destination pair
#[derive(Debug, Clone, PartialEq)]
pub struct OdPair {
    pub origin: String,
    pub destination: String,
    pub travel_cost: f64,
}

impl OdPair {
    pub fn new(origin: &str, destination: &str, travel_cost: f64) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            travel_cost,
        }
    }
}

/// Which way the solver routes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    SupplyToDemand,
    DemandToSupply,
}

/// A request to the routing collaborator
#[derive(Debug, Clone)]
pub struct OdRequest<'a> {
    pub origins: &'a [String],
    pub destinations: &'a [String],
    /// Pairs costing more than this are left out
    pub cutoff: f64,
    pub direction: Direction,
}

/// Pairs within cutoff; absent pairs are unreachable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OdMatrix {
    pairs: Vec<OdPair>,
}

impl OdMatrix {
    /// Build a matrix, rejecting negative or non-finite costs
    pub fn new(pairs: Vec<OdPair>) -> Result<Self> {
        if let Some(bad) = pairs
            .iter()
            .find(|p| !p.travel_cost.is_finite() || p.travel_cost < 0.0)
        {
            return Err(Error::UpstreamRouting(format!(
                "invalid travel cost {} for pair {} -> {}",
                bad.travel_cost, bad.origin, bad.destination
            )));
        }
        Ok(Self { pairs })
    }

    pub fn pairs(&self) -> &[OdPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Swap origin and destination on every pair
    pub fn transposed(&self) -> Self {
        Self {
            pairs: self
                .pairs
                .iter()
                .map(|p| OdPair::new(&p.destination, &p.origin, p.travel_cost))
                .collect(),
        }
    }

    /// Keep only pairs whose endpoints were requested and whose cost is within cutoff
    pub fn restricted_to(&self, request: &OdRequest<'_>) -> Self {
        let origins: FxHashSet<&str> = request.origins.iter().map(String::as_str).collect();
        let destinations: FxHashSet<&str> =
            request.destinations.iter().map(String::as_str).collect();
        Self {
            pairs: self
                .pairs
                .iter()
                .filter(|p| {
                    p.travel_cost <= request.cutoff
                        && origins.contains(p.origin.as_str())
                        && destinations.contains(p.destination.as_str())
                })
                .cloned()
                .collect(),
        }
    }
}

/// The routing collaborator: turns a request into an OD matrix
///
/// Failures are reported as [`Error::UpstreamRouting`]; there is no retry.
pub trait OdMatrixProvider {
    fn solve(&self, request: &OdRequest<'_>) -> Result<OdMatrix>;
}

/// Pair indices grouped by origin and by destination
///
/// Built in one pass over the matrix, so each per-entity reduction only
/// touches its own pairs.
#[derive(Debug)]
pub struct OdIndex<'m> {
    matrix: &'m OdMatrix,
    by_origin: FxHashMap<&'m str, Vec<usize>>,
    by_destination: FxHashMap<&'m str, Vec<usize>>,
}

impl<'m> OdIndex<'m> {
    /// Index `matrix`, checking that every endpoint is a known location
    pub fn build(
        matrix: &'m OdMatrix,
        known_origins: &FxHashSet<&str>,
        known_destinations: &FxHashSet<&str>,
    ) -> Result<Self> {
        let mut by_origin: FxHashMap<&'m str, Vec<usize>> = FxHashMap::default();
        let mut by_destination: FxHashMap<&'m str, Vec<usize>> = FxHashMap::default();

        for (i, pair) in matrix.pairs().iter().enumerate() {
            if !known_origins.contains(pair.origin.as_str()) {
                return Err(Error::UpstreamRouting(format!(
                    "OD pair references unknown origin '{}'",
                    pair.origin
                )));
            }
            if !known_destinations.contains(pair.destination.as_str()) {
                return Err(Error::UpstreamRouting(format!(
                    "OD pair references unknown destination '{}'",
                    pair.destination
                )));
            }
            by_origin.entry(pair.origin.as_str()).or_default().push(i);
            by_destination.entry(pair.destination.as_str()).or_default().push(i);
        }

        debug!(
            "Indexed {} OD pairs: {} origins, {} destinations",
            matrix.len(),
            by_origin.len(),
            by_destination.len()
        );

        Ok(Self {
            matrix,
            by_origin,
            by_destination,
        })
    }

    pub fn matrix(&self) -> &'m OdMatrix {
        self.matrix
    }

    /// Indices of pairs leaving `origin`
    pub fn from_origin(&self, origin: &str) -> &[usize] {
        self.by_origin.get(origin).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Indices of pairs arriving at `destination`
    pub fn to_destination(&self, destination: &str) -> &[usize] {
        self.by_destination
            .get(destination)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn pair(&self, index: usize) -> &'m OdPair {
        &self.matrix.pairs[index]
    }
}

/// Serves requests from pairs held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticMatrixProvider {
    forward: OdMatrix,
    reverse: Option<OdMatrix>,
}

impl StaticMatrixProvider {
    /// Supply-to-demand pairs; reverse requests are served by transposition
    pub fn new(forward: Vec<OdPair>) -> Result<Self> {
        Ok(Self {
            forward: OdMatrix::new(forward)?,
            reverse: None,
        })
    }

    /// Separate demand-to-supply pairs, for directionally asymmetric networks
    pub fn with_reverse(mut self, reverse: Vec<OdPair>) -> Result<Self> {
        self.reverse = Some(OdMatrix::new(reverse)?);
        Ok(self)
    }
}

impl OdMatrixProvider for StaticMatrixProvider {
    fn solve(&self, request: &OdRequest<'_>) -> Result<OdMatrix> {
        Ok(serve(&self.forward, self.reverse.as_ref(), request))
    }
}

#[derive(Debug, Deserialize)]
struct OdRow {
    #[serde(alias = "origin", alias = "OriginID")]
    origin_id: String,
    #[serde(alias = "destination", alias = "DestinationID")]
    destination_id: String,
    #[serde(alias = "cost", alias = "Total_Minutes")]
    travel_cost: f64,
}

/// Serves requests from precomputed OD tables on disk
///
/// Tables need `origin_id,destination_id,travel_cost` columns. They are read
/// per request so a failing file surfaces as an upstream routing failure.
#[derive(Debug, Clone)]
pub struct CsvMatrixProvider {
    forward: PathBuf,
    reverse: Option<PathBuf>,
}

impl CsvMatrixProvider {
    pub fn new<P: Into<PathBuf>>(forward: P) -> Self {
        Self {
            forward: forward.into(),
            reverse: None,
        }
    }

    pub fn with_reverse<P: Into<PathBuf>>(mut self, reverse: P) -> Self {
        self.reverse = Some(reverse.into());
        self
    }

    fn read_table(path: &Path) -> Result<OdMatrix> {
        let file = File::open(path).map_err(|e| {
            Error::UpstreamRouting(format!("cannot open OD table {}: {e}", path.display()))
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut pairs = Vec::new();
        for row in reader.deserialize::<OdRow>() {
            let row = row.map_err(|e| {
                Error::UpstreamRouting(format!("malformed OD table {}: {e}", path.display()))
            })?;
            pairs.push(OdPair {
                origin: row.origin_id,
                destination: row.destination_id,
                travel_cost: row.travel_cost,
            });
        }
        OdMatrix::new(pairs)
    }
}

impl OdMatrixProvider for CsvMatrixProvider {
    fn solve(&self, request: &OdRequest<'_>) -> Result<OdMatrix> {
        let forward = Self::read_table(&self.forward)?;
        let reverse = match (&self.reverse, request.direction) {
            (Some(path), Direction::DemandToSupply) => Some(Self::read_table(path)?),
            _ => None,
        };
        Ok(serve(&forward, reverse.as_ref(), request))
    }
}

fn serve(forward: &OdMatrix, reverse: Option<&OdMatrix>, request: &OdRequest<'_>) -> OdMatrix {
    match request.direction {
        Direction::SupplyToDemand => forward.restricted_to(request),
        Direction::DemandToSupply => match reverse {
            Some(reverse) => reverse.restricted_to(request),
            None => {
                info!("No reverse OD table given, transposing the forward table (symmetric network)");
                forward.transposed().restricted_to(request)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_matrix_rejects_negative_costs() {
        let err = OdMatrix::new(vec![OdPair::new("s", "d", -1.0)]).unwrap_err();
        assert!(matches!(err, Error::UpstreamRouting(_)));
        assert!(OdMatrix::new(vec![OdPair::new("s", "d", f64::NAN)]).is_err());
    }

    #[test]
    fn test_index_groups_pairs() {
        let matrix = OdMatrix::new(vec![
            OdPair::new("s1", "d1", 1.0),
            OdPair::new("s1", "d2", 2.0),
            OdPair::new("s2", "d1", 3.0),
        ])
        .unwrap();
        let origins: FxHashSet<&str> = ["s1", "s2", "s3"].into_iter().collect();
        let destinations: FxHashSet<&str> = ["d1", "d2"].into_iter().collect();
        let index = OdIndex::build(&matrix, &origins, &destinations).unwrap();

        assert_eq!(index.from_origin("s1"), &[0, 1]);
        assert_eq!(index.from_origin("s3"), &[] as &[usize]);
        assert_eq!(index.to_destination("d1"), &[0, 2]);
        assert_eq!(index.pair(2).origin, "s2");
    }

    #[test]
    fn test_index_rejects_unknown_endpoints() {
        let matrix = OdMatrix::new(vec![OdPair::new("s1", "ghost", 1.0)]).unwrap();
        let origins: FxHashSet<&str> = ["s1"].into_iter().collect();
        let destinations: FxHashSet<&str> = ["d1"].into_iter().collect();
        assert!(matches!(
            OdIndex::build(&matrix, &origins, &destinations),
            Err(Error::UpstreamRouting(msg)) if msg.contains("ghost")
        ));
    }

    #[test]
    fn test_static_provider_filters_and_transposes() {
        let provider = StaticMatrixProvider::new(vec![
            OdPair::new("s1", "d1", 4.0),
            OdPair::new("s1", "d2", 12.0),
        ])
        .unwrap();
        let supplies = ids(&["s1"]);
        let demands = ids(&["d1", "d2"]);

        let forward = provider
            .solve(&OdRequest {
                origins: &supplies,
                destinations: &demands,
                cutoff: 10.0,
                direction: Direction::SupplyToDemand,
            })
            .unwrap();
        assert_eq!(forward.pairs(), &[OdPair::new("s1", "d1", 4.0)]);

        let backward = provider
            .solve(&OdRequest {
                origins: &demands,
                destinations: &supplies,
                cutoff: 15.0,
                direction: Direction::DemandToSupply,
            })
            .unwrap();
        assert_eq!(backward.len(), 2);
        assert!(backward.pairs().iter().all(|p| p.destination == "s1"));
    }

    #[test]
    fn test_static_provider_prefers_reverse_pairs() {
        let provider = StaticMatrixProvider::new(vec![OdPair::new("s1", "d1", 4.0)])
            .unwrap()
            .with_reverse(vec![OdPair::new("d1", "s1", 9.0)])
            .unwrap();
        let supplies = ids(&["s1"]);
        let demands = ids(&["d1"]);
        let backward = provider
            .solve(&OdRequest {
                origins: &demands,
                destinations: &supplies,
                cutoff: 10.0,
                direction: Direction::DemandToSupply,
            })
            .unwrap();
        assert_eq!(backward.pairs(), &[OdPair::new("d1", "s1", 9.0)]);
    }

    #[test]
    fn test_csv_provider_reads_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "OriginID,DestinationID,Total_Minutes").unwrap();
        writeln!(file, "s1,d1,3.5").unwrap();
        writeln!(file, "s1,d2,30").unwrap();

        let provider = CsvMatrixProvider::new(file.path());
        let supplies = ids(&["s1"]);
        let demands = ids(&["d1", "d2"]);
        let matrix = provider
            .solve(&OdRequest {
                origins: &supplies,
                destinations: &demands,
                cutoff: 15.0,
                direction: Direction::SupplyToDemand,
            })
            .unwrap();
        assert_eq!(matrix.pairs(), &[OdPair::new("s1", "d1", 3.5)]);
    }

    #[test]
    fn test_csv_provider_missing_file_is_upstream_failure() {
        let provider = CsvMatrixProvider::new("/nonexistent/od.csv");
        let supplies = ids(&["s1"]);
        let result = provider.solve(&OdRequest {
            origins: &supplies,
            destinations: &supplies,
            cutoff: 1.0,
            direction: Direction::SupplyToDemand,
        });
        assert!(matches!(result, Err(Error::UpstreamRouting(_))));
    }
}
