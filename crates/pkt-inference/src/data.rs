//! Packet data sources.
//!
//! Simulation output is a set of named two-dimensional tables, one row per
//! simulation run, with a variable number of packets per row. Only the
//! `energies` and `nus` datasets are needed to build a sample store.

use pkt_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Dataset holding packet energies.
pub const ENERGIES: &str = "energies";
/// Dataset holding packet emission frequencies.
pub const NUS: &str = "nus";

/// Row-oriented numeric table reader.
pub trait DataSource {
    /// Read the first `max_elements` values of `row` in `dataset`.
    ///
    /// `max_elements == 0` reads the whole row.
    fn read(&self, dataset: &str, row: usize, max_elements: usize) -> Result<Vec<f64>>;
}

/// In-memory table backed by a JSON document of the form
/// `{ "energies": [[...], ...], "nus": [[...], ...] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonTable {
    datasets: BTreeMap<String, Vec<Vec<f64>>>,
}

impl JsonTable {
    /// Parse a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load a JSON document from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

impl DataSource for JsonTable {
    fn read(&self, dataset: &str, row: usize, max_elements: usize) -> Result<Vec<f64>> {
        let rows = self
            .datasets
            .get(dataset)
            .ok_or_else(|| Error::Validation(format!("dataset '{dataset}' not found")))?;
        let values = rows.get(row).ok_or_else(|| {
            Error::Validation(format!(
                "row {row} out of range for dataset '{dataset}' with {} rows",
                rows.len()
            ))
        })?;
        let take = if max_elements == 0 { values.len() } else { max_elements.min(values.len()) };
        Ok(values[..take].to_vec())
    }
}
