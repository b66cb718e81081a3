//! Location attribute store
//!
//! Supply and demand points arrive as attribute tables keyed by a
//! caller-chosen unique id field. Cells are kept as text so tables round-trip
//! to CSV unchanged; numeric fields are parsed on read.

use std::fs::File;
use std::io;
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::core::error::{Error, Result};

/// Read/write access to named numeric fields on located records
pub trait AttributeStore {
    /// Ids in store order
    fn ids(&self) -> Vec<&str>;

    /// Names of every field carried by the store
    fn field_names(&self) -> Vec<&str>;

    /// Numeric value of `field` on record `id`; `None` when blank or not numeric
    fn number(&self, id: &str, field: &str) -> Option<f64>;

    /// Write (or clear) a numeric field on one record, adding the field if needed
    fn set_number(&mut self, id: &str, field: &str, value: Option<f64>) -> Result<()>;

    fn has_field(&self, field: &str) -> bool {
        self.field_names().iter().any(|f| *f == field)
    }
}

/// A supply point after volume resolution
#[derive(Debug, Clone, PartialEq)]
pub struct SupplyLocation {
    pub id: String,
    pub volume: f64,
    /// E2SFCA only; 1.0 leaves Step-1 scores unscaled
    pub multiplier: f64,
}

/// A demand point after volume resolution
#[derive(Debug, Clone, PartialEq)]
pub struct DemandLocation {
    pub id: String,
    pub volume: f64,
}

/// In-memory attribute table with CSV import and export
#[derive(Debug, Clone)]
pub struct LocationTable {
    id_field: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    index: FxHashMap<String, usize>,
}

impl LocationTable {
    /// Create an empty table whose ids live in `id_field`
    pub fn new(id_field: &str) -> Self {
        Self {
            id_field: id_field.to_string(),
            columns: vec![id_field.to_string()],
            rows: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    /// Append a record with numeric attributes
    pub fn push(&mut self, id: &str, attributes: &[(&str, f64)]) -> Result<()> {
        self.insert_row(id)?;
        for (field, value) in attributes {
            self.set_number(id, field, Some(*value))?;
        }
        Ok(())
    }

    /// Load a table from a CSV file with a header row
    pub fn from_csv_path<P: AsRef<Path>>(path: P, id_field: &str) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::IoError(io::Error::new(
                e.kind(),
                format!("cannot open {}: {e}", path.as_ref().display()),
            ))
        })?;
        Self::from_reader(file, id_field)
    }

    /// Load a table from any CSV source with a header row
    pub fn from_reader<R: io::Read>(reader: R, id_field: &str) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();

        let id_column = match headers.iter().position(|h| h == id_field) {
            Some(pos) => pos,
            None => return Err(missing_field_error("id field", id_field, &headers)),
        };

        let mut table = Self {
            id_field: id_field.to_string(),
            columns: headers,
            rows: Vec::new(),
            index: FxHashMap::default(),
        };

        for record in csv_reader.records() {
            let record = record?;
            let row: Vec<String> = record.iter().map(str::to_string).collect();
            let id = row.get(id_column).cloned().unwrap_or_default();
            table.check_new_id(&id)?;
            table.index.insert(id, table.rows.len());
            table.rows.push(row);
        }

        Ok(table)
    }

    /// Write every record and field to a CSV file
    pub fn write_csv_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.write_csv(file)
    }

    /// Write every record and field as CSV
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&self.columns)?;
        for row in &self.rows {
            csv_writer.write_record(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Raw text of a cell, if the record and field exist
    pub fn text(&self, id: &str, field: &str) -> Option<&str> {
        let row = *self.index.get(id)?;
        let col = self.column(field)?;
        self.rows[row].get(col).map(String::as_str)
    }

    fn column(&self, field: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == field)
    }

    fn check_new_id(&self, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(Error::InvalidParameter(format!(
                "record with blank '{}' value (row {})",
                self.id_field,
                self.rows.len() + 1
            )));
        }
        if self.index.contains_key(id) {
            return Err(Error::InvalidParameter(format!(
                "duplicate id '{id}' in field '{}'",
                self.id_field
            )));
        }
        Ok(())
    }

    fn insert_row(&mut self, id: &str) -> Result<()> {
        self.check_new_id(id)?;
        let mut row = vec![String::new(); self.columns.len()];
        if let Some(col) = self.column(&self.id_field) {
            row[col] = id.to_string();
        }
        self.index.insert(id.to_string(), self.rows.len());
        self.rows.push(row);
        Ok(())
    }
}

impl AttributeStore for LocationTable {
    fn ids(&self) -> Vec<&str> {
        let id_col = self.column(&self.id_field).unwrap_or(0);
        self.rows
            .iter()
            .map(|row| row.get(id_col).map(String::as_str).unwrap_or(""))
            .collect()
    }

    fn field_names(&self) -> Vec<&str> {
        self.columns.iter().map(String::as_str).collect()
    }

    fn number(&self, id: &str, field: &str) -> Option<f64> {
        self.text(id, field)?.trim().parse::<f64>().ok()
    }

    fn set_number(&mut self, id: &str, field: &str, value: Option<f64>) -> Result<()> {
        let row = *self
            .index
            .get(id)
            .ok_or_else(|| Error::InvalidParameter(format!("unknown location id '{id}'")))?;

        let col = match self.column(field) {
            Some(col) => col,
            None => {
                self.columns.push(field.to_string());
                for r in &mut self.rows {
                    r.push(String::new());
                }
                self.columns.len() - 1
            }
        };

        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, String::new());
        }
        cells[col] = value.map(|v| v.to_string()).unwrap_or_default();
        Ok(())
    }
}

/// `InvalidParameter` for a field missing from a store, with a close match when there is one
pub fn missing_field_error<S: AsRef<str>>(kind: &str, field: &str, available: &[S]) -> Error {
    match crate::core::error::suggest_correction(field, available) {
        Some(suggestion) => Error::InvalidParameter(format!(
            "{kind} '{field}' not found (did you mean '{suggestion}'?)"
        )),
        None => Error::InvalidParameter(format!("{kind} '{field}' not found")),
    }
}
