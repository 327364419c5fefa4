//! Header-mapped CSV ingestion for the base table.
//!
//! The source file is a plain comma-separated table with a fixed header.
//! Fields in the tips dataset are never quoted, so a straight split is
//! sufficient; a missing or malformed source is fatal at startup.

use crate::dataset::types::{Dataset, MealPeriod, Record};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataLoadError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("source file is empty")]
    Empty,
    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),
    #[error("row {row}: expected at least {expected} fields, found {found}")]
    RaggedRow { row: usize, expected: usize, found: usize },
    #[error("row {row}: non-numeric value '{value}' in column '{column}'")]
    BadNumber { row: usize, column: &'static str, value: String },
    #[error("row {row}: unknown meal period '{value}'")]
    BadPeriod { row: usize, value: String },
}

/// Loads the base table from a CSV file. Deterministic, called once at
/// session construction.
pub fn load(path: impl AsRef<Path>) -> Result<Dataset, DataLoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| DataLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    from_reader(BufReader::new(file))
}

/// Loads the base table from any buffered reader. Exposed for tests and
/// embedded sources.
pub fn from_reader<R: BufRead>(reader: R) -> Result<Dataset, DataLoadError> {
    let mut lines = reader.lines();

    let header = match lines.next() {
        Some(line) => line.map_err(|source| DataLoadError::Io { path: "<reader>".into(), source })?,
        None => return Err(DataLoadError::Empty),
    };
    let columns = Columns::from_header(&header)?;

    let mut records = Vec::new();
    for (i, line) in lines.enumerate() {
        let row = i + 2; // 1-based, after the header
        let line = line.map_err(|source| DataLoadError::Io { path: "<reader>".into(), source })?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(columns.parse_row(row, &line)?);
    }

    log::info!("loaded {} rows from source table", records.len());
    Ok(Dataset::new(records))
}

/// Resolved positions of the required (and one optional) columns.
struct Columns {
    total_bill: usize,
    tip: usize,
    sex: usize,
    smoker: usize,
    day: usize,
    time: usize,
    size: Option<usize>,
    width: usize,
}

impl Columns {
    fn from_header(header: &str) -> Result<Self, DataLoadError> {
        let names: Vec<&str> = header.split(',').map(str::trim).collect();
        let find = |wanted: &'static str| -> Result<usize, DataLoadError> {
            names
                .iter()
                .position(|n| *n == wanted)
                .ok_or(DataLoadError::MissingColumn(wanted))
        };

        let total_bill = find("total_bill")?;
        let tip = find("tip")?;
        let sex = find("sex")?;
        let smoker = find("smoker")?;
        let day = find("day")?;
        let time = find("time")?;
        let size = names.iter().position(|n| *n == "size");

        // The widest required index bounds the minimum row width.
        let width = [total_bill, tip, sex, smoker, day, time]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1;

        Ok(Self { total_bill, tip, sex, smoker, day, time, size, width })
    }

    fn parse_row(&self, row: usize, line: &str) -> Result<Record, DataLoadError> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < self.width {
            return Err(DataLoadError::RaggedRow {
                row,
                expected: self.width,
                found: fields.len(),
            });
        }

        let number = |column: &'static str, idx: usize| -> Result<f64, DataLoadError> {
            fields[idx].parse::<f64>().map_err(|_| DataLoadError::BadNumber {
                row,
                column,
                value: fields[idx].to_string(),
            })
        };

        let time = MealPeriod::parse(fields[self.time]).ok_or_else(|| DataLoadError::BadPeriod {
            row,
            value: fields[self.time].to_string(),
        })?;

        Ok(Record {
            total_bill: number("total_bill", self.total_bill)?,
            tip: number("tip", self.tip)?,
            sex: fields[self.sex].to_string(),
            smoker: fields[self.smoker].to_string(),
            day: fields[self.day].to_string(),
            time,
            size: self.size.and_then(|idx| fields.get(idx).and_then(|f| f.parse().ok())),
        })
    }
}
