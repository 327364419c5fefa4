use serde::{Deserialize, Serialize};

/// The service period a row was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MealPeriod {
    Lunch,
    Dinner,
}

impl MealPeriod {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Lunch" => Some(Self::Lunch),
            "Dinner" => Some(Self::Dinner),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lunch => "Lunch",
            Self::Dinner => "Dinner",
        }
    }
}

/// A categorical column usable as a chart grouping dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Sex,
    Smoker,
    Day,
    Time,
}

impl Dimension {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sex" => Some(Self::Sex),
            "smoker" => Some(Self::Smoker),
            "day" => Some(Self::Day),
            "time" => Some(Self::Time),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sex => "sex",
            Self::Smoker => "smoker",
            Self::Day => "day",
            Self::Time => "time",
        }
    }
}

/// One row of the base table. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub total_bill: f64,
    pub tip: f64,
    pub sex: String,
    pub smoker: String,
    pub day: String,
    pub time: MealPeriod,
    /// Party size; present in the canonical tips file but not required.
    pub size: Option<u32>,
}

impl Record {
    /// Tip as a fraction of the bill.
    pub fn tip_pct(&self) -> f64 {
        self.tip / self.total_bill
    }

    /// The categorical label of this row along the given dimension.
    pub fn dimension(&self, dim: Dimension) -> &str {
        match dim {
            Dimension::Sex => &self.sex,
            Dimension::Smoker => &self.smoker,
            Dimension::Day => &self.day,
            Dimension::Time => self.time.as_str(),
        }
    }
}

/// A numeric column with precomputed bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericColumn {
    TotalBill,
    Tip,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ColumnBounds {
    pub min: f64,
    pub max: f64,
}

/// The base table: an ordered sequence of records, loaded once,
/// never mutated in place. Filters produce index views over it.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    records: Vec<Record>,
    bill_bounds: ColumnBounds,
    tip_bounds: ColumnBounds,
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        let bill_bounds = Self::compute_bounds(&records, |r| r.total_bill);
        let tip_bounds = Self::compute_bounds(&records, |r| r.tip);
        Self { records, bill_bounds, tip_bounds }
    }

    fn compute_bounds(records: &[Record], field: impl Fn(&Record) -> f64) -> ColumnBounds {
        let mut bounds = ColumnBounds { min: f64::INFINITY, max: f64::NEG_INFINITY };
        for r in records {
            let v = field(r);
            bounds.min = bounds.min.min(v);
            bounds.max = bounds.max.max(v);
        }
        if records.is_empty() {
            bounds = ColumnBounds { min: 0.0, max: 0.0 };
        }
        bounds
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Bounds of a numeric column, computed once at load.
    /// Used to seed the bill-range control.
    pub fn bounds(&self, column: NumericColumn) -> ColumnBounds {
        match column {
            NumericColumn::TotalBill => self.bill_bounds,
            NumericColumn::Tip => self.tip_bounds,
        }
    }
}
