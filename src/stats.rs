//! Numeric aggregation over a field of fetched records.

use serde::Serialize;

use crate::model::{rate, Record};
use crate::query::parse_number;

pub const DEFAULT_BINS: usize = 20;

/// One equal-width histogram bin. `upper` is exclusive except for the last bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bin {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldStats {
    pub field: String,
    /// Records considered.
    pub records: u64,
    /// Records whose value for `field` parsed as a finite number.
    pub numeric: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub sum: f64,
    pub histogram: Vec<Bin>,
}

impl FieldStats {
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        (self.numeric > 0).then(|| self.sum / self.numeric as f64)
    }

    /// Share of records that carried a numeric value.
    #[must_use]
    pub fn numeric_rate(&self) -> f64 {
        rate(self.numeric, self.records)
    }
}

/// Summarize the numeric values of `field` across `records`.
pub fn field_stats(records: &[Record], field: &str, bins: usize) -> FieldStats {
    let values: Vec<f64> = records
        .iter()
        .filter_map(|r| r.get(field))
        .filter_map(parse_number)
        .collect();

    let min = values.iter().copied().reduce(f64::min);
    let max = values.iter().copied().reduce(f64::max);
    let histogram = match (min, max) {
        (Some(lo), Some(hi)) => histogram(&values, lo, hi, bins.max(1)),
        _ => Vec::new(),
    };

    FieldStats {
        field: field.to_string(),
        records: records.len() as u64,
        numeric: values.len() as u64,
        min,
        max,
        sum: values.iter().sum(),
        histogram,
    }
}

fn histogram(values: &[f64], lo: f64, hi: f64, bins: usize) -> Vec<Bin> {
    if lo == hi {
        return vec![Bin {
            lower: lo,
            upper: hi,
            count: values.len() as u64,
        }];
    }

    let width = (hi - lo) / bins as f64;
    let mut result: Vec<Bin> = (0..bins)
        .map(|i| Bin {
            lower: lo + width * i as f64,
            upper: if i + 1 == bins {
                hi
            } else {
                lo + width * (i + 1) as f64
            },
            count: 0,
        })
        .collect();

    for &v in values {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        result[idx].count += 1;
    }
    result
}
