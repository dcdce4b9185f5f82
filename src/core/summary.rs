// Per-column descriptive statistics.
//
// Numeric columns report min/max/mean, the sample standard deviation (n - 1
// denominator), and linearly interpolated quartiles. Categorical columns
// report cardinality and the most frequent value. Aggregates over zero
// values are `None`, never NaN.
use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::table::{Cell, ColumnType, Dataset};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub count: u64,
    pub null_count: u64,
    #[serde(flatten)]
    pub stats: ColumnStats,
}

impl ColumnSummary {
    pub fn column_type(&self) -> ColumnType {
        match self.stats {
            ColumnStats::Numeric(_) => ColumnType::Numeric,
            ColumnStats::Categorical(_) => ColumnType::Categorical,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColumnStats {
    Numeric(NumericStats),
    Categorical(CategoricalStats),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub stddev: Option<f64>,
    pub median: Option<f64>,
    pub p25: Option<f64>,
    pub p75: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoricalStats {
    pub distinct_count: u64,
    pub top: Option<String>,
    pub top_count: u64,
}

pub fn summarize(dataset: &Dataset) -> Vec<ColumnSummary> {
    dataset
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let cells = dataset.column_cells(index);
            let (count, null_count, stats) = match column.inferred_type {
                ColumnType::Numeric => {
                    let (count, nulls, stats) = numeric_stats(cells);
                    (count, nulls, ColumnStats::Numeric(stats))
                }
                ColumnType::Categorical => {
                    let (count, nulls, stats) = categorical_stats(cells);
                    (count, nulls, ColumnStats::Categorical(stats))
                }
            };
            ColumnSummary {
                name: column.name.clone(),
                count,
                null_count,
                stats,
            }
        })
        .collect()
}

fn numeric_stats<'a>(cells: impl Iterator<Item = &'a Cell>) -> (u64, u64, NumericStats) {
    let mut count = 0u64;
    let mut nulls = 0u64;
    let mut values = Vec::new();
    for cell in cells {
        match cell {
            Cell::Null => nulls += 1,
            Cell::Number(value) => {
                count += 1;
                values.push(*value);
            }
            Cell::Text(_) => count += 1,
        }
    }
    if values.is_empty() {
        return (count, nulls, NumericStats::default());
    }

    values.sort_by(f64::total_cmp);
    let min = values.first().copied();
    let max = values.last().copied();
    let scale = power_of_two_scale(min.unwrap_or(0.0).abs().max(max.unwrap_or(0.0).abs()));
    let mut running = Welford::default();
    for value in &values {
        running.push(value / scale);
    }
    let stats = NumericStats {
        min,
        max,
        mean: finite(running.mean * scale),
        stddev: running.sample_stddev().and_then(|stddev| finite(stddev * scale)),
        median: quantile(&values, 0.5),
        p25: quantile(&values, 0.25),
        p75: quantile(&values, 0.75),
    };
    (count, nulls, stats)
}

fn categorical_stats<'a>(cells: impl Iterator<Item = &'a Cell>) -> (u64, u64, CategoricalStats) {
    let mut count = 0u64;
    let mut nulls = 0u64;
    let mut frequencies: HashMap<Cow<'a, str>, u64> = HashMap::new();
    for cell in cells {
        let key = match cell {
            Cell::Null => {
                nulls += 1;
                continue;
            }
            Cell::Text(text) => Cow::Borrowed(text.as_str()),
            Cell::Number(_) => Cow::Owned(cell.display()),
        };
        count += 1;
        *frequencies.entry(key).or_default() += 1;
    }

    // Highest frequency wins; ties go to the lexicographically smallest value.
    let top = frequencies
        .iter()
        .max_by(|(a_value, a_count), (b_value, b_count)| {
            a_count.cmp(b_count).then_with(|| b_value.cmp(a_value))
        })
        .map(|(value, count)| (value.to_string(), *count));

    let stats = CategoricalStats {
        distinct_count: frequencies.len() as u64,
        top_count: top.as_ref().map(|(_, count)| *count).unwrap_or(0),
        top: top.map(|(value, _)| value),
    };
    (count, nulls, stats)
}

#[derive(Default)]
struct Welford {
    n: u64,
    mean: f64,
    m2: f64,
}

impl Welford {
    fn push(&mut self, value: f64) {
        self.n += 1;
        let delta = value - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn sample_stddev(&self) -> Option<f64> {
        if self.n < 2 || !self.m2.is_finite() {
            return None;
        }
        finite((self.m2 / (self.n - 1) as f64).max(0.0).sqrt())
    }
}

/// Power of two near `magnitude`. Dividing by it is exact and keeps the
/// running sums in range even when values sit near `f64::MAX`.
fn power_of_two_scale(magnitude: f64) -> f64 {
    if magnitude == 0.0 || !magnitude.is_finite() {
        return 1.0;
    }
    let exponent = (magnitude.log2().floor() as i32).clamp(-1000, 1000);
    2f64.powi(exponent)
}

/// Linear interpolation between closest ranks over sorted `values`.
fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let last = values.len().checked_sub(1)?;
    let h = last as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    let t = h - lo as f64;
    // Weighted sum; the difference of opposite-signed extremes can overflow.
    let value = values[lo] * (1.0 - t) + values[hi] * t;
    finite(value)
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}
