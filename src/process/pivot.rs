// src/process/pivot.rs
use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{CleanError, Result};
use crate::process::regions::Region;

/// Identity of one tidy row. Field order is the output sort order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey {
    pub year: i32,
    pub region: Region,
    pub categories: Vec<String>,
}

impl RowKey {
    fn describe(&self) -> String {
        format!(
            "{}/{}/[{}]",
            self.region,
            self.year,
            self.categories.join(", ")
        )
    }
}

/// One observation in the melted layout: a key, which measure it belongs to,
/// and its value.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRow {
    pub key: RowKey,
    pub measure: usize,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TidyRow {
    pub key: RowKey,
    /// One value per measure, in catalog order.
    pub values: Vec<f64>,
}

/// The cleaned, validated table: sorted rows plus the column contract.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedTable {
    pub category_columns: Vec<String>,
    pub measure_columns: Vec<String>,
    /// Measures written as whole numbers.
    pub integer_measures: Vec<bool>,
    pub rows: Vec<TidyRow>,
}

impl CleanedTable {
    pub fn header(&self) -> Vec<String> {
        let mut h = vec!["region".to_string(), "year".to_string()];
        h.extend(self.category_columns.iter().cloned());
        h.extend(self.measure_columns.iter().cloned());
        h
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one measure, top to bottom.
    pub fn measure(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.measure_columns.iter().position(|m| m == name)?;
        Some(self.rows.iter().map(|r| r.values[idx]).collect())
    }
}

/// Spread melted observations into one row per key with a column per measure.
///
/// A repeated (key, measure) pair is a duplicate and a key lacking any measure
/// would leave a hole (NaN); both abort.
pub fn pivot_measures(
    dataset: &str,
    rows: Vec<LongRow>,
    measure_count: usize,
) -> Result<Vec<TidyRow>> {
    let mut grid: BTreeMap<RowKey, Vec<Option<f64>>> = BTreeMap::new();
    for row in rows {
        let slots = grid
            .entry(row.key.clone())
            .or_insert_with(|| vec![None; measure_count]);
        let Some(slot) = slots.get_mut(row.measure) else {
            return Err(CleanError::consistency(
                dataset,
                format!("measure index {} out of bounds", row.measure),
            ));
        };
        if slot.is_some() {
            return Err(CleanError::consistency(
                dataset,
                format!(
                    "duplicate observation for {} in measure #{}",
                    row.key.describe(),
                    row.measure
                ),
            ));
        }
        *slot = Some(row.value);
    }

    let mut holes = Vec::new();
    let mut out = Vec::with_capacity(grid.len());
    for (key, slots) in grid {
        if slots.iter().any(Option::is_none) {
            holes.push(key.describe());
            continue;
        }
        out.push(TidyRow {
            key,
            values: slots.into_iter().flatten().collect(),
        });
    }
    if !holes.is_empty() {
        return Err(CleanError::consistency(
            dataset,
            format!(
                "{} row(s) missing a measure after pivot (NaN): {}",
                holes.len(),
                holes.join("; ")
            ),
        ));
    }
    debug!(dataset, rows = out.len(), "pivoted");
    Ok(out)
}

/// Check that, per (year, region, non-partition categories), the values of
/// measure `measure` sum to `target` within `tolerance`.
pub fn check_proportions(
    dataset: &str,
    rows: &[TidyRow],
    measure: usize,
    partition: usize,
    target: f64,
    tolerance: f64,
) -> Result<()> {
    let mut sums: BTreeMap<(i32, Region, Vec<&str>), f64> = BTreeMap::new();
    for row in rows {
        let others: Vec<&str> = row
            .key
            .categories
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != partition)
            .map(|(_, c)| c.as_str())
            .collect();
        *sums
            .entry((row.key.year, row.key.region, others))
            .or_insert(0.0) += row.values[measure];
    }

    let broken: Vec<String> = sums
        .iter()
        .filter(|(_, total)| (**total - target).abs() > tolerance)
        .map(|((year, region, others), total)| {
            if others.is_empty() {
                format!("{}/{} = {:.2}", region, year, total)
            } else {
                format!("{}/{}/[{}] = {:.2}", region, year, others.join(", "), total)
            }
        })
        .collect();

    if broken.is_empty() {
        debug!(dataset, groups = sums.len(), "proportions within tolerance");
        Ok(())
    } else {
        Err(CleanError::consistency(
            dataset,
            format!(
                "shares do not sum to {} ± {}: {}",
                target,
                tolerance,
                broken.join("; ")
            ),
        ))
    }
}

/// Last gate before writing: every value finite and non-negative.
pub fn validate_values(dataset: &str, table: &CleanedTable) -> Result<()> {
    for row in &table.rows {
        for (i, v) in row.values.iter().enumerate() {
            if !v.is_finite() || *v < 0.0 {
                return Err(CleanError::consistency(
                    dataset,
                    format!(
                        "invalid {} value {} for {}",
                        table.measure_columns[i],
                        v,
                        row.key.describe()
                    ),
                ));
            }
        }
    }
    Ok(())
}
