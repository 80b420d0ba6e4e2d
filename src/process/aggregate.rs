// src/process/aggregate.rs
use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::config::AggregateMethod;
use crate::error::{CleanError, Result};
use crate::process::pivot::{RowKey, TidyRow};
use crate::process::regions::{Region, RegionMap};
use crate::process::utils::parse_number;
use crate::process::{ensure_cols, load_raw_csv};

/// Weight per (year, region), read from a cleaned (region, year) series.
pub type WeightTable = BTreeMap<(i32, Region), f64>;

/// Read one measure of a previously cleaned table as weights.
#[tracing::instrument(level = "debug", skip(path), fields(path = %path.display()))]
pub fn load_weights(path: &Path, measure: &str) -> Result<WeightTable> {
    let table = load_raw_csv(path)?;
    ensure_cols(&table, &["region", "year", measure])?;

    let bad = |detail: String| CleanError::Consistency {
        dataset: path.display().to_string(),
        detail,
    };
    let (Some(r), Some(y), Some(v)) = (
        table.column_index("region"),
        table.column_index("year"),
        table.column_index(measure),
    ) else {
        return Err(bad("weights columns vanished".to_string()));
    };

    let regions = RegionMap::default();
    let mut out = WeightTable::new();
    for row in &table.rows {
        let region = regions.map_region(&row[r])?;
        let year: i32 = row[y]
            .trim()
            .parse()
            .map_err(|_| bad(format!("bad year `{}`", row[y])))?;
        let weight = parse_number(&row[v])
            .ok_or_else(|| bad(format!("bad {} `{}`", measure, row[v])))?;
        if out.insert((year, region), weight).is_some() {
            return Err(bad(format!("weight for {}/{} repeats", region, year)));
        }
    }
    debug!(weights = out.len(), "loaded weights");
    Ok(out)
}

fn weighted(roi: f64, ni: f64, w: Option<(f64, f64)>) -> Option<f64> {
    let (wr, wn) = w?;
    let total = wr + wn;
    (total > 0.0).then(|| (roi * wr + ni * wn) / total)
}

/// Append derived All-Island rows for every (year, categories) key that has
/// both an ROI and an NI row but no All-Island row yet.
///
/// `Sum` adds the two values. `WeightedMean` weights them by `weights`; a
/// year without usable weights falls back to the plain mean and is logged.
pub fn derive_all_island(
    dataset: &str,
    mut rows: Vec<TidyRow>,
    method: AggregateMethod,
    weights: Option<&WeightTable>,
) -> Result<Vec<TidyRow>> {
    if method == AggregateMethod::WeightedMean && weights.is_none() {
        return Err(CleanError::consistency(
            dataset,
            "weighted All-Island mean requested without weights",
        ));
    }

    let mut groups: BTreeMap<(i32, &[String]), [Option<&[f64]>; 3]> = BTreeMap::new();
    for row in &rows {
        let slot = match row.key.region {
            Region::Roi => 0,
            Region::Ni => 1,
            Region::AllIsland => 2,
        };
        groups
            .entry((row.key.year, row.key.categories.as_slice()))
            .or_insert([None; 3])[slot] = Some(row.values.as_slice());
    }

    let mut derived = Vec::new();
    let mut unweighted_years = Vec::new();
    for ((year, categories), slots) in &groups {
        let [Some(roi), Some(ni), None] = slots else {
            continue;
        };
        let pair = weights.and_then(|w| {
            Some((*w.get(&(*year, Region::Roi))?, *w.get(&(*year, Region::Ni))?))
        });
        let values = roi
            .iter()
            .zip(ni.iter())
            .map(|(r, n)| match method {
                AggregateMethod::Sum => r + n,
                AggregateMethod::WeightedMean => weighted(*r, *n, pair).unwrap_or_else(|| {
                    if !unweighted_years.contains(year) {
                        unweighted_years.push(*year);
                    }
                    (r + n) / 2.0
                }),
            })
            .collect();
        derived.push(TidyRow {
            key: RowKey {
                year: *year,
                region: Region::AllIsland,
                categories: categories.to_vec(),
            },
            values,
        });
    }
    drop(groups);

    if !unweighted_years.is_empty() {
        warn!(dataset, years = ?unweighted_years, "no population weights, used plain mean");
    }
    debug!(dataset, derived = derived.len(), "derived All-Island rows");
    rows.extend(derived);
    rows.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(rows)
}

/// Round half away from zero to `decimals` places.
pub fn round_to(v: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (v * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;

    fn row(year: i32, region: Region, cats: &[&str], values: &[f64]) -> TidyRow {
        TidyRow {
            key: RowKey {
                year,
                region,
                categories: cats.iter().map(|c| c.to_string()).collect(),
            },
            values: values.to_vec(),
        }
    }

    #[test]
    fn sums_counts_per_category() -> Result<()> {
        let rows = vec![
            row(2022, Region::Roi, &["Male", "0-4"], &[150.0]),
            row(2022, Region::Ni, &["Male", "0-4"], &[55.0]),
            row(2022, Region::Roi, &["Male", "5-9"], &[160.0]),
            row(2022, Region::Ni, &["Male", "5-9"], &[60.0]),
            // NI missing: no All-Island row
            row(2011, Region::Roi, &["Male", "0-4"], &[170.0]),
        ];
        let out = derive_all_island("pop", rows, AggregateMethod::Sum, None)?;
        let all: Vec<_> = out
            .iter()
            .filter(|r| r.key.region == Region::AllIsland)
            .collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].values, vec![205.0]);
        assert_eq!(all[1].values, vec![220.0]);
        // output stays sorted by (year, region, categories)
        let regions: Vec<Region> = out.iter().map(|r| r.key.region).collect();
        assert_eq!(
            regions,
            vec![
                Region::Roi,
                Region::Roi,
                Region::Roi,
                Region::Ni,
                Region::Ni,
                Region::AllIsland,
                Region::AllIsland,
            ]
        );
        Ok(())
    }

    #[test]
    fn existing_all_island_rows_are_kept() -> Result<()> {
        let rows = vec![
            row(2022, Region::Roi, &[], &[10.0]),
            row(2022, Region::Ni, &[], &[5.0]),
            row(2022, Region::AllIsland, &[], &[16.0]),
        ];
        let out = derive_all_island("t", rows, AggregateMethod::Sum, None)?;
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].values, vec![16.0]);
        Ok(())
    }

    #[test]
    fn weighted_mean_uses_population() -> Result<()> {
        let weights = WeightTable::from([
            ((2022, Region::Roi), 3_000.0),
            ((2022, Region::Ni), 1_000.0),
        ]);
        let rows = vec![
            row(2022, Region::Roi, &[], &[38.0]),
            row(2022, Region::Ni, &[], &[42.0]),
            row(2011, Region::Roi, &[], &[36.0]),
            row(2011, Region::Ni, &[], &[38.0]),
        ];
        let out = derive_all_island("age", rows, AggregateMethod::WeightedMean, Some(&weights))?;
        let all: Vec<(i32, f64)> = out
            .iter()
            .filter(|r| r.key.region == Region::AllIsland)
            .map(|r| (r.key.year, r.values[0]))
            .collect();
        // 2011 has no weights and falls back to the plain mean
        assert_eq!(all, vec![(2011, 37.0), (2022, 39.0)]);
        Ok(())
    }

    #[test]
    fn weighted_mean_without_weights_is_rejected() {
        let rows = vec![row(2022, Region::Roi, &[], &[1.0])];
        assert!(matches!(
            derive_all_island("t", rows, AggregateMethod::WeightedMean, None),
            Err(CleanError::Consistency { .. })
        ));
    }

    #[test]
    fn weights_come_from_cleaned_csv() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("population_over_time.csv");
        fs::write(
            &path,
            "region,year,population\nROI,2022,5149139\nNI,2022,1903175\n",
        )?;
        let w = load_weights(&path, "population")?;
        assert_eq!(w.get(&(2022, Region::Roi)), Some(&5_149_139.0));
        assert_eq!(w.get(&(2022, Region::Ni)), Some(&1_903_175.0));

        assert!(matches!(
            load_weights(&path, "households"),
            Err(CleanError::Schema { .. })
        ));
        Ok(())
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(39.2449, 1), 39.2);
        assert_eq!(round_to(39.25, 1), 39.3);
        assert_eq!(round_to(7.0, 0), 7.0);
    }
}
