// src/process/pipeline.rs
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{DatasetSpec, PipelineConfig};
use crate::error::{CleanError, Result};
use crate::fetch::{FileResolver, ForcedFile, LatestTimestamped};
use crate::process::aggregate::{derive_all_island, load_weights, round_to, WeightTable};
use crate::process::pivot::{
    check_proportions, pivot_measures, validate_values, CleanedTable, LongRow, RowKey,
};
use crate::process::raw_table::RawTable;
use crate::process::regions::{map_regions, RegionMap};
use crate::process::utils::{clean_numeric_column, clean_str};
use crate::process::write::write_cleaned_csv;
use crate::process::year_parser::parse_census_year;
use crate::process::{ensure_cols, load_raw_csv};

/// Row accounting for one cleaning run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DropStats {
    pub raw_rows: usize,
    pub dropped_statistic: usize,
    pub dropped_filters: usize,
    pub dropped_categories: usize,
    pub dropped_years: usize,
    pub dropped_units: usize,
    pub non_numeric: usize,
    pub out_of_range: usize,
    pub derived_all_island: usize,
}

/// What one invocation read, dropped and wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleaningReport {
    pub dataset: String,
    pub raw_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(flatten)]
    pub stats: DropStats,
    pub rows_written: usize,
}

fn col_idx(raw: &RawTable, name: &str) -> Result<usize> {
    raw.column_index(name).ok_or_else(|| CleanError::Schema {
        missing: vec![name.to_string()],
        found: raw.headers.clone(),
    })
}

fn label_set(labels: &[String]) -> HashSet<String> {
    labels.iter().map(|l| clean_str(l)).collect()
}

/// Turn a raw export into a validated tidy table, without touching disk.
///
/// Runs schema check, string cleanup, row filters, year parsing, region
/// mapping, unit split, numeric coercion, pivot, All-Island derivation and
/// the consistency checks, in that order. Any failure aborts the whole table.
/// `weights` is only read by a weighted All-Island rule.
pub fn clean_table(
    mut raw: RawTable,
    spec: &DatasetSpec,
    regions: &RegionMap,
    default_tolerance: f64,
    weights: Option<&WeightTable>,
) -> Result<(CleanedTable, DropStats)> {
    let dataset = spec.name.as_str();
    let mut stats = DropStats {
        raw_rows: raw.len(),
        ..Default::default()
    };

    // 1) Schema: hard stop before any reshaping
    let required = spec.required_columns();
    ensure_cols(&raw, &required)?;

    // 2) Normalise every cell we are going to read
    for col in &required {
        raw.map_column(col, clean_str);
    }

    // 3) Statistic filter
    if let Some(filter) = &spec.statistic {
        let idx = col_idx(&raw, &filter.column)?;
        stats.dropped_statistic = raw.retain_rows(|row| filter.matches(&row[idx]));
    }
    for filter in &spec.filters {
        let idx = col_idx(&raw, &filter.column)?;
        let keep = label_set(&filter.keep);
        stats.dropped_filters += raw.retain_rows(|row| keep.contains(row[idx].as_str()));
    }

    // 4) Aggregate / excluded category labels
    for cat in &spec.categories {
        let idx = col_idx(&raw, &cat.source)?;
        let drop = label_set(&cat.drop);
        let keep = label_set(&cat.keep);
        stats.dropped_categories += raw.retain_rows(|row| {
            let label = row[idx].as_str();
            !drop.contains(label) && (keep.is_empty() || keep.contains(label))
        });
    }

    // 5) Census years, then the optional year filter
    let year_idx = col_idx(&raw, &spec.year_column)?;
    let mut years: Vec<i32> = raw
        .rows
        .iter()
        .map(|row| parse_census_year(&row[year_idx]))
        .collect::<Result<_>>()?;
    if !spec.years.is_empty() {
        let mut parsed = years.iter();
        // rows and years are visited in the same order
        stats.dropped_years = raw.retain_rows(|_| {
            parsed
                .next()
                .map_or(false, |y| spec.years.contains(y))
        });
        years.retain(|y| spec.years.contains(y));
    }

    // 6) Regions
    let region_idx = col_idx(&raw, &spec.region_column)?;
    let labels: Vec<&str> = raw.rows.iter().map(|r| r[region_idx].as_str()).collect();
    let mapped = map_regions(&labels, regions)?;

    // 7) Unit split: each row belongs to at most one measure
    let unit_idx = col_idx(&raw, &spec.unit_column)?;
    let measure_of: Vec<Option<usize>> = raw
        .rows
        .iter()
        .map(|row| {
            spec.measures
                .iter()
                .position(|m| m.matches_unit(&row[unit_idx]))
        })
        .collect();
    stats.dropped_units = measure_of.iter().filter(|m| m.is_none()).count();

    // 8) Numeric coercion per measure, melted into long rows
    let value_idx = col_idx(&raw, &spec.value_column)?;
    let cat_idx: Vec<usize> = spec
        .categories
        .iter()
        .map(|c| col_idx(&raw, &c.source))
        .collect::<Result<_>>()?;

    let mut long = Vec::with_capacity(raw.len());
    for (m, measure) in spec.measures.iter().enumerate() {
        let members: Vec<usize> = (0..raw.len())
            .filter(|&i| measure_of[i] == Some(m))
            .collect();
        let cells: Vec<&str> = members
            .iter()
            .map(|&i| raw.rows[i][value_idx].as_str())
            .collect();
        let filter = clean_numeric_column(&cells, measure.range);
        if filter.filtered() > 0 {
            warn!(
                dataset,
                measure = %measure.output,
                non_numeric = filter.non_numeric,
                out_of_range = filter.out_of_range,
                "excluded values from measure"
            );
        }
        stats.non_numeric += filter.non_numeric;
        stats.out_of_range += filter.out_of_range;

        for (local, value) in filter.kept {
            let i = members[local];
            let row = &raw.rows[i];
            long.push(LongRow {
                key: RowKey {
                    year: years[i],
                    region: mapped[i],
                    categories: cat_idx.iter().map(|&c| row[c].clone()).collect(),
                },
                measure: m,
                value,
            });
        }
    }

    // 9) Pivot
    let mut rows = pivot_measures(dataset, long, spec.measures.len())?;
    if rows.is_empty() {
        return Err(CleanError::consistency(dataset, "no rows left after filtering"));
    }

    // 9b) All-Island rows from ROI and NI
    if let Some(rule) = &spec.all_island {
        let before = rows.len();
        rows = derive_all_island(dataset, rows, rule.method, weights)?;
        stats.derived_all_island = rows.len() - before;
    }

    // 10) Shares add up within each partition group
    let partition = spec.partition_index();
    for (m, measure) in spec.measures.iter().enumerate() {
        if let Some(target) = measure.sums_to {
            let tolerance = measure.tolerance.unwrap_or(default_tolerance);
            check_proportions(dataset, &rows, m, partition, target, tolerance)?;
        }
    }

    // 11) Rounding, then the final gate
    for (m, measure) in spec.measures.iter().enumerate() {
        if let Some(d) = measure.decimals {
            for row in &mut rows {
                row.values[m] = round_to(row.values[m], d);
            }
        }
    }
    let table = CleanedTable {
        category_columns: spec.categories.iter().map(|c| c.output.clone()).collect(),
        measure_columns: spec.measures.iter().map(|m| m.output.clone()).collect(),
        integer_measures: spec.measures.iter().map(|m| m.integer).collect(),
        rows,
    };
    validate_values(dataset, &table)?;

    info!(
        dataset,
        raw_rows = stats.raw_rows,
        rows = table.len(),
        dropped_categories = stats.dropped_categories,
        dropped_units = stats.dropped_units,
        derived = stats.derived_all_island,
        "cleaned table"
    );
    Ok((table, stats))
}

/// Runs catalog datasets end to end: resolve, load, clean, write.
pub struct Pipeline {
    config: PipelineConfig,
    regions: RegionMap,
    resolver: Box<dyn FileResolver>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let regions = RegionMap::with_aliases(&config.region_aliases);
        Self {
            config,
            regions,
            resolver: Box::new(LatestTimestamped),
        }
    }

    /// Replace the default latest-timestamp discovery.
    pub fn with_resolver(mut self, resolver: impl FileResolver + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Raw file for `spec`; a catalog `force_filename` pins it.
    pub fn resolve_raw(&self, spec: &DatasetSpec) -> Result<PathBuf> {
        let dir = self.config.raw_dir_for(spec);
        match &spec.force_filename {
            Some(name) => ForcedFile(name.clone()).resolve(&dir, &spec.prefix),
            None => self.resolver.resolve(&dir, &spec.prefix),
        }
    }

    /// Clean one dataset. `raw_override` bypasses discovery.
    #[tracing::instrument(level = "info", skip(self, raw_override), fields(dataset = name))]
    pub fn run(&self, name: &str, raw_override: Option<&Path>) -> Result<CleaningReport> {
        let spec = self.config.dataset(name)?;

        // 1) Find and load the raw export
        let raw_path = match raw_override {
            Some(p) => p.to_path_buf(),
            None => self.resolve_raw(spec)?,
        };
        info!(raw = %raw_path.display(), "using raw file");
        let raw = load_raw_csv(&raw_path)?;

        // 2) Weights for a weighted All-Island mean come from an earlier output
        let weights = match spec.all_island.as_ref().and_then(|r| r.weights.as_ref()) {
            Some(src) => {
                let source = self.config.dataset(&src.dataset)?;
                Some(load_weights(&self.config.output_path_for(source), &src.measure)?)
            }
            None => None,
        };

        // 3) Clean in memory
        let (table, stats) = clean_table(
            raw,
            spec,
            &self.regions,
            self.config.sum_tolerance,
            weights.as_ref(),
        )?;

        // 4) Persist
        let output_path = self.config.output_path_for(spec);
        write_cleaned_csv(&table, &output_path)?;

        Ok(CleaningReport {
            dataset: spec.name.clone(),
            raw_path,
            output_path,
            stats,
            rows_written: table.len(),
        })
    }

    /// Clean every catalog dataset in order. A failure is logged and kept;
    /// it never stops the remaining datasets.
    pub fn run_all(&self) -> Vec<(String, Result<CleaningReport>)> {
        self.config
            .datasets
            .iter()
            .map(|spec| {
                let result = self.run(&spec.name, None);
                if let Err(e) = &result {
                    error!(dataset = %spec.name, error = %e, "cleaning failed");
                }
                (spec.name.clone(), result)
            })
            .collect()
    }
}
