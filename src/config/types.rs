// src/config/types.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::process::regions::Region;
use crate::process::utils::ValueRange;

/// Top-level catalog: where files live, shared thresholds and every dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
    #[serde(default = "default_clean_dir")]
    pub clean_dir: PathBuf,
    /// Allowed distance from `sums_to` when a measure does not set its own.
    #[serde(default = "default_tolerance")]
    pub sum_tolerance: f64,
    /// `{code}` is replaced by the publication code.
    #[serde(default = "default_download_url")]
    pub download_url: String,
    /// Labels added on top of the built-in region aliases.
    #[serde(default)]
    pub region_aliases: BTreeMap<String, Region>,
    pub datasets: Vec<DatasetSpec>,
}

/// One raw export and how to turn it into a cleaned table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSpec {
    /// Output file stem, also the CLI name.
    pub name: String,
    /// Sub-directory under both the raw and cleaned roots.
    pub theme: String,
    /// Publication code the raw filenames start with, e.g. `CPNI16`.
    pub prefix: String,
    /// Pin a specific raw filename instead of picking the latest.
    #[serde(default)]
    pub force_filename: Option<String>,
    #[serde(default = "default_region_column")]
    pub region_column: String,
    #[serde(default = "default_year_column")]
    pub year_column: String,
    #[serde(default = "default_unit_column")]
    pub unit_column: String,
    #[serde(default = "default_value_column")]
    pub value_column: String,
    #[serde(default)]
    pub statistic: Option<StatisticFilter>,
    /// Row filters on columns that are not written out (e.g. `Sex`).
    #[serde(default)]
    pub filters: Vec<RowFilter>,
    /// Output columns besides region and year. May be empty for plain
    /// (region, year) series.
    #[serde(default)]
    pub categories: Vec<CategorySpec>,
    /// Output name of the category whose labels are mutually exclusive.
    /// Defaults to the last category.
    #[serde(default)]
    pub partition: Option<String>,
    /// Keep only these census years (after parsing). Empty keeps all.
    #[serde(default)]
    pub years: Vec<i32>,
    pub measures: Vec<MeasureSpec>,
    /// Derive All-Island rows from the ROI and NI rows.
    #[serde(default)]
    pub all_island: Option<AllIslandRule>,
    /// Columns that must exist even though the pipeline does not read them.
    #[serde(default)]
    pub required_columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySpec {
    /// Raw column name.
    pub source: String,
    /// Cleaned column name.
    pub output: String,
    /// Aggregate labels removed before pivoting (e.g. "All ages").
    #[serde(default)]
    pub drop: Vec<String>,
    /// When non-empty, only these labels are kept.
    #[serde(default)]
    pub keep: Vec<String>,
}

/// Row filter on the statistic label, case-insensitive. Substring match
/// unless `exact` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticFilter {
    #[serde(default = "default_statistic_column")]
    pub column: String,
    pub contains: String,
    #[serde(default)]
    pub exact: bool,
}

impl StatisticFilter {
    pub fn matches(&self, label: &str) -> bool {
        if self.exact {
            label.eq_ignore_ascii_case(self.contains.trim())
        } else {
            label
                .to_lowercase()
                .contains(&self.contains.trim().to_lowercase())
        }
    }
}

/// Keep only rows whose `column` holds one of `keep`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub keep: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateMethod {
    /// ROI + NI, for counts.
    Sum,
    /// ROI and NI weighted by another dataset's measure, for medians and
    /// ratios.
    WeightedMean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllIslandRule {
    pub method: AggregateMethod,
    #[serde(default)]
    pub weights: Option<WeightSource>,
}

/// A measure of another catalog dataset keyed by (region, year) only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightSource {
    pub dataset: String,
    pub measure: String,
}

/// Binds one `UNIT` value to an output column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureSpec {
    /// Raw unit label, compared case-insensitively (`%`, `Number`). `*`
    /// takes every unit and is only valid for a single measure.
    pub unit: String,
    pub output: String,
    #[serde(default)]
    pub range: ValueRange,
    /// Expected total of each partition group, normally 100 for shares.
    #[serde(default)]
    pub sums_to: Option<f64>,
    #[serde(default)]
    pub tolerance: Option<f64>,
    /// Round and write without decimals.
    #[serde(default)]
    pub integer: bool,
    /// Round to this many decimal places before writing.
    #[serde(default)]
    pub decimals: Option<u32>,
}

pub const ANY_UNIT: &str = "*";

impl MeasureSpec {
    pub fn matches_unit(&self, unit: &str) -> bool {
        let want = self.unit.trim();
        want == ANY_UNIT || want.eq_ignore_ascii_case(unit)
    }
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("data/raw")
}

fn default_clean_dir() -> PathBuf {
    PathBuf::from("data/cleaned")
}

fn default_tolerance() -> f64 {
    0.5
}

fn default_download_url() -> String {
    "https://ws.cso.ie/public/api.restful/PxStat.Data.Cube_API.ReadDataset/{code}/CSV/1.0/en"
        .to_string()
}

fn default_region_column() -> String {
    "Ireland and Northern Ireland".to_string()
}

fn default_year_column() -> String {
    "Census Year".to_string()
}

fn default_unit_column() -> String {
    "UNIT".to_string()
}

fn default_value_column() -> String {
    "VALUE".to_string()
}

fn default_statistic_column() -> String {
    "Statistic Label".to_string()
}
