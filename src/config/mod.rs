// src/config/mod.rs
pub mod types;

pub use types::{
    AggregateMethod, AllIslandRule, CategorySpec, DatasetSpec, MeasureSpec, PipelineConfig,
    RowFilter, StatisticFilter, WeightSource, ANY_UNIT,
};

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CleanError, Result};

/// The catalog shipped with the crate.
const BUILTIN_CATALOG: &str = include_str!("../../config/datasets.yaml");

impl PipelineConfig {
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN_CATALOG)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let cfg: PipelineConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[tracing::instrument(level = "debug", skip(path), fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| CleanError::io(path, e))?;
        let cfg = Self::from_yaml(&text)?;
        debug!(datasets = cfg.datasets.len(), "loaded catalog");
        Ok(cfg)
    }

    pub fn dataset(&self, name: &str) -> Result<&DatasetSpec> {
        self.datasets
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| CleanError::Config(format!("unknown dataset `{}`", name)))
    }

    pub fn raw_dir_for(&self, spec: &DatasetSpec) -> PathBuf {
        self.raw_dir.join(&spec.theme)
    }

    pub fn output_path_for(&self, spec: &DatasetSpec) -> PathBuf {
        self.clean_dir
            .join(&spec.theme)
            .join(format!("{}.csv", spec.name))
    }

    pub fn download_url_for(&self, spec: &DatasetSpec) -> String {
        self.download_url.replace("{code}", &spec.prefix)
    }

    /// Reject catalogs that could only fail later, mid-run.
    pub fn validate(&self) -> Result<()> {
        if self.sum_tolerance.is_nan() || self.sum_tolerance < 0.0 {
            return Err(CleanError::Config(format!(
                "sum_tolerance must be >= 0, got {}",
                self.sum_tolerance
            )));
        }
        let mut names = HashSet::new();
        for ds in &self.datasets {
            if !names.insert(ds.name.as_str()) {
                return Err(CleanError::Config(format!(
                    "dataset `{}` is defined twice",
                    ds.name
                )));
            }
            ds.validate()?;
        }
        for ds in &self.datasets {
            self.validate_weights(ds)?;
        }
        Ok(())
    }

    /// Weights must come from an earlier dataset with no category columns, so
    /// they are keyed by (region, year) alone and written before they are read.
    fn validate_weights(&self, ds: &DatasetSpec) -> Result<()> {
        let Some(src) = ds.all_island.as_ref().and_then(|r| r.weights.as_ref()) else {
            return Ok(());
        };
        if src.dataset == ds.name {
            return Err(ds.invalid("weights cannot come from the dataset itself"));
        }
        let position = |name: &str| self.datasets.iter().position(|d| d.name == name);
        let at = position(&src.dataset).ok_or_else(|| {
            ds.invalid(format_args!("unknown weights dataset `{}`", src.dataset))
        })?;
        if position(&ds.name).map_or(false, |own| own < at) {
            return Err(ds.invalid(format_args!(
                "weights dataset `{}` must be listed before it",
                src.dataset
            )));
        }
        let weights = &self.datasets[at];
        if !weights.categories.is_empty() {
            return Err(ds.invalid(format_args!(
                "weights dataset `{}` must not have category columns",
                src.dataset
            )));
        }
        if !weights.measures.iter().any(|m| m.output == src.measure) {
            return Err(ds.invalid(format_args!(
                "weights dataset `{}` has no measure `{}`",
                src.dataset, src.measure
            )));
        }
        Ok(())
    }
}

impl DatasetSpec {
    fn invalid(&self, msg: impl std::fmt::Display) -> CleanError {
        CleanError::Config(format!("dataset `{}`: {}", self.name, msg))
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.prefix.trim().is_empty() {
            return Err(self.invalid("name and prefix must be non-empty"));
        }
        if self.measures.is_empty() {
            return Err(self.invalid("at least one measure is required"));
        }
        if self.measures.len() > 1 && self.measures.iter().any(|m| m.unit.trim() == ANY_UNIT) {
            return Err(self.invalid("unit `*` needs to be the only measure"));
        }
        if let Some(f) = self.filters.iter().find(|f| f.keep.is_empty()) {
            return Err(self.invalid(format_args!("filter on `{}` keeps nothing", f.column)));
        }

        let mut outputs = HashSet::new();
        for col in self.output_columns() {
            if !outputs.insert(col.to_lowercase()) {
                return Err(self.invalid(format_args!("output column `{}` repeats", col)));
            }
        }

        let mut units = HashSet::new();
        for m in &self.measures {
            if !units.insert(m.unit.to_lowercase()) {
                return Err(self.invalid(format_args!("unit `{}` bound twice", m.unit)));
            }
            if m.tolerance.map_or(false, |t| t.is_nan() || t < 0.0) {
                return Err(self.invalid(format_args!("tolerance of `{}` must be >= 0", m.output)));
            }
            if let Some(max) = m.range.max {
                if max < m.range.min {
                    return Err(self.invalid(format_args!("range of `{}` is empty", m.output)));
                }
            }
            if m.range.min < 0.0 {
                return Err(self.invalid(format_args!(
                    "range of `{}` admits negative values",
                    m.output
                )));
            }
            if m.sums_to.is_some() && self.categories.is_empty() {
                return Err(self.invalid(format_args!(
                    "`{}` has sums_to but there is no category to partition",
                    m.output
                )));
            }
            if m.decimals.map_or(false, |d| d > 10) {
                return Err(self.invalid(format_args!("decimals of `{}` above 10", m.output)));
            }
        }

        if let Some(rule) = &self.all_island {
            match rule.method {
                AggregateMethod::WeightedMean if rule.weights.is_none() => {
                    return Err(self.invalid("weighted_mean needs `weights`"));
                }
                AggregateMethod::Sum if self.measures.iter().any(|m| m.sums_to.is_some()) => {
                    return Err(self.invalid("summed All-Island rows cannot hold shares"));
                }
                _ => {}
            }
        }

        if let Some(p) = &self.partition {
            if !self.categories.iter().any(|c| &c.output == p) {
                return Err(self.invalid(format_args!("partition `{}` is not a category", p)));
            }
        }
        Ok(())
    }

    /// Every raw column the pipeline reads, in a stable order.
    pub fn required_columns(&self) -> Vec<String> {
        let mut cols: Vec<String> = vec![
            self.region_column.clone(),
            self.year_column.clone(),
            self.unit_column.clone(),
            self.value_column.clone(),
        ];
        if let Some(stat) = &self.statistic {
            cols.push(stat.column.clone());
        }
        cols.extend(self.filters.iter().map(|f| f.column.clone()));
        cols.extend(self.categories.iter().map(|c| c.source.clone()));
        cols.extend(self.required_columns.iter().cloned());

        let mut seen = HashSet::new();
        cols.retain(|c| seen.insert(c.clone()));
        cols
    }

    /// Header of the cleaned CSV.
    pub fn output_columns(&self) -> Vec<&str> {
        let mut cols = vec!["region", "year"];
        cols.extend(self.categories.iter().map(|c| c.output.as_str()));
        cols.extend(self.measures.iter().map(|m| m.output.as_str()));
        cols
    }

    /// Index (into `categories`) of the mutually exclusive category.
    pub fn partition_index(&self) -> usize {
        self.partition
            .as_ref()
            .and_then(|p| self.categories.iter().position(|c| &c.output == p))
            .unwrap_or(self.categories.len().saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::utils::ValueRange;

    const MINIMAL: &str = r#"
datasets:
  - name: household_size
    theme: housing_education
    prefix: CPNI11
    categories:
      - source: Household Size
        output: household_size
        drop: ["All private households"]
    measures:
      - unit: "%"
        output: percentage
        range: { min: 0, max: 100 }
        sums_to: 100
      - unit: Number
        output: number
        integer: true
"#;

    #[test]
    fn defaults_are_filled_in() {
        let cfg = PipelineConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(cfg.raw_dir, PathBuf::from("data/raw"));
        assert_eq!(cfg.sum_tolerance, 0.5);
        let ds = cfg.dataset("household_size").unwrap();
        assert_eq!(ds.region_column, "Ireland and Northern Ireland");
        assert_eq!(ds.year_column, "Census Year");
        assert_eq!(ds.measures[0].range, ValueRange::PERCENTAGE);
        assert_eq!(ds.measures[1].range, ValueRange::NON_NEGATIVE);
        assert_eq!(
            ds.output_columns(),
            vec!["region", "year", "household_size", "percentage", "number"]
        );
        assert_eq!(
            cfg.output_path_for(ds),
            PathBuf::from("data/cleaned/housing_education/household_size.csv")
        );
        assert!(ds
            .required_columns()
            .contains(&"Household Size".to_string()));
        assert!(ds.required_columns().contains(&"UNIT".to_string()));
    }

    #[test]
    fn unknown_dataset_is_a_config_error() {
        let cfg = PipelineConfig::from_yaml(MINIMAL).unwrap();
        assert!(matches!(cfg.dataset("nope"), Err(CleanError::Config(_))));
    }

    #[test]
    fn duplicate_units_are_rejected() {
        let text = MINIMAL.replace("unit: Number", "unit: \"%\"");
        assert!(matches!(
            PipelineConfig::from_yaml(&text),
            Err(CleanError::Config(_))
        ));
    }

    #[test]
    fn bad_partition_is_rejected() {
        let text = MINIMAL.replace(
            "    measures:",
            "    partition: sex\n    measures:",
        );
        assert!(matches!(
            PipelineConfig::from_yaml(&text),
            Err(CleanError::Config(_))
        ));
    }

    #[test]
    fn builtin_catalog_is_valid() {
        let cfg = PipelineConfig::builtin().unwrap();
        assert_eq!(cfg.datasets.len(), 20);
        assert_eq!(cfg.datasets[0].name, "population_over_time");
        assert!(cfg.dataset("migration").is_ok());
        assert_eq!(
            cfg.download_url_for(cfg.dataset("migration").unwrap()),
            "https://ws.cso.ie/public/api.restful/PxStat.Data.Cube_API.ReadDataset/CPNI16/CSV/1.0/en"
        );

        let marriage = cfg.dataset("marriage").unwrap();
        assert_eq!(marriage.region_column, "Region");
        assert_eq!(
            marriage.required_columns(),
            vec!["Region", "Census Year", "UNIT", "VALUE", "Statistic Label"]
        );

        let median = cfg.dataset("median_age_over_time").unwrap();
        let rule = median.all_island.as_ref().unwrap();
        assert_eq!(rule.method, AggregateMethod::WeightedMean);
        assert_eq!(
            rule.weights.as_ref().map(|w| w.dataset.as_str()),
            Some("population_over_time")
        );
    }

    const DERIVED: &str = r#"
datasets:
  - name: population
    theme: demographics
    prefix: CPNI01
    year_column: "Year"
    statistic: { contains: Population, exact: true }
    filters:
      - column: Sex
        keep: ["Both sexes"]
    measures:
      - unit: Number
        output: population
        integer: true
  - name: median_age
    theme: demographics
    prefix: CPNI03
    measures:
      - unit: Number
        output: median_age
        decimals: 1
    all_island:
      method: weighted_mean
      weights: { dataset: population, measure: population }
"#;

    #[test]
    fn filters_and_all_island_rules_parse() {
        let cfg = PipelineConfig::from_yaml(DERIVED).unwrap();
        let pop = cfg.dataset("population").unwrap();
        assert!(pop.categories.is_empty());
        assert!(pop.statistic.as_ref().unwrap().exact);
        assert_eq!(pop.filters[0].keep, vec!["Both sexes".to_string()]);
        assert_eq!(
            pop.required_columns(),
            vec![
                "Ireland and Northern Ireland",
                "Year",
                "UNIT",
                "VALUE",
                "Statistic Label",
                "Sex"
            ]
        );
        assert_eq!(pop.output_columns(), vec!["region", "year", "population"]);
        assert_eq!(cfg.dataset("median_age").unwrap().measures[0].decimals, Some(1));
    }

    #[test]
    fn exact_statistic_does_not_match_substrings() {
        let filter = StatisticFilter {
            column: "Statistic Label".into(),
            contains: "Population".into(),
            exact: true,
        };
        assert!(filter.matches("population"));
        assert!(!filter.matches("Population aged 15 and over"));
        let loose = StatisticFilter { exact: false, ..filter };
        assert!(loose.matches("Population aged 15 and over"));
    }

    #[test]
    fn broken_weight_sources_are_rejected() {
        let cases = [
            // unknown dataset
            DERIVED.replace("dataset: population,", "dataset: people,"),
            // unknown measure
            DERIVED.replace("measure: population }", "measure: persons }"),
            // weighted mean without weights
            DERIVED.replace(
                "      weights: { dataset: population, measure: population }\n",
                "",
            ),
            // weights from itself
            DERIVED.replace("dataset: population,", "dataset: median_age,"),
        ];
        for text in &cases {
            assert!(
                matches!(PipelineConfig::from_yaml(text), Err(CleanError::Config(_))),
                "accepted:\n{text}"
            );
        }
    }

    #[test]
    fn weights_must_be_cleaned_first() {
        let (pop, median) = DERIVED
            .trim_start_matches("\ndatasets:\n")
            .split_once("  - name: median_age")
            .unwrap();
        let swapped = format!("datasets:\n  - name: median_age{}{}", median, pop);
        match PipelineConfig::from_yaml(&swapped) {
            Err(CleanError::Config(msg)) => assert!(msg.contains("listed before")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn wildcard_unit_and_share_rules() {
        let two_with_wildcard = MINIMAL.replace("unit: Number", "unit: \"*\"");
        let summed_shares = MINIMAL.replace(
            "    measures:",
            "    all_island: { method: sum }\n    measures:",
        );
        let shares_without_categories = DERIVED.replace(
            "        output: median_age\n",
            "        output: median_age\n        sums_to: 100\n",
        );
        for text in [two_with_wildcard, summed_shares, shares_without_categories] {
            assert!(matches!(
                PipelineConfig::from_yaml(&text),
                Err(CleanError::Config(_))
            ));
        }
    }
}
