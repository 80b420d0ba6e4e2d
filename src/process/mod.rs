// src/process/mod.rs
pub mod aggregate;
pub mod pipeline;
pub mod pivot;
pub mod raw_table;
pub mod regions;
pub mod utils;
pub mod write;
pub mod year_parser;

use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::{debug, warn};

use crate::error::{CleanError, Result};

pub use aggregate::{derive_all_island, load_weights, WeightTable};
pub use pipeline::{clean_table, CleaningReport, DropStats, Pipeline};
pub use pivot::{CleanedTable, RowKey, TidyRow};
pub use raw_table::RawTable;
pub use regions::{map_regions, Region, RegionMap};
pub use utils::{clean_numeric_column, clean_str, clean_string_column, NumericFilter, ValueRange};
pub use write::write_cleaned_csv;
pub use year_parser::parse_census_year;

/// Load a raw export: header row plus string cells.
///
/// Header names go through `clean_str` so a BOM or stray quotes never hide a
/// column. Records with a different field count are accepted and padded.
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_raw_csv<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| CleanError::io(path, e))?;
    let table = read_raw_csv(file).map_err(|e| CleanError::csv(path, e))?;
    debug!(rows = table.len(), cols = table.headers.len(), "loaded raw table");
    Ok(table)
}

/// Same as [`load_raw_csv`] over any reader.
pub fn read_raw_csv<R: Read>(reader: R) -> std::result::Result<RawTable, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(clean_str).collect();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record?;
        if record.len() > headers.len() {
            warn!(record = idx, fields = record.len(), "record wider than header, extra fields ignored");
        }
        rows.push(record.iter().take(headers.len()).map(str::to_string).collect());
    }
    Ok(RawTable::new(headers, rows))
}

/// Check that every column in `cols` is present.
///
/// The error lists exactly the missing columns in the order asked for, plus
/// everything the table does have.
pub fn ensure_cols<S: AsRef<str>>(table: &RawTable, cols: &[S]) -> Result<()> {
    let missing: Vec<String> = cols
        .iter()
        .map(AsRef::as_ref)
        .filter(|c| table.column_index(c).is_none())
        .map(str::to_string)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CleanError::Schema {
            missing,
            found: table.headers.clone(),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    pub(crate) fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,censusclean::process=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    const SAMPLE: &str = "\u{feff}\"Statistic Label\",\"Census Year\",\"Ireland and Northern Ireland\",\"UNIT\",\"VALUE\"\n\
        \"Population\",\"2021/2022\",\"Ireland\",\"Number\",\"5149139\"\n\
        \"Population\",\"2021/2022\",\"Northern Ireland\",\"Number\"\n";

    #[test]
    fn loads_and_cleans_headers() -> Result<()> {
        init_test_logging();
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(SAMPLE.as_bytes())?;

        let table = load_raw_csv(file.path())?;
        assert_eq!(
            table.headers,
            vec!["Statistic Label", "Census Year", "Ireland and Northern Ireland", "UNIT", "VALUE"]
        );
        assert_eq!(table.len(), 2);
        // short record padded
        assert_eq!(table.rows[1][4], "");
        Ok(())
    }

    #[test]
    fn missing_unit_is_reported_exactly() -> Result<()> {
        let table = read_raw_csv(
            "Statistic Label,Region,Census Year,VALUE\nx,Ireland,2022,1\n".as_bytes(),
        )?;
        match ensure_cols(&table, &["Region", "UNIT", "VALUE"]) {
            Err(CleanError::Schema { missing, found }) => {
                assert_eq!(missing, vec!["UNIT".to_string()]);
                assert_eq!(found.len(), 4);
            }
            other => panic!("expected Schema, got {other:?}"),
        }
        ensure_cols(&table, &["Region", "VALUE"])?;
        Ok(())
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_raw_csv("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, CleanError::Io { .. }));
    }
}
