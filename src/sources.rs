// src/sources.rs
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::config::{DatasetSpec, PipelineConfig};
use crate::error::{CleanError, Result};
use crate::process::{clean_str, ensure_cols, RawTable};

pub const SOURCE_COLUMNS: [&str; 5] = ["theme", "title", "publication_code", "access_date", "url"];

/// One row of `sources.csv`: where a published table came from and when it
/// was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub theme: String,
    pub title: String,
    pub publication_code: String,
    /// ISO `YYYY-MM-DD`.
    pub access_date: NaiveDate,
    pub url: Url,
}

#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_sources<P: AsRef<Path>>(path: P) -> Result<Vec<SourceRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| CleanError::io(path, e))?;
    let records = read_sources(file)?;
    debug!(records = records.len(), "loaded sources");
    Ok(records)
}

/// Parse source records from any reader. Header names are matched after
/// cleanup and lowercasing; record errors carry their line number.
pub fn read_sources<R: Read>(reader: R) -> Result<Vec<SourceRecord>> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);

    // 1) Normalise and check the header
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| CleanError::Source {
            line: 1,
            detail: e.to_string(),
        })?
        .iter()
        .map(|h| clean_str(h).to_lowercase())
        .collect();
    ensure_cols(&RawTable::new(headers.clone(), Vec::new()), &SOURCE_COLUMNS)?;
    let header_record = StringRecord::from(headers);

    // 2) Typed records
    let mut out = Vec::new();
    for result in rdr.records() {
        let raw = result.map_err(|e| CleanError::Source {
            line: e.position().map_or(0, |p| p.line()),
            detail: e.to_string(),
        })?;
        let line = raw.position().map_or(0, |p| p.line());
        let trimmed: StringRecord = raw.iter().map(clean_str).collect();
        let mut record: SourceRecord = trimmed
            .deserialize(Some(&header_record))
            .map_err(|e| CleanError::Source {
                line,
                detail: e.to_string(),
            })?;
        record.publication_code = record.publication_code.to_uppercase();
        if record.title.is_empty() || record.publication_code.is_empty() {
            return Err(CleanError::Source {
                line,
                detail: "title and publication_code must be non-empty".to_string(),
            });
        }
        out.push(record);
    }
    Ok(out)
}

/// Catalog datasets whose publication code has no source record.
pub fn uncovered_datasets<'a>(
    records: &[SourceRecord],
    config: &'a PipelineConfig,
) -> Vec<&'a DatasetSpec> {
    let codes: HashSet<&str> = records
        .iter()
        .map(|r| r.publication_code.as_str())
        .collect();
    let missing: Vec<&DatasetSpec> = config
        .datasets
        .iter()
        .filter(|d| !codes.contains(d.prefix.to_uppercase().as_str()))
        .collect();
    for d in &missing {
        warn!(dataset = %d.name, code = %d.prefix, "no source record");
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const GOOD: &str = "\
Theme,Title,Publication_Code,Access_Date,URL
housing_education,Household size,cpni11,2026-01-08,https://data.cso.ie/table/CPNI11
social_indicators,\" Religion \",CPNI20,2026-01-08,https://data.cso.ie/table/CPNI20
";

    #[test]
    fn parses_and_normalises() -> Result<()> {
        let records = read_sources(GOOD.as_bytes())?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].publication_code, "CPNI11");
        assert_eq!(records[1].title, "Religion");
        assert_eq!(records[0].access_date, NaiveDate::from_ymd_opt(2026, 1, 8).unwrap());
        assert_eq!(records[1].url.host_str(), Some("data.cso.ie"));
        Ok(())
    }

    #[test]
    fn missing_column_is_schema_error() {
        let text = "theme,title,publication_code,url\nx,y,CPNI11,https://example.org\n";
        match read_sources(text.as_bytes()) {
            Err(CleanError::Schema { missing, .. }) => {
                assert_eq!(missing, vec!["access_date".to_string()])
            }
            other => panic!("expected Schema, got {other:?}"),
        }
    }

    #[test]
    fn bad_date_and_relative_url_carry_line() {
        let bad_date = "theme,title,publication_code,access_date,url\n\
                        a,b,CPNI11,2026-01-08,https://example.org\n\
                        a,b,CPNI14,08/01/2026,https://example.org\n";
        assert!(matches!(
            read_sources(bad_date.as_bytes()),
            Err(CleanError::Source { line: 3, .. })
        ));

        let relative = "theme,title,publication_code,access_date,url\n\
                        a,b,CPNI11,2026-01-08,/table/CPNI11\n";
        assert!(matches!(
            read_sources(relative.as_bytes()),
            Err(CleanError::Source { line: 2, .. })
        ));
    }

    #[test]
    fn coverage_against_builtin_catalog() -> Result<()> {
        let cfg = PipelineConfig::builtin()?;
        let records = read_sources(GOOD.as_bytes())?;
        let missing = uncovered_datasets(&records, &cfg);
        assert!(missing.iter().all(|d| d.prefix != "CPNI11" && d.prefix != "CPNI20"));
        assert!(missing.iter().any(|d| d.name == "migration"));
        Ok(())
    }

    #[test]
    fn shipped_sources_file_is_valid() -> Result<()> {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("sources.csv");
        let records = load_sources(&path)?;
        let cfg = PipelineConfig::builtin()?;
        assert!(uncovered_datasets(&records, &cfg).is_empty());
        Ok(())
    }
}
