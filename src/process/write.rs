use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{CleanError, Result};
use crate::process::pivot::CleanedTable;

/// Render a value the same way on every run: whole numbers for integer
/// measures, shortest round-trip form otherwise.
pub fn format_value(v: f64, integer: bool) -> String {
    if integer {
        format!("{}", v.round() as i64)
    } else if v == 0.0 {
        // avoid "-0"
        "0".to_string()
    } else {
        format!("{}", v)
    }
}

/// Write `table` to `path`, replacing any previous output.
///
/// - Rows go to a hidden temp file in the same directory first
/// - Only a fully flushed file is renamed over `path`, so a failure leaves the
///   previous output untouched
#[tracing::instrument(level = "debug", skip(table, path), fields(path = %path.display(), rows = table.len()))]
pub fn write_cleaned_csv(table: &CleanedTable, path: &Path) -> Result<()> {
    // 1) Make sure the target directory exists
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| CleanError::io(dir, e))?;

    // 2) Write everything to the temp file
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "cleaned.csv".to_string());
    let tmp_path: PathBuf = dir.join(format!(".{}.tmp", file_name));

    let result = write_rows(table, &tmp_path);
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    // 3) Swap it into place
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        CleanError::io(path, e)
    })?;

    info!(path = %path.display(), rows = table.len(), "wrote cleaned table");
    Ok(())
}

fn write_rows(table: &CleanedTable, tmp_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(tmp_path).map_err(|e| CleanError::csv(tmp_path, e))?;
    wtr.write_record(table.header())
        .map_err(|e| CleanError::csv(tmp_path, e))?;

    for row in &table.rows {
        let mut record: Vec<String> = Vec::with_capacity(2 + row.key.categories.len() + row.values.len());
        record.push(row.key.region.as_str().to_string());
        record.push(row.key.year.to_string());
        record.extend(row.key.categories.iter().cloned());
        record.extend(
            row.values
                .iter()
                .zip(&table.integer_measures)
                .map(|(v, integer)| format_value(*v, *integer)),
        );
        wtr.write_record(&record)
            .map_err(|e| CleanError::csv(tmp_path, e))?;
    }

    wtr.flush().map_err(|e| CleanError::io(tmp_path, e))?;
    Ok(())
}
