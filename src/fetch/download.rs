// src/fetch/download.rs
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use reqwest::blocking::Client;
use tracing::info;
use url::Url;

use crate::error::{CleanError, Result};

/// Conventional raw filename: `<code>.<YYYYMMDDTHHMMSS>.csv`.
pub fn raw_file_name(code: &str, stamp: NaiveDateTime) -> String {
    format!("{}.{}.csv", code, stamp.format("%Y%m%dT%H%M%S"))
}

/// Download one PxStat CSV export and save it under `dest_dir` with a
/// timestamped name. Returns the saved path.
///
/// The body goes to a temp file first, so an interrupted download never
/// becomes the "latest" raw file.
#[tracing::instrument(level = "info", skip(client, dest_dir), fields(dest = %dest_dir.display()))]
pub fn download_raw(
    client: &Client,
    url_str: &str,
    dest_dir: &Path,
    code: &str,
    stamp: NaiveDateTime,
) -> Result<PathBuf> {
    let url = Url::parse(url_str)
        .map_err(|e| CleanError::Config(format!("bad download url `{}`: {}", url_str, e)))?;

    fs::create_dir_all(dest_dir).map_err(|e| CleanError::io(dest_dir, e))?;
    let file_name = raw_file_name(code, stamp);
    let dest_path = dest_dir.join(&file_name);
    let tmp_path = dest_dir.join(format!(".{}.part", file_name));

    let resp = client.get(url.as_str()).send()?.error_for_status()?;
    let bytes = resp.bytes()?;

    fs::write(&tmp_path, &bytes).map_err(|e| CleanError::io(&tmp_path, e))?;
    fs::rename(&tmp_path, &dest_path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        CleanError::io(&dest_path, e)
    })?;

    info!(path = %dest_path.display(), bytes = bytes.len(), "saved raw export");
    Ok(dest_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::discover::{extract_timestamp, latest_timestamped_file};
    use chrono::NaiveDate;

    #[test]
    fn raw_names_are_discoverable() -> anyhow::Result<()> {
        let stamp = NaiveDate::from_ymd_opt(2026, 1, 8)
            .unwrap()
            .and_hms_opt(1, 1, 9)
            .unwrap();
        let name = raw_file_name("CPNI16", stamp);
        assert_eq!(name, "CPNI16.20260108T010109.csv");
        assert_eq!(extract_timestamp(&name), Some(stamp));

        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join(&name), "x")?;
        assert_eq!(
            latest_timestamped_file(dir.path(), "CPNI16")?,
            dir.path().join(&name)
        );
        Ok(())
    }

    #[test]
    fn invalid_url_is_rejected_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = NaiveDate::from_ymd_opt(2026, 1, 8)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let err = download_raw(&Client::new(), "not a url", dir.path(), "CPNI16", stamp)
            .unwrap_err();
        assert!(matches!(err, CleanError::Config(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
