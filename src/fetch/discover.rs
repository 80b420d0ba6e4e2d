// src/fetch/discover.rs
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use glob::{glob, Pattern};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{CleanError, Result};

/// PxStat download stamp, e.g. `CPNI16.20260108T010109.csv`.
static STAMP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{8}T\d{6})").expect("valid regex"));

/// Strategy for picking the raw file of a dataset.
///
/// Closures `Fn(&Path, &str) -> Result<PathBuf>` implement it, so tests can
/// hand the pipeline a fixed path instead of relying on what is on disk.
pub trait FileResolver {
    fn resolve(&self, dir: &Path, prefix: &str) -> Result<PathBuf>;
}

impl<F> FileResolver for F
where
    F: Fn(&Path, &str) -> Result<PathBuf>,
{
    fn resolve(&self, dir: &Path, prefix: &str) -> Result<PathBuf> {
        self(dir, prefix)
    }
}

/// Picks the newest `<prefix>.<YYYYMMDDTHHMMSS>.csv`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestTimestamped;

impl FileResolver for LatestTimestamped {
    fn resolve(&self, dir: &Path, prefix: &str) -> Result<PathBuf> {
        latest_timestamped_file(dir, prefix)
    }
}

/// Always returns `dir/<filename>`, failing if it does not exist.
#[derive(Debug, Clone)]
pub struct ForcedFile(pub String);

impl FileResolver for ForcedFile {
    fn resolve(&self, dir: &Path, _prefix: &str) -> Result<PathBuf> {
        let forced = dir.join(&self.0);
        if forced.is_file() {
            Ok(forced)
        } else {
            Err(CleanError::NotFound {
                dir: dir.to_path_buf(),
                pattern: self.0.clone(),
            })
        }
    }
}

/// Extract the download stamp from a filename, if it carries a valid one.
pub fn extract_timestamp(file_name: &str) -> Option<NaiveDateTime> {
    let caps = STAMP.captures(file_name)?;
    NaiveDateTime::parse_from_str(caps.get(1)?.as_str(), "%Y%m%dT%H%M%S").ok()
}

/// `true` when `file_name` is a CSV belonging to `prefix`: the name starts
/// with the prefix and the next character is not alphanumeric, so `CPNI1`
/// never claims `CPNI16...`.
fn belongs_to(file_name: &str, prefix: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    if !lower.ends_with(".csv") {
        return false;
    }
    match file_name.strip_prefix(prefix) {
        Some(rest) => rest
            .chars()
            .next()
            .map_or(false, |c| !c.is_alphanumeric()),
        None => false,
    }
}

/// Return the most recently stamped raw file for `prefix` in `dir`.
///
/// Candidates are ordered by (stamp, filename); unstamped files sort before
/// stamped ones and equal stamps fall back to the greater filename.
#[tracing::instrument(level = "debug", skip(dir), fields(dir = %dir.display()))]
pub fn latest_timestamped_file(dir: &Path, prefix: &str) -> Result<PathBuf> {
    let pattern = format!(
        "{}/{}*",
        Pattern::escape(&dir.to_string_lossy()),
        Pattern::escape(prefix)
    );
    let not_found = || CleanError::NotFound {
        dir: dir.to_path_buf(),
        pattern: format!("{}*.csv", prefix),
    };

    let entries = glob(&pattern).map_err(|e| CleanError::Config(e.to_string()))?;
    let mut best: Option<(Option<NaiveDateTime>, String, PathBuf)> = None;
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if !belongs_to(&name, prefix) {
            continue;
        }
        let stamp = extract_timestamp(&name);
        let candidate = (stamp, name, path);
        let newer = match &best {
            None => true,
            Some((s, n, _)) => (&candidate.0, &candidate.1) > (s, n),
        };
        if newer {
            best = Some(candidate);
        }
    }

    let (_, name, path) = best.ok_or_else(not_found)?;
    debug!(file = %name, "resolved raw file");
    Ok(path)
}
