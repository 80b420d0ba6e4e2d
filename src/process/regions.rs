use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CleanError, Result};
use crate::process::utils::clean_str;

/// The closed set of geographies a cleaned table may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "ROI")]
    Roi,
    #[serde(rename = "NI")]
    Ni,
    #[serde(rename = "All-Island")]
    AllIsland,
}

impl Region {
    pub const ALL: [Region; 3] = [Region::Roi, Region::Ni, Region::AllIsland];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Roi => "ROI",
            Region::Ni => "NI",
            Region::AllIsland => "All-Island",
        }
    }

    /// Long form used on dashboard axes.
    pub fn display_name(&self) -> &'static str {
        match self {
            Region::Roi => "Republic of Ireland",
            Region::Ni => "Northern Ireland",
            Region::AllIsland => "All-Island",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const DEFAULT_ALIASES: &[(&str, Region)] = &[
    ("Republic of Ireland", Region::Roi),
    ("Ireland", Region::Roi),
    ("State", Region::Roi),
    ("ROI", Region::Roi),
    ("Northern Ireland", Region::Ni),
    ("NI", Region::Ni),
    ("N. Ireland", Region::Ni),
    ("All-Island", Region::AllIsland),
    ("All Island", Region::AllIsland),
    ("Island of Ireland", Region::AllIsland),
];

/// Case-insensitive lookup from raw export labels to `Region`.
#[derive(Debug, Clone)]
pub struct RegionMap {
    aliases: HashMap<String, Region>,
}

fn alias_key(label: &str) -> String {
    clean_str(label).to_lowercase()
}

impl Default for RegionMap {
    fn default() -> Self {
        let aliases = DEFAULT_ALIASES
            .iter()
            .map(|(label, region)| (alias_key(label), *region))
            .collect();
        Self { aliases }
    }
}

impl RegionMap {
    /// Default aliases plus `extra`; entries in `extra` win on conflict.
    pub fn with_aliases(extra: &BTreeMap<String, Region>) -> Self {
        let mut map = Self::default();
        for (label, region) in extra {
            map.aliases.insert(alias_key(label), *region);
        }
        map
    }

    pub fn lookup(&self, label: &str) -> Option<Region> {
        self.aliases.get(&alias_key(label)).copied()
    }

    /// Map a single label, failing with `UnmappedRegion` if it is unknown.
    pub fn map_region(&self, label: &str) -> Result<Region> {
        self.lookup(label).ok_or_else(|| CleanError::UnmappedRegion {
            labels: vec![clean_str(label)],
        })
    }
}

/// Map a whole column. Every unknown label is collected (sorted, unique) into
/// one `UnmappedRegion` error; nothing is dropped or defaulted.
pub fn map_regions<S: AsRef<str>>(labels: &[S], map: &RegionMap) -> Result<Vec<Region>> {
    let mut unknown = BTreeSet::new();
    let mut out = Vec::with_capacity(labels.len());
    for label in labels {
        match map.lookup(label.as_ref()) {
            Some(region) => out.push(region),
            None => {
                unknown.insert(clean_str(label.as_ref()));
            }
        }
    }
    if unknown.is_empty() {
        Ok(out)
    } else {
        Err(CleanError::UnmappedRegion {
            labels: unknown.into_iter().collect(),
        })
    }
}
