// src/fetch/mod.rs
pub mod discover;
pub mod download;

pub use discover::{
    extract_timestamp, latest_timestamped_file, FileResolver, ForcedFile, LatestTimestamped,
};
pub use download::{download_raw, raw_file_name};
