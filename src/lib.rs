// src/lib.rs
//! Cleaning pipeline for the joint CSO/NISRA census tables: raw PxStat CSV
//! exports in, tidy `region, year, <categories>, <measures>` tables out.

pub mod config;
pub mod error;
pub mod fetch;
pub mod process;
pub mod sources;

pub use config::PipelineConfig;
pub use error::{CleanError, Result};
pub use process::{CleaningReport, Pipeline};
