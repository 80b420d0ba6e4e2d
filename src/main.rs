use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use censusclean::{
    fetch::download_raw,
    sources::{load_sources, uncovered_datasets},
    CleaningReport, Pipeline, PipelineConfig,
};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Clean CSO/NISRA census exports into tidy ROI / NI comparison tables"
)]
struct Cli {
    /// Dataset catalog (YAML). The built-in catalog is used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the catalog's raw directory.
    #[arg(long, global = true)]
    raw_dir: Option<PathBuf>,
    /// Override the catalog's cleaned directory.
    #[arg(long, global = true)]
    clean_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the catalog.
    List,
    /// Clean one or more datasets.
    Clean {
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        names: Vec<String>,
        #[arg(long)]
        all: bool,
        /// Use this raw file instead of the latest one (single dataset only).
        #[arg(long, conflicts_with = "all")]
        raw_file: Option<PathBuf>,
        /// Print reports as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Download raw exports into the raw directory.
    Fetch {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Validate sources.csv and report catalog coverage.
    Sources {
        #[arg(long, default_value = "sources.csv")]
        file: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut cfg = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading catalog {}", path.display()))?,
        None => PipelineConfig::builtin().context("loading built-in catalog")?,
    };
    if let Some(dir) = &cli.raw_dir {
        cfg.raw_dir = dir.clone();
    }
    if let Some(dir) = &cli.clean_dir {
        cfg.clean_dir = dir.clone();
    }
    Ok(cfg)
}

fn print_report(report: &CleaningReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
    } else {
        println!(
            "{:<24} {:>6} rows -> {} (raw {} rows, dropped: categories {}, units {}, \
             years {}, statistic {}, filters {}; filtered: non-numeric {}, \
             out-of-range {}; derived All-Island {})",
            report.dataset,
            report.rows_written,
            report.output_path.display(),
            report.stats.raw_rows,
            report.stats.dropped_categories,
            report.stats.dropped_units,
            report.stats.dropped_years,
            report.stats.dropped_statistic,
            report.stats.dropped_filters,
            report.stats.non_numeric,
            report.stats.out_of_range,
            report.stats.derived_all_island,
        );
    }
    Ok(())
}

fn run(cli: Cli) -> Result<bool> {
    let cfg = load_config(&cli)?;

    match cli.command {
        Command::List => {
            for ds in &cfg.datasets {
                println!(
                    "{:<24} {:<20} {:<8} {}",
                    ds.name,
                    ds.theme,
                    ds.prefix,
                    cfg.output_path_for(ds).display()
                );
            }
            Ok(true)
        }

        Command::Clean {
            names,
            all,
            raw_file,
            json,
        } => {
            if raw_file.is_some() && names.len() != 1 {
                anyhow::bail!("--raw-file needs exactly one dataset name");
            }
            let pipeline = Pipeline::new(cfg);
            let results = if all {
                pipeline.run_all()
            } else {
                names
                    .iter()
                    .map(|n| (n.clone(), pipeline.run(n, raw_file.as_deref())))
                    .collect()
            };

            let mut ok = true;
            for (name, result) in results {
                match result {
                    Ok(report) => print_report(&report, json)?,
                    Err(e) => {
                        error!(dataset = %name, error = %e, "failed");
                        eprintln!("{}: {}", name, e);
                        ok = false;
                    }
                }
            }
            Ok(ok)
        }

        Command::Fetch { names } => {
            let client = reqwest::blocking::Client::builder()
                .user_agent(concat!("censusclean/", env!("CARGO_PKG_VERSION")))
                .build()
                .context("building HTTP client")?;
            let stamp = chrono::Local::now().naive_local();
            for name in &names {
                let ds = cfg.dataset(name)?;
                let url = cfg.download_url_for(ds);
                let path = download_raw(&client, &url, &cfg.raw_dir_for(ds), &ds.prefix, stamp)
                    .with_context(|| format!("downloading {} from {}", ds.prefix, url))?;
                println!("{} -> {}", name, path.display());
            }
            Ok(true)
        }

        Command::Sources { file } => {
            let records = load_sources(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            info!(records = records.len(), "sources valid");
            let missing = uncovered_datasets(&records, &cfg);
            for ds in &missing {
                println!("uncovered: {} ({})", ds.name, ds.prefix);
            }
            println!(
                "{} source records, {}/{} datasets covered",
                records.len(),
                cfg.datasets.len() - missing.len(),
                cfg.datasets.len()
            );
            Ok(missing.is_empty())
        }
    }
}

fn main() -> ExitCode {
    // 1) init logging
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    // 2) parse args and dispatch
    let cli = Cli::parse();
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            warn!("finished with failures");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
