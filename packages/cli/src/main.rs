#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the WWTP locator.
//!
//! Each subcommand runs one pipeline stage and writes its result as a CSV
//! working file: normalize a source, match two sources, reconcile the
//! candidate list, acquire tiles. `acquire` re-runs this binary with the
//! hidden `acquire-shard` subcommand once per shard.
//!
//! Uses `indicatif-log-bridge` (via [`wwtp_cli_utils::init_logger`]) to
//! route `log` output through `indicatif::MultiProgress` so that log lines
//! and progress bars never fight for the terminal.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "wwtp",
    about = "Wastewater treatment plant reconciliation and satellite tile acquisition"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Input layout of the community dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CommunityFormat {
    /// Overpass API JSON response (`[out:json]`)
    Overpass,
    /// Manually tagged CSV with WKT centroids
    Tagged,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize the HydroWASTE inventory into a points CSV
    Hydro {
        /// HydroWASTE CSV (Latin-1)
        #[arg(long)]
        input: PathBuf,
        /// State boundary `GeoJSON` (`STUSPS` or `NAME` property per feature)
        #[arg(long)]
        boundaries: PathBuf,
        /// Keep only rows from this country
        #[arg(long, default_value = wwtp_source::hydro::DEFAULT_COUNTRY)]
        country: String,
        /// Output points CSV
        #[arg(long)]
        output: PathBuf,
    },
    /// Normalize the EPA permit `GeoJSON` into a points CSV
    Regulatory {
        /// EPA facility `FeatureCollection`
        #[arg(long)]
        input: PathBuf,
        /// Output points CSV
        #[arg(long)]
        output: PathBuf,
    },
    /// Normalize a saved `OpenStreetMap` extract into a points CSV
    Community {
        /// Overpass JSON response or tagged CSV
        #[arg(long)]
        input: PathBuf,
        /// Input layout
        #[arg(long, value_enum, default_value_t = CommunityFormat::Overpass)]
        format: CommunityFormat,
        /// State the Overpass query covered (name or code); required for
        /// Overpass input
        #[arg(long)]
        state: Option<String>,
        /// Output points CSV
        #[arg(long)]
        output: PathBuf,
    },
    /// Query Overpass for wastewater plants, state by state
    FetchCommunity {
        /// Comma-separated states (names or codes). Defaults to every state.
        #[arg(long)]
        states: Option<String>,
        /// Overpass interpreter URL
        #[arg(long, default_value = wwtp_source::overpass::DEFAULT_ENDPOINT)]
        endpoint: String,
        /// Output points CSV
        #[arg(long)]
        output: PathBuf,
    },
    /// Normalize a combined candidate CSV into a points CSV
    CandidatesCsv {
        /// Candidate CSV (`wwtp_name`, `lat`, `lon`, `state`, optional `id`)
        #[arg(long)]
        input: PathBuf,
        /// Output points CSV
        #[arg(long)]
        output: PathBuf,
    },
    /// Match each source point to its nearest reference point per state
    Match {
        /// Points CSV to reconcile (e.g., hydrology)
        #[arg(long)]
        source: PathBuf,
        /// Points CSV to match against (e.g., regulatory)
        #[arg(long)]
        reference: PathBuf,
        /// Distance under which a match counts as the same facility
        #[arg(long, default_value = "1.0")]
        threshold_km: f64,
        /// Output match records CSV
        #[arg(long)]
        matches: PathBuf,
        /// Output per-state summary CSV
        #[arg(long)]
        summary: PathBuf,
    },
    /// Build the candidate list from hydrology and regulatory points
    Reconcile {
        /// Hydrology points CSV
        #[arg(long)]
        hydro: PathBuf,
        /// Regulatory points CSV
        #[arg(long)]
        regulatory: PathBuf,
        /// Regulatory points closer than this to a hydrology point are
        /// dropped as duplicates
        #[arg(long, default_value = "1.0")]
        threshold_km: f64,
        /// Output candidate CSV
        #[arg(long)]
        output: PathBuf,
    },
    /// Download one imagery tile per candidate, resuming where a previous
    /// run stopped
    Acquire {
        /// Candidate CSV
        #[arg(long)]
        input: PathBuf,
        /// Tile store root; tiles go to `{root}/{state}/{name}.tif`
        #[arg(long)]
        output_root: PathBuf,
        /// Acquisition settings (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Worker processes per state (overrides the config)
        #[arg(long)]
        workers: Option<usize>,
        /// Comma-separated states to acquire (overrides the config)
        #[arg(long)]
        regions: Option<String>,
        /// Comma-separated states to skip (overrides the config)
        #[arg(long)]
        exclude_regions: Option<String>,
        /// Earth Engine project (defaults to `EE_PROJECT`)
        #[arg(long)]
        project: Option<String>,
        /// Earth Engine access token (defaults to `EE_ACCESS_TOKEN`)
        #[arg(long)]
        access_token: Option<String>,
        /// Run workers as tasks in this process instead of child processes
        #[arg(long)]
        in_process: bool,
    },
    /// Worker process entry point used by `acquire`
    #[command(hide = true)]
    AcquireShard {
        /// Shard job file written by the parent
        #[arg(long)]
        job: PathBuf,
        /// Tile store root
        #[arg(long)]
        output_root: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Workers keep stdout for the JSON report and run single-threaded.
    if let Commands::AcquireShard { job, output_root } = &cli.command {
        wwtp_cli_utils::init_worker_logger();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        return runtime.block_on(commands::acquire_shard(job, output_root));
    }

    let multi = wwtp_cli_utils::init_logger();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(cli.command, &multi))
}

async fn run(
    command: Commands,
    multi: &wwtp_cli_utils::MultiProgress,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Hydro {
            input,
            boundaries,
            country,
            output,
        } => commands::hydro(&input, &boundaries, &country, &output)?,
        Commands::Regulatory { input, output } => commands::regulatory(&input, &output)?,
        Commands::Community {
            input,
            format,
            state,
            output,
        } => commands::community(&input, format, state.as_deref(), &output)?,
        Commands::FetchCommunity {
            states,
            endpoint,
            output,
        } => commands::fetch_community(states.as_deref(), &endpoint, &output, multi).await?,
        Commands::CandidatesCsv { input, output } => commands::candidates_csv(&input, &output)?,
        Commands::Match {
            source,
            reference,
            threshold_km,
            matches,
            summary,
        } => commands::match_sources(&source, &reference, threshold_km, &matches, &summary)?,
        Commands::Reconcile {
            hydro,
            regulatory,
            threshold_km,
            output,
        } => commands::reconcile(&hydro, &regulatory, threshold_km, &output)?,
        Commands::Acquire {
            input,
            output_root,
            config,
            workers,
            regions,
            exclude_regions,
            project,
            access_token,
            in_process,
        } => {
            let options = commands::AcquireOptions {
                config_path: config,
                workers,
                regions,
                exclude_regions,
                project,
                access_token,
                in_process,
            };
            commands::acquire(&input, &output_root, options, multi).await?;
        }
        Commands::AcquireShard { job, output_root } => {
            commands::acquire_shard(&job, &output_root).await?;
        }
    }

    Ok(())
}
