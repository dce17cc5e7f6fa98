//! Subcommand implementations.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use wwtp_acquire::{
    AcquisitionConfig, EarthEngineClient, EarthEngineCredentials, InProcessPool, Orchestrator,
    ProcessPool, ShardJob, Worker,
};
use wwtp_cli_utils::{IndicatifProgress, MultiProgress};
use wwtp_matcher::{match_by_region, reconcile_candidates, source_surplus, summarize};
use wwtp_point_models::regions::{self, Region};
use wwtp_point_models::{GeoPoint, MatchRecord};
use wwtp_source::{candidate, community, export, hydro, overpass, regulatory};
use wwtp_spatial::RegionIndex;

use crate::CommunityFormat;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Splits a comma-separated list, dropping blanks.
fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolves a comma-separated list of state names or codes.
fn parse_regions(list: &str) -> Result<Vec<&'static Region>, String> {
    split_list(list)
        .iter()
        .map(|label| {
            regions::normalize(label)
                .and_then(regions::by_code)
                .ok_or_else(|| format!("unknown state: {label}"))
        })
        .collect()
}

pub fn hydro(input: &Path, boundaries: &Path, country: &str, output: &Path) -> CliResult {
    let index = RegionIndex::load(boundaries)?;
    log::info!("Loaded {} region boundaries", index.len());

    let (points, _) = hydro::adapt_path(input, &index, country)?;
    export::write_points(output, &points)?;
    Ok(())
}

pub fn regulatory(input: &Path, output: &Path) -> CliResult {
    let (points, _) = regulatory::adapt_path(input)?;
    export::write_points(output, &points)?;
    Ok(())
}

pub fn community(
    input: &Path,
    format: CommunityFormat,
    state: Option<&str>,
    output: &Path,
) -> CliResult {
    let (points, _) = match format {
        CommunityFormat::Overpass => {
            let region = state
                .and_then(regions::normalize)
                .ok_or("--state must name a known state for Overpass input")?;
            let text = std::fs::read_to_string(input)?;
            community::adapt_overpass_str(&text, region)?
        }
        CommunityFormat::Tagged => community::adapt_tagged_csv(std::fs::File::open(input)?)?,
    };
    export::write_points(output, &points)?;
    Ok(())
}

pub async fn fetch_community(
    states: Option<&str>,
    endpoint: &str,
    output: &Path,
    multi: &MultiProgress,
) -> CliResult {
    let targets: Vec<&'static Region> = match states {
        Some(list) => parse_regions(list)?,
        None => regions::REGIONS.iter().collect(),
    };

    let client = reqwest::Client::builder()
        .user_agent(concat!("wwtp-locator/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let progress = IndicatifProgress::batch_bar(multi, "Fetching OSM plants");
    progress.set_total(targets.len() as u64);

    let mut seen_ids = BTreeSet::new();
    let mut points: Vec<GeoPoint> = Vec::new();
    let mut failed_states = Vec::new();

    for region in targets {
        progress.set_message(region.name.to_string());
        match overpass::fetch_wastewater_plants(&client, endpoint, region.name).await {
            Ok(response) => {
                let (state_points, _) = community::adapt_overpass(&response, region.code);
                // Ways straddling a border come back for both states.
                points.extend(
                    state_points
                        .into_iter()
                        .filter(|p| seen_ids.insert(p.id().to_string())),
                );
            }
            Err(e) => {
                log::warn!("[{}] Overpass fetch failed: {e}", region.code);
                failed_states.push(region.code);
            }
        }
        progress.inc(1);
    }

    progress.finish(format!("Fetched {} OSM plants", points.len()));
    if !failed_states.is_empty() {
        log::warn!("Overpass failed for: {}", failed_states.join(", "));
    }
    export::write_points(output, &points)?;
    Ok(())
}

pub fn candidates_csv(input: &Path, output: &Path) -> CliResult {
    let (points, _) = candidate::adapt_path(input)?;
    export::write_points(output, &points)?;
    Ok(())
}

pub fn match_sources(
    source: &Path,
    reference: &Path,
    threshold_km: f64,
    matches_out: &Path,
    summary_out: &Path,
) -> CliResult {
    let source_points = export::read_points(source)?;
    let reference_points = export::read_points(reference)?;

    let regional = match_by_region(&source_points, &reference_points);
    let records: Vec<MatchRecord> = regional.records().cloned().collect();
    export::write_matches(matches_out, &records)?;

    let summaries = summarize(&source_points, &reference_points, &regional, threshold_km);
    export::write_summaries(summary_out, &summaries)?;

    let within: u64 = summaries.iter().map(|s| s.count_within_threshold).sum();
    log::info!(
        "Out of {} source points, {within} are within {threshold_km} km of their nearest reference point",
        source_points.len()
    );
    for summary in source_surplus(&summaries) {
        log::info!(
            "[{}] {} source points vs {} reference points",
            summary.region,
            summary.count_hydro,
            summary.count_reference
        );
    }
    Ok(())
}

pub fn reconcile(hydro: &Path, regulatory: &Path, threshold_km: f64, output: &Path) -> CliResult {
    let hydro_points = export::read_points(hydro)?;
    let regulatory_points = export::read_points(regulatory)?;

    let candidates = reconcile_candidates(&hydro_points, &regulatory_points, threshold_km);
    export::write_candidates(output, &candidates)?;
    Ok(())
}

/// Command-line overrides for `acquire`.
pub struct AcquireOptions {
    pub config_path: Option<PathBuf>,
    pub workers: Option<usize>,
    pub regions: Option<String>,
    pub exclude_regions: Option<String>,
    pub project: Option<String>,
    pub access_token: Option<String>,
    pub in_process: bool,
}

fn resolve_config(
    options: &AcquireOptions,
) -> Result<AcquisitionConfig, Box<dyn std::error::Error>> {
    let mut config = AcquisitionConfig::load(options.config_path.as_deref())?;
    if let Some(workers) = options.workers {
        config.workers = workers;
    }
    if let Some(list) = &options.regions {
        config.include_regions = split_list(list);
    }
    if let Some(list) = &options.exclude_regions {
        config.exclude_regions = split_list(list);
    }
    config.validate()?;
    Ok(config)
}

pub async fn acquire(
    input: &Path,
    output_root: &Path,
    options: AcquireOptions,
    multi: &MultiProgress,
) -> CliResult {
    let config = resolve_config(&options)?;
    let credentials = EarthEngineCredentials::resolve(options.project, options.access_token)?;

    let (points, _) = candidate::adapt_path(input)?;
    let region_count = points
        .iter()
        .map(GeoPoint::region)
        .filter(|region| config.wants_region(region))
        .collect::<BTreeSet<_>>()
        .len();
    let progress = IndicatifProgress::steps_bar(multi, "Regions", region_count as u64);

    log::info!(
        "Acquiring {} tiles of {} ({} to {}) with {} workers per region",
        points.len(),
        config.collection_id,
        config.date_range.start,
        config.date_range.end,
        config.workers
    );

    let summary = if options.in_process {
        let service = Arc::new(EarthEngineClient::new(&config, credentials)?);
        Orchestrator::new(config.clone(), InProcessPool::new(config, service))
            .with_progress(progress)
            .acquire(&points, output_root)
            .await?
    } else {
        let pool = ProcessPool::current_exe(config.clone())?.with_credentials(credentials);
        Orchestrator::new(config, pool)
            .with_progress(progress)
            .acquire(&points, output_root)
            .await?
    };

    log::info!(
        "Done: {} exported, {} already present, {} failed across {} regions",
        summary.exported(),
        summary.skipped_existing(),
        summary.failed(),
        summary.regions.len()
    );
    for failed in summary.failed_regions() {
        log::warn!(
            "[{}] region failed: {}",
            failed.region,
            failed.error.as_deref().unwrap_or_default()
        );
    }
    if summary.failed() > 0 {
        log::info!("Re-run the same command to retry failed points");
    }
    Ok(())
}

/// Worker process body: runs one shard and prints its report on stdout.
pub async fn acquire_shard(job_path: &Path, output_root: &Path) -> CliResult {
    let job = ShardJob::read(job_path)?;
    let credentials = EarthEngineCredentials::resolve(None, None)?;
    let client = EarthEngineClient::new(&job.config, credentials)?;

    let report = Worker::new(job.config, Arc::new(client))
        .run(&job.shard, output_root)
        .await;

    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
