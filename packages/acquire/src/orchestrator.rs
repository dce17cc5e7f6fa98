//! Region-by-region acquisition driver.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wwtp_point_models::GeoPoint;
use wwtp_source::progress::{ProgressCallback, null_progress};

use crate::AcquireError;
use crate::config::AcquisitionConfig;
use crate::partition::partition;
use crate::pool::WorkerPool;
use crate::tile::plan_region;
use crate::worker::{Shard, ShardReport};

/// Totals for one region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionAcquisition {
    /// Region code.
    pub region: String,
    /// Points scheduled.
    pub points: u64,
    /// Shards the points were split into.
    pub shards: u64,
    /// Tiles written in this run.
    pub exported: u64,
    /// Tiles that already existed.
    pub skipped_existing: u64,
    /// Points that could not be exported.
    pub failed: u64,
    /// Ids of the failed points.
    pub failed_ids: Vec<String>,
    /// Why the whole region failed, when it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegionAcquisition {
    /// Every point of the region counted as failed, with the cause.
    fn region_failed(region: &str, points: &[GeoPoint], error: &AcquireError) -> Self {
        let failed_ids: Vec<String> = points.iter().map(|p| p.id().to_string()).collect();
        Self {
            region: region.to_string(),
            points: points.len() as u64,
            failed: failed_ids.len() as u64,
            failed_ids,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    fn absorb(&mut self, report: ShardReport) {
        self.exported += report.exported;
        self.skipped_existing += report.skipped_existing;
        self.failed += report.failed;
        self.failed_ids.extend(report.failed_ids);
    }
}

/// Result of a full acquisition run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionSummary {
    /// One entry per processed region, in region order.
    pub regions: Vec<RegionAcquisition>,
}

impl AcquisitionSummary {
    /// Tiles written across regions.
    #[must_use]
    pub fn exported(&self) -> u64 {
        self.regions.iter().map(|r| r.exported).sum()
    }

    /// Tiles skipped across regions.
    #[must_use]
    pub fn skipped_existing(&self) -> u64 {
        self.regions.iter().map(|r| r.skipped_existing).sum()
    }

    /// Failed points across regions.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.regions.iter().map(|r| r.failed).sum()
    }

    /// Regions that failed as a whole.
    pub fn failed_regions(&self) -> impl Iterator<Item = &RegionAcquisition> {
        self.regions.iter().filter(|r| r.error.is_some())
    }
}

/// Drives a [`WorkerPool`] over every selected region, one region at a
/// time.
pub struct Orchestrator<P: WorkerPool> {
    config: AcquisitionConfig,
    pool: P,
    progress: Arc<dyn ProgressCallback>,
}

impl<P: WorkerPool> Orchestrator<P> {
    /// Creates an orchestrator without progress reporting.
    #[must_use]
    pub fn new(config: AcquisitionConfig, pool: P) -> Self {
        Self {
            config,
            pool,
            progress: null_progress(),
        }
    }

    /// Reports one step per finished region to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Acquires tiles for `points` under `output_root`.
    ///
    /// Points are grouped by region (in region-code order, filtered by the
    /// include/exclude lists), each region is split into `workers` shards
    /// and the next region starts only after every shard has reported.
    /// A region the pool cannot run is recorded with every point failed
    /// and the remaining regions still run.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError`] if the config is invalid or sharding
    /// breaks its own invariants.
    pub async fn acquire(
        &self,
        points: &[GeoPoint],
        output_root: &Path,
    ) -> Result<AcquisitionSummary, AcquireError> {
        self.config.validate()?;

        let mut by_region: BTreeMap<&str, Vec<GeoPoint>> = BTreeMap::new();
        for point in points {
            by_region
                .entry(point.region())
                .or_default()
                .push(point.clone());
        }
        let (selected, skipped): (Vec<_>, Vec<_>) = by_region
            .into_iter()
            .partition(|(region, _)| self.config.wants_region(region));
        for (region, region_points) in &skipped {
            log::info!("[{region}] skipped by region filter ({} points)", region_points.len());
        }

        self.progress.set_total(selected.len() as u64);
        let mut summary = AcquisitionSummary::default();

        for (region, region_points) in selected {
            self.progress.set_message(format!("Acquiring {region}"));

            let totals = match self.acquire_region(region, &region_points, output_root).await {
                Ok(totals) => totals,
                Err(e @ AcquireError::Partition(_)) => return Err(e),
                Err(e) => {
                    log::warn!(
                        "[{region}] region failed, {} points left for the next run: {e}",
                        region_points.len()
                    );
                    RegionAcquisition::region_failed(region, &region_points, &e)
                }
            };

            summary.regions.push(totals);
            self.progress.inc(1);
        }

        self.progress.finish(format!(
            "Acquisition done: {} exported, {} skipped, {} failed",
            summary.exported(),
            summary.skipped_existing(),
            summary.failed()
        ));
        Ok(summary)
    }
    /// Runs one region through the pool.
    async fn acquire_region(
        &self,
        region: &str,
        region_points: &[GeoPoint],
        output_root: &Path,
    ) -> Result<RegionAcquisition, AcquireError> {
        tokio::fs::create_dir_all(output_root.join(region)).await?;

        let tasks = plan_region(region_points);
        let shards: Vec<Shard> = partition(&tasks, self.config.workers)?
            .into_iter()
            .enumerate()
            .map(|(index, tasks)| Shard {
                region: region.to_string(),
                index,
                tasks,
            })
            .collect();

        log::info!(
            "[{region}] region start: {} points in {} shards",
            tasks.len(),
            shards.len()
        );

        let mut totals = RegionAcquisition {
            region: region.to_string(),
            points: tasks.len() as u64,
            shards: shards.len() as u64,
            ..RegionAcquisition::default()
        };
        for report in self.pool.run_region(region, shards, output_root).await? {
            totals.absorb(report);
        }

        log::info!(
            "[{region}] region end: {} exported, {} skipped, {} failed",
            totals.exported,
            totals.skipped_existing,
            totals.failed
        );
        if totals.failed > 0 {
            log::info!("[{region}] failed ids: {}", totals.failed_ids.join(", "));
        }
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use wwtp_point_models::PointSource;

    use super::*;
    use crate::imagery::{ExportRequest, ImageryError, ImageryService};
    use crate::pool::InProcessPool;

    #[derive(Default)]
    struct CountingService {
        calls: Mutex<u64>,
    }

    #[async_trait]
    impl ImageryService for CountingService {
        async fn export_tile(&self, request: &ExportRequest<'_>) -> Result<(), ImageryError> {
            *self.calls.lock().unwrap() += 1;
            tokio::fs::write(request.output_path, b"II*\0").await?;
            Ok(())
        }
    }

    /// Records the order regions are handed to the pool.
    struct RecordingPool {
        regions: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl WorkerPool for RecordingPool {
        async fn run_region(
            &self,
            region: &str,
            shards: Vec<Shard>,
            _output_root: &Path,
        ) -> Result<Vec<ShardReport>, AcquireError> {
            self.regions
                .lock()
                .unwrap()
                .push((region.to_string(), shards.len()));
            Ok(shards.iter().map(ShardReport::all_failed).collect())
        }
    }

    fn points() -> Vec<GeoPoint> {
        [("t1", "TX"), ("c1", "CA"), ("t2", "TX"), ("a1", "AK"), ("c2", "CA"), ("c3", "CA")]
            .iter()
            .map(|(id, region)| {
                GeoPoint::new(*id, *id, 40.0, -100.0, PointSource::Candidate, region).unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn regions_run_in_order_with_filters() {
        let config = AcquisitionConfig {
            workers: 2,
            exclude_regions: vec!["AK".to_string()],
            ..AcquisitionConfig::default()
        };
        let pool = RecordingPool {
            regions: Mutex::new(Vec::new()),
        };
        let dir = tempfile::tempdir().unwrap();

        let orchestrator = Orchestrator::new(config, pool);
        let summary = orchestrator.acquire(&points(), dir.path()).await.unwrap();

        assert_eq!(
            *orchestrator.pool.regions.lock().unwrap(),
            vec![("CA".to_string(), 2), ("TX".to_string(), 2)]
        );
        assert_eq!(summary.regions.len(), 2);
        assert_eq!(summary.regions[0].points, 3);
        assert_eq!(summary.regions[0].failed, 3);
        assert_eq!(summary.failed(), 5);
        assert!(dir.path().join("CA").is_dir());
        assert!(!dir.path().join("AK").exists());
    }

    /// Fails every region listed in `broken`, records the rest.
    struct FlakyPool {
        broken: Vec<&'static str>,
        ran: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WorkerPool for FlakyPool {
        async fn run_region(
            &self,
            region: &str,
            shards: Vec<Shard>,
            _output_root: &Path,
        ) -> Result<Vec<ShardReport>, AcquireError> {
            self.ran.lock().unwrap().push(region.to_string());
            if self.broken.iter().any(|b| *b == region) {
                return Err(AcquireError::Process {
                    message: "failed to start worker".to_string(),
                });
            }
            Ok(shards
                .iter()
                .map(|shard| ShardReport {
                    region: shard.region.clone(),
                    attempted: shard.tasks.len() as u64,
                    exported: shard.tasks.len() as u64,
                    ..ShardReport::default()
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn a_failing_region_does_not_stop_the_others() {
        let pool = FlakyPool {
            broken: vec!["CA"],
            ran: Mutex::new(Vec::new()),
        };
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(AcquisitionConfig::default(), pool);

        let summary = orchestrator.acquire(&points(), dir.path()).await.unwrap();

        assert_eq!(*orchestrator.pool.ran.lock().unwrap(), vec!["AK", "CA", "TX"]);
        let regions: Vec<&str> = summary.regions.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(regions, vec!["AK", "CA", "TX"]);

        let ca = &summary.regions[1];
        assert_eq!(ca.failed, 3);
        assert_eq!(ca.failed_ids, vec!["c1", "c2", "c3"]);
        assert!(ca.error.as_deref().unwrap().contains("failed to start worker"));

        assert_eq!(summary.exported(), 3);
        let failed: Vec<&str> = summary.failed_regions().map(|r| r.region.as_str()).collect();
        assert_eq!(failed, vec!["CA"]);
    }

    #[tokio::test]
    async fn in_process_run_is_resumable() {
        let config = AcquisitionConfig {
            workers: 3,
            ..AcquisitionConfig::default()
        };
        let service = Arc::new(CountingService::default());
        let dir = tempfile::tempdir().unwrap();
        let orchestrator =
            Orchestrator::new(config.clone(), InProcessPool::new(config, service.clone()));

        let first = orchestrator.acquire(&points(), dir.path()).await.unwrap();
        assert_eq!(first.exported(), 6);

        let second = orchestrator.acquire(&points(), dir.path()).await.unwrap();
        assert_eq!(second.exported(), 0);
        assert_eq!(second.skipped_existing(), 6);
        assert_eq!(*service.calls.lock().unwrap(), 6);
        assert!(dir.path().join("CA").join("c1.tif").exists());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_up_front() {
        let config = AcquisitionConfig {
            workers: 0,
            ..AcquisitionConfig::default()
        };
        let pool = RecordingPool {
            regions: Mutex::new(Vec::new()),
        };
        let dir = tempfile::tempdir().unwrap();
        let result = Orchestrator::new(config, pool)
            .acquire(&points(), dir.path())
            .await;
        assert!(matches!(result, Err(AcquireError::Config(_))));
    }
}
