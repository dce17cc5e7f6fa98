//! Resumable per-shard tile download.
//!
//! A point is complete if and only if its tile file exists. The worker
//! skips completed points, exports the rest one at a time, and keeps going
//! past individual failures. Running it twice over the same shard issues at
//! most one successful export per point.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::AcquisitionConfig;
use crate::imagery::{ExportRequest, ImageryService};
use crate::tile::{DownloadTask, TileBounds};

/// A contiguous slice of one region's download tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shard {
    /// Region code shared by every task.
    pub region: String,
    /// Position of the shard within its region.
    pub index: usize,
    /// Tasks in region order.
    pub tasks: Vec<DownloadTask>,
}

/// Outcome of one worker run over one shard.
///
/// `exported + skipped_existing + failed` equals the shard length;
/// `attempted` counts export requests issued (`exported + failed`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardReport {
    /// Region code.
    pub region: String,
    /// Export requests issued.
    pub attempted: u64,
    /// Tiles written.
    pub exported: u64,
    /// Points whose tile already existed.
    pub skipped_existing: u64,
    /// Export requests that failed.
    pub failed: u64,
    /// Ids of the points that failed.
    pub failed_ids: Vec<String>,
}

impl ShardReport {
    /// Report for a shard whose worker never produced one: every point
    /// counts as failed.
    #[must_use]
    pub fn all_failed(shard: &Shard) -> Self {
        let failed_ids: Vec<String> = shard
            .tasks
            .iter()
            .map(|t| t.point.id().to_string())
            .collect();
        Self {
            region: shard.region.clone(),
            attempted: 0,
            exported: 0,
            skipped_existing: 0,
            failed: failed_ids.len() as u64,
            failed_ids,
        }
    }
}

/// Downloads the tiles of one shard.
pub struct Worker {
    config: AcquisitionConfig,
    service: Arc<dyn ImageryService>,
}

impl Worker {
    /// Creates a worker bound to an imagery service.
    #[must_use]
    pub fn new(config: AcquisitionConfig, service: Arc<dyn ImageryService>) -> Self {
        Self { config, service }
    }

    /// Exports every task of `shard` whose tile is missing under
    /// `output_root`.
    ///
    /// Never fails as a whole: per-point problems are logged and counted
    /// in the returned report.
    pub async fn run(&self, shard: &Shard, output_root: &Path) -> ShardReport {
        let mut report = ShardReport {
            region: shard.region.clone(),
            ..ShardReport::default()
        };

        if let Err(e) = tokio::fs::create_dir_all(output_root.join(&shard.region)).await {
            log::warn!(
                "[{}] shard {}: cannot create region directory: {e}",
                shard.region,
                shard.index
            );
            return ShardReport::all_failed(shard);
        }

        for task in &shard.tasks {
            let target = task.target_path(output_root);
            if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                report.skipped_existing += 1;
                continue;
            }

            report.attempted += 1;
            match self.export(task, output_root).await {
                Ok(()) => {
                    log::debug!("[{}] exported {}", shard.region, target.display());
                    report.exported += 1;
                }
                Err(e) => {
                    log::warn!(
                        "[{}] export failed for {} ({}): {e}",
                        shard.region,
                        task.point.id(),
                        task.point.name(),
                    );
                    report.failed += 1;
                    report.failed_ids.push(task.point.id().to_string());
                }
            }
        }

        log::info!(
            "[{}] shard {} done: {} exported, {} skipped, {} failed",
            shard.region,
            shard.index,
            report.exported,
            report.skipped_existing,
            report.failed,
        );
        report
    }

    /// Exports one tile to its `.part` path and renames it into place.
    async fn export(
        &self,
        task: &DownloadTask,
        output_root: &Path,
    ) -> Result<(), crate::imagery::ImageryError> {
        let part = task.part_path(output_root);
        let request = ExportRequest {
            collection_id: &self.config.collection_id,
            date_range: self.config.date_range,
            bands: &self.config.bands,
            bounds: TileBounds::around(
                &task.point,
                self.config.half_width_deg,
                self.config.half_height_deg,
            ),
            scale_m: self.config.scale_m,
            output_path: &part,
        };

        let result = match self.service.export_tile(&request).await {
            Ok(()) => tokio::fs::rename(&part, task.target_path(output_root))
                .await
                .map_err(Into::into),
            Err(e) => Err(e),
        };

        if result.is_err() {
            let _ = tokio::fs::remove_file(&part).await;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use wwtp_point_models::{GeoPoint, PointSource};

    use super::*;
    use crate::imagery::ImageryError;
    use crate::tile::plan_region;

    /// Records every call; writes a fake tile unless the point is listed
    /// in `fail_on`.
    #[derive(Default)]
    struct StubService {
        calls: Mutex<Vec<String>>,
        fail_on: Vec<String>,
    }

    #[async_trait]
    impl ImageryService for StubService {
        async fn export_tile(&self, request: &ExportRequest<'_>) -> Result<(), ImageryError> {
            let stem = request
                .output_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            self.calls.lock().unwrap().push(stem.clone());

            if self.fail_on.iter().any(|f| stem.contains(f.as_str())) {
                return Err(ImageryError::InvalidResponse {
                    message: "stub failure".to_string(),
                });
            }
            tokio::fs::write(request.output_path, b"II*\0tile").await?;
            Ok(())
        }
    }

    fn shard(n: u32) -> Shard {
        let points: Vec<GeoPoint> = (1..=n)
            .map(|i| {
                GeoPoint::new(
                    format!("p{i}"),
                    format!("Plant {i}"),
                    f64::from(i).mul_add(0.1, 36.0),
                    -120.0,
                    PointSource::Candidate,
                    "CA",
                )
                .unwrap()
            })
            .collect();
        Shard {
            region: "CA".to_string(),
            index: 0,
            tasks: plan_region(&points),
        }
    }

    #[tokio::test]
    async fn second_run_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(StubService::default());
        let worker = Worker::new(AcquisitionConfig::default(), service.clone());
        let shard = shard(5);

        let first = worker.run(&shard, dir.path()).await;
        assert_eq!(first.exported, 5);
        assert_eq!(first.attempted, 5);

        let second = worker.run(&shard, dir.path()).await;
        assert_eq!(second.skipped_existing, 5);
        assert_eq!(second.attempted, 0);

        assert_eq!(service.calls.lock().unwrap().len(), 5);
        for task in &shard.tasks {
            assert!(task.target_path(dir.path()).exists());
            assert!(!task.part_path(dir.path()).exists());
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_shard() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(StubService {
            fail_on: vec!["Plant 3".to_string()],
            ..StubService::default()
        });
        let worker = Worker::new(AcquisitionConfig::default(), service.clone());
        let shard = shard(5);

        let report = worker.run(&shard, dir.path()).await;

        assert_eq!(report.attempted, 5);
        assert_eq!(report.exported, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_ids, vec!["p3"]);

        let calls = service.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 5);
        assert!(calls[3].contains("Plant 4"));
        assert!(calls[4].contains("Plant 5"));

        let failed = &shard.tasks[2];
        assert!(!failed.target_path(dir.path()).exists());
        assert!(!failed.part_path(dir.path()).exists());
    }

    #[tokio::test]
    async fn failed_points_are_retried_on_the_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let shard = shard(3);

        let failing = Arc::new(StubService {
            fail_on: vec!["Plant 2".to_string()],
            ..StubService::default()
        });
        Worker::new(AcquisitionConfig::default(), failing)
            .run(&shard, dir.path())
            .await;

        let healthy = Arc::new(StubService::default());
        let report = Worker::new(AcquisitionConfig::default(), healthy.clone())
            .run(&shard, dir.path())
            .await;

        assert_eq!(report.skipped_existing, 2);
        assert_eq!(report.exported, 1);
        assert_eq!(healthy.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stale_part_file_is_not_mistaken_for_a_tile() {
        let dir = tempfile::tempdir().unwrap();
        let shard = shard(1);
        let task = &shard.tasks[0];
        std::fs::create_dir_all(dir.path().join("CA")).unwrap();
        std::fs::write(task.part_path(dir.path()), b"partial").unwrap();

        let service = Arc::new(StubService::default());
        let report = Worker::new(AcquisitionConfig::default(), service)
            .run(&shard, dir.path())
            .await;

        assert_eq!(report.exported, 1);
        assert_eq!(std::fs::read(task.target_path(dir.path())).unwrap(), b"II*\0tile");
    }

    #[test]
    fn all_failed_counts_every_point() {
        let shard = shard(3);
        let report = ShardReport::all_failed(&shard);
        assert_eq!(report.failed, 3);
        assert_eq!(report.failed_ids, vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn report_is_json_serializable() {
        let report = ShardReport {
            region: "CA".to_string(),
            attempted: 2,
            exported: 1,
            skipped_existing: 3,
            failed: 1,
            failed_ids: vec!["p9".to_string()],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(serde_json::from_str::<ShardReport>(&json).unwrap(), report);
    }
}
