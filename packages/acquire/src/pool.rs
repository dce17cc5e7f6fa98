//! Worker pools.
//!
//! A [`WorkerPool`] runs every shard of one region and returns when all of
//! them are done. [`ProcessPool`] gives each shard its own OS process;
//! [`InProcessPool`] runs the workers as concurrent futures.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::AcquireError;
use crate::config::{AcquisitionConfig, EarthEngineCredentials};
use crate::imagery::ImageryService;
use crate::worker::{Shard, ShardReport, Worker};

/// Subcommand a worker process is started with.
pub const SHARD_SUBCOMMAND: &str = "acquire-shard";

/// Everything a worker process needs, written as JSON next to the tiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardJob {
    /// Settings of the parent run.
    pub config: AcquisitionConfig,
    /// Work assigned to this process.
    pub shard: Shard,
}

impl ShardJob {
    /// Reads a job file written by [`ProcessPool`].
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError`] if the file cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Self, AcquireError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Runs all shards of one region to completion.
#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Runs `shards` concurrently and returns one report per shard, in
    /// shard order.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError`] only for failures that affect the whole
    /// region; a failing shard still yields a report.
    async fn run_region(
        &self,
        region: &str,
        shards: Vec<Shard>,
        output_root: &Path,
    ) -> Result<Vec<ShardReport>, AcquireError>;
}

/// One child process per shard, running the current executable's hidden
/// worker subcommand.
pub struct ProcessPool {
    executable: PathBuf,
    config: AcquisitionConfig,
    credentials: Option<EarthEngineCredentials>,
}

impl ProcessPool {
    /// Creates a pool that spawns `executable`.
    #[must_use]
    pub const fn new(executable: PathBuf, config: AcquisitionConfig) -> Self {
        Self {
            executable,
            config,
            credentials: None,
        }
    }

    /// Creates a pool that re-runs the current executable.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Io`] if the executable path is unavailable.
    pub fn current_exe(config: AcquisitionConfig) -> Result<Self, AcquireError> {
        Ok(Self::new(std::env::current_exe()?, config))
    }

    /// Passes credentials to children through their environment.
    #[must_use]
    pub fn with_credentials(mut self, credentials: EarthEngineCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn job_path(output_root: &Path, region: &str, index: usize) -> PathBuf {
        output_root.join(region).join(format!(".shard-{index}.json"))
    }

    fn spawn(
        &self,
        job_path: &Path,
        output_root: &Path,
    ) -> Result<tokio::process::Child, AcquireError> {
        let mut cmd = tokio::process::Command::new(&self.executable);
        cmd.arg(SHARD_SUBCOMMAND)
            .arg("--job")
            .arg(job_path)
            .arg("--output-root")
            .arg(output_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(credentials) = &self.credentials {
            cmd.envs(credentials.env_pairs());
        }

        cmd.spawn().map_err(|e| AcquireError::Process {
            message: format!("failed to start {}: {e}", self.executable.display()),
        })
    }
}

/// Parses the report a worker printed; the last non-empty stdout line wins.
fn parse_report(stdout: &[u8]) -> Option<ShardReport> {
    let text = String::from_utf8_lossy(stdout);
    let line = text.lines().rev().find(|l| !l.trim().is_empty())?;
    serde_json::from_str(line).ok()
}

#[async_trait]
impl WorkerPool for ProcessPool {
    async fn run_region(
        &self,
        region: &str,
        shards: Vec<Shard>,
        output_root: &Path,
    ) -> Result<Vec<ShardReport>, AcquireError> {
        tokio::fs::create_dir_all(output_root.join(region)).await?;

        let mut children = Vec::with_capacity(shards.len());
        for shard in &shards {
            let job_path = Self::job_path(output_root, region, shard.index);
            let job = ShardJob {
                config: self.config.clone(),
                shard: shard.clone(),
            };
            tokio::fs::write(&job_path, serde_json::to_vec(&job)?).await?;

            log::debug!(
                "[{region}] starting worker for shard {} ({} points)",
                shard.index,
                shard.tasks.len()
            );
            children.push((self.spawn(&job_path, output_root)?, job_path));
        }

        let outputs = futures::future::join_all(
            children
                .into_iter()
                .map(|(child, job_path)| async move { (child.wait_with_output().await, job_path) }),
        )
        .await;

        let mut reports = Vec::with_capacity(shards.len());
        for (shard, (output, job_path)) in shards.iter().zip(outputs) {
            let report = match output {
                Ok(output) if output.status.success() => parse_report(&output.stdout)
                    .unwrap_or_else(|| {
                        log::warn!(
                            "[{region}] shard {} printed no report; counting it as failed",
                            shard.index
                        );
                        ShardReport::all_failed(shard)
                    }),
                Ok(output) => {
                    log::warn!(
                        "[{region}] shard {} worker exited with {}; counting it as failed",
                        shard.index,
                        output.status
                    );
                    ShardReport::all_failed(shard)
                }
                Err(e) => {
                    log::warn!("[{region}] shard {} worker lost: {e}", shard.index);
                    ShardReport::all_failed(shard)
                }
            };
            if let Err(e) = tokio::fs::remove_file(&job_path).await {
                log::debug!("Could not remove {}: {e}", job_path.display());
            }
            reports.push(report);
        }

        Ok(reports)
    }
}

/// Runs one [`Worker`] future per shard inside the current process.
pub struct InProcessPool {
    worker: Worker,
}

impl InProcessPool {
    /// Creates a pool whose workers share `service`.
    #[must_use]
    pub fn new(config: AcquisitionConfig, service: Arc<dyn ImageryService>) -> Self {
        Self {
            worker: Worker::new(config, service),
        }
    }
}

#[async_trait]
impl WorkerPool for InProcessPool {
    async fn run_region(
        &self,
        _region: &str,
        shards: Vec<Shard>,
        output_root: &Path,
    ) -> Result<Vec<ShardReport>, AcquireError> {
        let runs = shards.iter().map(|shard| self.worker.run(shard, output_root));
        Ok(futures::future::join_all(runs).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::plan_region;
    use wwtp_point_models::{GeoPoint, PointSource};

    fn shard(index: usize, ids: &[&str]) -> Shard {
        let points: Vec<GeoPoint> = ids
            .iter()
            .map(|id| GeoPoint::new(*id, *id, 36.0, -120.0, PointSource::Candidate, "CA").unwrap())
            .collect();
        Shard {
            region: "CA".to_string(),
            index,
            tasks: plan_region(&points),
        }
    }

    #[test]
    fn report_is_read_from_the_last_line() {
        let stdout = b"noise\n{\"region\":\"CA\",\"attempted\":1,\"exported\":1,\"skipped_existing\":0,\"failed\":0,\"failed_ids\":[]}\n\n";
        let report = parse_report(stdout).unwrap();
        assert_eq!(report.exported, 1);
        assert!(parse_report(b"").is_none());
        assert!(parse_report(b"not json").is_none());
    }

    #[test]
    fn job_roundtrips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = ProcessPool::job_path(dir.path(), "CA", 1);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let job = ShardJob {
            config: AcquisitionConfig::default(),
            shard: shard(1, &["a", "b"]),
        };
        std::fs::write(&path, serde_json::to_vec(&job).unwrap()).unwrap();

        assert_eq!(ShardJob::read(&path).unwrap(), job);
        assert!(path.ends_with("CA/.shard-1.json"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn crashed_workers_count_every_point_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        // `false` ignores its arguments and exits non-zero.
        let pool = ProcessPool::new(PathBuf::from("false"), AcquisitionConfig::default());

        let reports = pool
            .run_region("CA", vec![shard(0, &["a", "b"]), shard(1, &["c"])], dir.path())
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].failed, 2);
        assert_eq!(reports[1].failed_ids, vec!["c"]);
        assert!(!dir.path().join("CA/.shard-0.json").exists());
    }

    #[tokio::test]
    async fn missing_executable_is_a_region_error() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ProcessPool::new(
            dir.path().join("no-such-binary"),
            AcquisitionConfig::default(),
        );
        let result = pool.run_region("CA", vec![shard(0, &["a"])], dir.path()).await;
        assert!(matches!(result, Err(AcquireError::Process { .. })));
    }
}
