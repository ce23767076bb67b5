use crate::domain::job::{validate_container_name, validate_env};
use crate::domain::{ArtifactSpec, BuildScanJob, ContainerSpec, ScanJob, ScanMode};
use crate::services::{ContainerService, ImageService};
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Outcome of a finished scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub container_id: String,
    pub exit_code: i64,
    /// Every file written to the host
    pub artifacts: Vec<PathBuf>,
    /// Directory holding the copied container path
    pub output_root: PathBuf,
}

/// Runs the pull/build → run → collect → teardown workflow.
///
/// Once a container exists it is always stopped and removed, whatever
/// happened in between.
pub struct Scanner {
    container_service: Arc<ContainerService>,
    image_service: Arc<ImageService>,
}

impl Scanner {
    pub fn new(container_service: Arc<ContainerService>, image_service: Arc<ImageService>) -> Self {
        Self {
            container_service,
            image_service,
        }
    }

    pub fn scan(&self, job: &ScanJob) -> Result<ScanReport> {
        validate_container_name(&job.container_name)?;
        for entry in &job.env {
            validate_env(entry)?;
        }

        info!("Scanning {} ({} mode)", job.image, job.mode);

        self.image_service
            .pull(&job.image, job.credentials.as_ref())
            .with_context(|| format!("pulling image {}", job.image))?;

        self.container_service
            .prepare_name(&job.container_name, job.replace_existing)?;

        let image = job.image.to_string();
        let argv = job.script.argv();
        let mut spec = ContainerSpec::new(&job.container_name, &image)
            .env(&job.env)
            .port(job.port);
        if job.mode == ScanMode::Entrypoint {
            spec = spec.entrypoint(&argv);
        }

        let id = self.container_service.run(&spec)?;
        let outcome = self.run_and_collect(&id, job);
        let (exit_code, artifacts) = self.teardown(&id, &job.container_name, outcome)?;

        info!("Scan of {} complete: {} file(s)", job.image, artifacts.len());

        Ok(ScanReport {
            container_id: id,
            exit_code,
            artifacts,
            output_root: job.artifacts.host_root(),
        })
    }

    fn run_and_collect(&self, id: &str, job: &ScanJob) -> Result<(i64, Vec<PathBuf>)> {
        let exit_code = match job.mode {
            ScanMode::Entrypoint => {
                info!("Waiting for commands to finish in {}", job.container_name);
                let code = self.container_service.wait_for_exit(id, &job.wait)?;
                if code != 0 {
                    bail!(
                        "Commands in {} exited with status {code}",
                        job.container_name
                    );
                }
                code
            }
            ScanMode::Exec => {
                self.container_service.exec_script(id, &job.script)?;
                0
            }
        };

        let artifacts = self.collect(id, &job.artifacts)?;
        Ok((exit_code, artifacts))
    }

    /// Builds an image with the commands baked in, then copies their output out of it
    pub fn build_and_scan(&self, job: &BuildScanJob) -> Result<ScanReport> {
        validate_container_name(&job.container_name)?;
        for entry in &job.env {
            validate_env(entry)?;
        }

        self.image_service
            .build(&job.tag, &job.dockerfile, &job.context_files, Some(&job.script))
            .with_context(|| format!("building image {}", job.tag))?;

        let result = self.collect_from_image(job);

        if job.keep_image {
            info!("Keeping image {}", job.tag);
        } else if let Err(e) = self.image_service.remove(&job.tag) {
            warn!("Unable to remove image {}: {e:#}", job.tag);
        }

        result
    }

    fn collect_from_image(&self, job: &BuildScanJob) -> Result<ScanReport> {
        self.container_service
            .prepare_name(&job.container_name, job.replace_existing)?;

        // The image already holds the artifacts; copying works on a created container
        let spec = ContainerSpec::new(&job.container_name, &job.tag).env(&job.env);
        let id = self.container_service.create(&spec)?;

        let outcome = self.collect(&id, &job.artifacts);
        let artifacts = self.teardown(&id, &job.container_name, outcome)?;

        Ok(ScanReport {
            container_id: id,
            exit_code: 0,
            artifacts,
            output_root: job.artifacts.host_root(),
        })
    }

    fn collect(&self, id: &str, artifacts: &ArtifactSpec) -> Result<Vec<PathBuf>> {
        let written = self.container_service.copy_artifacts(id, artifacts)?;

        let missing = artifacts.missing(&written);
        if !missing.is_empty() {
            bail!(
                "Expected artifact(s) not generated in {}: {}",
                artifacts.container_path,
                missing.join(", ")
            );
        }

        Ok(written)
    }

    /// Removes the container; the workflow error takes precedence over a cleanup error
    fn teardown<T>(&self, id: &str, name: &str, outcome: Result<T>) -> Result<T> {
        let cleanup = self.container_service.stop_and_remove(id);

        match (outcome, cleanup) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.context(format!(
                "scan finished but container {name} was not removed; remove it manually"
            ))),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(cleanup_err)) => {
                error!("Cleanup failed: {cleanup_err:#}. Remove container {name} manually");
                Err(e)
            }
        }
    }
}
