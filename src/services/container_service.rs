use crate::domain::{ArtifactSpec, ContainerRuntime, ContainerSpec, ShellScript, WaitPolicy};
use crate::infra::archive;
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct ContainerService {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerService {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Makes sure no container already holds `name`
    pub fn prepare_name(&self, name: &str, replace_existing: bool) -> Result<()> {
        let Some(existing) = self.runtime.inspect_container(name)? else {
            return Ok(());
        };

        if !replace_existing {
            bail!(
                "A container named {name} already exists ({:?}). Remove it or rerun with --replace.",
                existing.state
            );
        }

        warn!("Removing leftover container {name}");
        self.runtime.remove_container(&existing.id)
    }

    pub fn create(&self, spec: &ContainerSpec) -> Result<String> {
        info!("Creating container {} from {}", spec.name, spec.image);
        self.runtime.create_container(spec)
    }

    /// Creates and starts a container; a container that fails to start is removed again
    pub fn run(&self, spec: &ContainerSpec) -> Result<String> {
        let id = self.create(spec)?;

        if let Err(e) = self.runtime.start_container(&id) {
            if let Err(rm) = self.runtime.remove_container(&id) {
                warn!("Could not remove {} after failed start: {rm}", spec.name);
            }
            return Err(e).with_context(|| format!("starting container {}", spec.name));
        }

        info!("Container {} started ({id})", spec.name);
        Ok(id)
    }

    /// Polls until the container stops running and returns its exit code
    pub fn wait_for_exit(&self, id: &str, policy: &WaitPolicy) -> Result<i64> {
        let started = Instant::now();

        loop {
            let Some(container) = self.runtime.inspect_container(id)? else {
                bail!("Container {id} disappeared while running commands");
            };

            if !container.is_running() {
                let code = container.exit_code.unwrap_or_default();
                debug!("Container {id} finished with {:?} (exit {code})", container.state);
                return Ok(code);
            }

            if let Some(timeout) = policy.timeout {
                if started.elapsed() >= timeout {
                    bail!("Container {id} still running after {:?}", timeout);
                }
            }

            thread::sleep(policy.poll_interval);
        }
    }

    pub fn exec_script(&self, id: &str, script: &ShellScript) -> Result<()> {
        info!("Executing {} command(s) in {id}", script.commands().len());
        debug!("Script: {}", script.render());

        let code = self.runtime.exec(id, &script.argv())?;
        if code != 0 {
            bail!("Commands in {id} exited with status {code}");
        }

        Ok(())
    }

    /// Copies `artifacts.container_path` out and unpacks it under `artifacts.output_dir`
    pub fn copy_artifacts(&self, id: &str, artifacts: &ArtifactSpec) -> Result<Vec<PathBuf>> {
        info!(
            "Copying {} from {id} to {:?}",
            artifacts.container_path, artifacts.output_dir
        );

        let data = self
            .runtime
            .copy_from_container(id, &artifacts.container_path)?;
        let written = archive::unpack(&data, &artifacts.output_dir)?;

        debug!("Wrote {} file(s)", written.len());
        Ok(written)
    }

    /// Stops the container, then force-removes it; a failed stop does not prevent removal
    pub fn stop_and_remove(&self, id: &str) -> Result<()> {
        info!("Stopping and removing {id}");

        if let Err(e) = self.runtime.stop_container(id) {
            warn!("Unable to stop container {id}: {e}");
        }

        self.runtime
            .remove_container(id)
            .with_context(|| format!("removing container {id}"))
    }
}
