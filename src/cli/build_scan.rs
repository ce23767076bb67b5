use super::scan::{artifact_spec, print_report};
use crate::domain::job::container_name_for_tag;
use crate::domain::{BuildScanJob, ContainerRuntime, Separator, ShellScript};
use crate::infra::DockerAdapter;
use crate::infra::config::{AppConfig, expand_path, load_app_config};
use crate::services::{ContainerService, ImageService, ScanReport, Scanner};
use anyhow::{Context, Result, bail};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub struct BuildScanArgs {
    /// Dockerfile to build
    #[arg(long)]
    pub dockerfile: Option<PathBuf>,

    /// File the Dockerfile needs in its build context (repeatable, relative path)
    #[arg(long = "file", value_name = "PATH")]
    pub context_files: Vec<PathBuf>,

    /// Tag for the temporary image
    #[arg(long)]
    pub tag: Option<String>,

    /// Name of the copy container (derived from the tag by default)
    #[arg(long)]
    pub container_name: Option<String>,

    /// Environment variable for the container (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Command baked into the image (repeatable, runs in order)
    #[arg(long = "command", value_name = "CMD")]
    pub commands: Vec<String>,

    /// Host directory receiving the copied artifacts
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Container path copied back to the host
    #[arg(long)]
    pub artifact_path: Option<String>,

    /// File that must exist under the artifact path (repeatable)
    #[arg(long = "artifact", value_name = "NAME")]
    pub artifacts: Vec<String>,

    /// Keep the built image afterwards
    #[arg(long)]
    pub keep_image: bool,

    /// Remove a leftover container with the same name first
    #[arg(long)]
    pub replace: bool,

    /// Engine binary (docker, podman, ...)
    #[arg(long)]
    pub engine: Option<String>,
}

impl BuildScanArgs {
    pub fn overrides(&self) -> AppConfig {
        let mut layer = AppConfig::default();

        layer.engine.binary = self.engine.clone();
        if !self.env.is_empty() {
            layer.container.env = Some(self.env.clone());
        }
        if self.replace {
            layer.container.replace = Some(true);
        }
        if !self.commands.is_empty() {
            layer.scan.commands = Some(self.commands.clone());
        }
        layer.scan.artifact_path = self.artifact_path.clone();
        if !self.artifacts.is_empty() {
            layer.scan.artifacts = Some(self.artifacts.clone());
        }
        layer.scan.output_dir = self.output_dir.clone();
        layer.build.tag = self.tag.clone();
        layer.build.dockerfile = self.dockerfile.clone();
        if !self.context_files.is_empty() {
            layer.build.context_files = Some(self.context_files.clone());
        }
        if self.keep_image {
            layer.build.keep_image = Some(true);
        }

        layer
    }
}

pub fn build_scan_job(config: &AppConfig, container_name: Option<&str>) -> Result<BuildScanJob> {
    let tag = config
        .build
        .tag
        .clone()
        .context("build tag not set in config")?;

    let dockerfile = config
        .build
        .dockerfile
        .as_deref()
        .map(expand_path)
        .context("Dockerfile path not set in config")?;

    if !dockerfile.is_file() {
        bail!("Dockerfile not found at {:?}", dockerfile);
    }

    // Commands run as one RUN layer; a failing tool must not abort the rest
    let script = match &config.scan.commands {
        Some(commands) => ShellScript::new(commands, Separator::Sequence)?,
        None => ShellScript::defaults(Separator::Sequence),
    };

    Ok(BuildScanJob {
        container_name: container_name
            .map(str::to_string)
            .unwrap_or_else(|| container_name_for_tag(&tag)),
        tag,
        dockerfile,
        context_files: config.build.context_files.clone().unwrap_or_default(),
        script,
        env: config.container.env.clone().unwrap_or_default(),
        artifacts: artifact_spec(config),
        keep_image: config.build.keep_image.unwrap_or(false),
        replace_existing: config.container.replace.unwrap_or(false),
    })
}

pub fn run(args: BuildScanArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = load_app_config(config_path)?;
    config.merge(args.overrides());

    let runtime = Arc::new(DockerAdapter::with_binary(config.engine_binary()));
    let report = execute(&config, args.container_name.as_deref(), runtime)?;
    print_report(&report);

    Ok(())
}

pub fn execute(
    config: &AppConfig,
    container_name: Option<&str>,
    runtime: Arc<dyn ContainerRuntime>,
) -> Result<ScanReport> {
    let job = build_scan_job(config, container_name)?;
    let scanner = Scanner::new(
        Arc::new(ContainerService::new(runtime.clone())),
        Arc::new(ImageService::new(runtime)),
    );
    scanner.build_and_scan(&job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn container_defaults_to_tag() {
        let dir = tempfile::tempdir().unwrap();
        let dockerfile = dir.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM python:3.10\n").unwrap();

        let args = BuildScanArgs {
            dockerfile: Some(dockerfile),
            tag: Some("go-check".into()),
            ..Default::default()
        };
        let mut config = AppConfig::default();
        config.merge(args.overrides());

        let job = build_scan_job(&config, None).unwrap();
        assert_eq!(job.container_name, "go-check");
        assert!(job.script.render().contains("; cyclonedx-py"));

        let job = build_scan_job(&config, Some("other")).unwrap();
        assert_eq!(job.container_name, "other");
    }

    #[test]
    fn namespaced_tag_yields_valid_container_name() {
        let dir = tempfile::tempdir().unwrap();
        let dockerfile = dir.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM python:3.10\n").unwrap();

        let mut config = AppConfig::default();
        config.build.tag = Some("team/app:1".into());
        config.build.dockerfile = Some(dockerfile);

        let job = build_scan_job(&config, None).unwrap();
        assert_eq!(job.tag, "team/app:1");
        assert_eq!(job.container_name, "team-app-1");
    }

    #[test]
    fn missing_dockerfile_is_rejected() {
        let mut config = AppConfig::default();
        config.build.tag = Some("go-check".into());
        config.build.dockerfile = Some(PathBuf::from("/nonexistent/Dockerfile"));

        assert!(build_scan_job(&config, None).is_err());
    }
}
