use crate::domain::job::parse_port;
use crate::domain::{
    ArtifactSpec, ContainerRuntime, Credentials, ImageRef, ScanJob, ScanMode, Separator,
    ShellScript, WaitPolicy,
};
use crate::infra::DockerAdapter;
use crate::infra::config::{AppConfig, expand_path, load_app_config};
use crate::services::{ContainerService, ImageService, ScanReport, Scanner};
use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Args, Debug, Default)]
pub struct ScanArgs {
    /// Image to scan, e.g. 1645370/ortelius-test:latest
    #[arg(long = "imagename", visible_alias = "image", value_name = "IMAGE")]
    pub image: String,

    /// Registry username (anonymous pull when empty)
    #[arg(long, env = "IMAGE_SCAN_USERNAME")]
    pub username: Option<String>,

    /// Registry password
    #[arg(long, env = "IMAGE_SCAN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Publish this port on 0.0.0.0 while the container runs
    #[arg(long)]
    pub port: Option<String>,

    /// Name of the scan container
    #[arg(long)]
    pub container_name: Option<String>,

    /// Environment variable for the container (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,

    /// Command to run instead of the configured list (repeatable, runs in order)
    #[arg(long = "command", value_name = "CMD")]
    pub commands: Vec<String>,

    /// How the commands reach the container: entrypoint | exec
    #[arg(long)]
    pub mode: Option<ScanMode>,

    /// Host directory receiving the copied artifacts
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Container path copied back to the host
    #[arg(long)]
    pub artifact_path: Option<String>,

    /// File that must exist under the artifact path (repeatable)
    #[arg(long = "artifact", value_name = "NAME")]
    pub artifacts: Vec<String>,

    /// Seconds to wait for the commands (0 waits forever)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Remove a leftover container with the same name first
    #[arg(long)]
    pub replace: bool,

    /// Engine binary (docker, podman, ...)
    #[arg(long)]
    pub engine: Option<String>,
}

impl ScanArgs {
    /// Flags as a config layer that overrides the file
    pub fn overrides(&self) -> Result<AppConfig> {
        let mut layer = AppConfig::default();

        layer.engine.binary = self.engine.clone();
        layer.registry.username = self.username.clone();
        layer.registry.password = self.password.clone();
        layer.container.name = self.container_name.clone();
        layer.container.port = self.port.as_deref().map(parse_port).transpose()?;
        if !self.env.is_empty() {
            layer.container.env = Some(self.env.clone());
        }
        if self.replace {
            layer.container.replace = Some(true);
        }
        layer.scan.mode = self.mode;
        if !self.commands.is_empty() {
            layer.scan.commands = Some(self.commands.clone());
        }
        layer.scan.artifact_path = self.artifact_path.clone();
        if !self.artifacts.is_empty() {
            layer.scan.artifacts = Some(self.artifacts.clone());
        }
        layer.scan.output_dir = self.output_dir.clone();
        layer.scan.timeout_secs = self.timeout;

        Ok(layer)
    }
}

pub fn artifact_spec(config: &AppConfig) -> ArtifactSpec {
    let defaults = ArtifactSpec::default();
    ArtifactSpec {
        container_path: config
            .scan
            .artifact_path
            .clone()
            .unwrap_or(defaults.container_path),
        expected: config.scan.artifacts.clone().unwrap_or(defaults.expected),
        output_dir: config
            .scan
            .output_dir
            .as_deref()
            .map(expand_path)
            .unwrap_or(defaults.output_dir),
    }
}

pub fn scan_job(config: &AppConfig, image: &str) -> Result<ScanJob> {
    let image = ImageRef::parse(image)?;

    let script = match &config.scan.commands {
        Some(commands) => ShellScript::new(commands, Separator::And)?,
        None => ShellScript::defaults(Separator::And),
    };

    Ok(ScanJob {
        image,
        credentials: Credentials::from_parts(
            config.registry.username.as_deref(),
            config.registry.password.as_deref(),
        ),
        container_name: config
            .container
            .name
            .clone()
            .context("container name not set in config")?,
        port: config.container.port,
        env: config.container.env.clone().unwrap_or_default(),
        script,
        mode: config.scan.mode.unwrap_or_default(),
        artifacts: artifact_spec(config),
        wait: WaitPolicy {
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
        },
        replace_existing: config.container.replace.unwrap_or(false),
    })
}

pub fn run(args: ScanArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = load_app_config(config_path)?;
    config.merge(args.overrides()?);

    let runtime = Arc::new(DockerAdapter::with_binary(config.engine_binary()));
    let report = execute(&args.image, &config, runtime)?;
    print_report(&report);

    Ok(())
}

/// Runs a scan with an already merged config against any runtime
pub fn execute(
    image: &str,
    config: &AppConfig,
    runtime: Arc<dyn ContainerRuntime>,
) -> Result<ScanReport> {
    let job = scan_job(config, image)?;
    let scanner = Scanner::new(
        Arc::new(ContainerService::new(runtime.clone())),
        Arc::new(ImageService::new(runtime)),
    );
    scanner.scan(&job)
}

pub fn print_report(report: &ScanReport) {
    info!(
        "Artifacts saved under {:?} ({} file(s))",
        report.output_root,
        report.artifacts.len()
    );
    for path in &report.artifacts {
        println!("{}", path.display());
    }
}
