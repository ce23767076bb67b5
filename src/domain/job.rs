use super::{Credentials, ImageRef};
use anyhow::{Result, bail};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Freeze python dependencies, then produce a CycloneDX SBOM and a safety CVE report
pub const DEFAULT_COMMANDS: &[&str] = &[
    "python -m ensurepip --upgrade",
    "pip3 freeze > requirements.txt",
    "pip3 install cyclonedx-bom==0.4.3 safety",
    "cyclonedx-py -j -o /tmp/sbom.json",
    "safety check -r requirements.txt --json --output /tmp/cve.json || true",
];

pub const DEFAULT_ARTIFACT_PATH: &str = "/tmp";
pub const DEFAULT_ARTIFACTS: &[&str] = &["sbom.json", "cve.json"];
pub const DEFAULT_CONTAINER_NAME: &str = "scan_container";

pub const SHELL: &str = "/bin/sh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// Stop at the first failing command
    And,
    /// Run every command regardless of failures
    Sequence,
}

impl Separator {
    fn as_str(self) -> &'static str {
        match self {
            Self::And => " && ",
            Self::Sequence => "; ",
        }
    }
}

/// An ordered list of shell commands rendered into a single `sh -c` script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellScript {
    commands: Vec<String>,
    separator: Separator,
}

impl ShellScript {
    pub fn new<I, S>(commands: I, separator: Separator) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let commands: Vec<String> = commands
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        if commands.is_empty() {
            bail!("No commands to execute");
        }

        Ok(Self {
            commands,
            separator,
        })
    }

    pub fn defaults(separator: Separator) -> Self {
        Self {
            commands: DEFAULT_COMMANDS.iter().map(|c| c.to_string()).collect(),
            separator,
        }
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn render(&self) -> String {
        self.commands.join(self.separator.as_str())
    }

    /// Full argv for running the script through the container shell
    pub fn argv(&self) -> Vec<String> {
        vec![SHELL.to_string(), "-c".to_string(), self.render()]
    }
}

/// How the script reaches the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Replace the image entrypoint with the script and wait for the container to exit
    #[default]
    Entrypoint,
    /// Keep the image entrypoint running and exec the script inside it
    Exec,
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entrypoint" => Ok(Self::Entrypoint),
            "exec" => Ok(Self::Exec),
            other => Err(format!(
                "unknown scan mode '{other}' (expected 'entrypoint' or 'exec')"
            )),
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entrypoint => write!(f, "entrypoint"),
            Self::Exec => write!(f, "exec"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    /// `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            timeout: Some(Duration::from_secs(30 * 60)),
        }
    }
}

/// Where artifacts live in the container and where they land on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub container_path: String,
    pub expected: Vec<String>,
    pub output_dir: PathBuf,
}

impl ArtifactSpec {
    /// Copying `/tmp` yields a `tmp/` tree, so artifacts end up under `output_dir/tmp`
    pub fn host_root(&self) -> PathBuf {
        match Path::new(&self.container_path).file_name() {
            Some(name) => self.output_dir.join(name),
            None => self.output_dir.clone(),
        }
    }

    /// Expected names absent from `written`, the files unpacked by this run
    pub fn missing(&self, written: &[PathBuf]) -> Vec<String> {
        let root = self.host_root();
        self.expected
            .iter()
            .filter(|name| !written.contains(&root.join(name)))
            .cloned()
            .collect()
    }
}

impl Default for ArtifactSpec {
    fn default() -> Self {
        Self {
            container_path: DEFAULT_ARTIFACT_PATH.to_string(),
            expected: DEFAULT_ARTIFACTS.iter().map(|a| a.to_string()).collect(),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Pull an image, run the script in it and collect the artifacts
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub image: ImageRef,
    pub credentials: Option<Credentials>,
    pub container_name: String,
    pub port: Option<u16>,
    pub env: Vec<String>,
    pub script: ShellScript,
    pub mode: ScanMode,
    pub artifacts: ArtifactSpec,
    pub wait: WaitPolicy,
    pub replace_existing: bool,
}

/// Build an image with the script baked in as a layer and collect the artifacts
#[derive(Debug, Clone)]
pub struct BuildScanJob {
    pub tag: String,
    pub dockerfile: PathBuf,
    pub context_files: Vec<PathBuf>,
    pub script: ShellScript,
    pub container_name: String,
    pub env: Vec<String>,
    pub artifacts: ArtifactSpec,
    pub keep_image: bool,
    pub replace_existing: bool,
}

pub fn validate_container_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        bail!("Container name is empty");
    };

    if !first.is_ascii_alphanumeric() {
        bail!("Container name '{name}' must start with a letter or digit");
    }

    if let Some(c) = chars.find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '.' | '-')) {
        bail!("Container name '{name}' contains invalid character '{c}'");
    }

    Ok(())
}

/// Container name derived from an image tag, e.g. `team/app:1` becomes `team-app-1`
pub fn container_name_for_tag(tag: &str) -> String {
    let name: String = tag
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') => c,
            _ => '-',
        })
        .collect();

    match name.trim_start_matches(|c: char| !c.is_ascii_alphanumeric()) {
        "" => DEFAULT_CONTAINER_NAME.to_string(),
        trimmed => trimmed.to_string(),
    }
}

pub fn validate_env(entry: &str) -> Result<()> {
    match entry.split_once('=') {
        Some((key, _)) if !key.is_empty() && !key.chars().any(char::is_whitespace) => Ok(()),
        _ => bail!("Invalid environment variable '{entry}' (expected KEY=VALUE)"),
    }
}

pub fn parse_port(value: &str) -> Result<u16> {
    match value.trim().parse::<u16>() {
        Ok(0) | Err(_) => bail!("Invalid port '{value}' (expected 1-65535)"),
        Ok(port) => Ok(port),
    }
}
