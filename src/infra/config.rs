use crate::domain::ScanMode;
use crate::domain::job::{
    DEFAULT_ARTIFACT_PATH, DEFAULT_ARTIFACTS, DEFAULT_COMMANDS, DEFAULT_CONTAINER_NAME,
};
use crate::infra::docker_adapter::DEFAULT_ENGINE;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_CONFIG_NAME: &str = "image-scan.toml";
pub const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../../config/default_image_scan.toml");

const DEFAULT_BUILD_TAG: &str = "image-scan-build";
const DEFAULT_POLL_INTERVAL_MS: u64 = 250;
const DEFAULT_TIMEOUT_SECS: u64 = 30 * 60;

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub binary: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    pub name: Option<String>,
    pub port: Option<u16>,
    pub env: Option<Vec<String>>,
    pub replace: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub mode: Option<ScanMode>,
    pub commands: Option<Vec<String>>,
    pub artifact_path: Option<String>,
    pub artifacts: Option<Vec<String>>,
    pub output_dir: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
    /// 0 waits forever
    pub timeout_secs: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub tag: Option<String>,
    pub dockerfile: Option<PathBuf>,
    pub context_files: Option<Vec<PathBuf>>,
    pub keep_image: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub build: BuildConfig,
}

impl AppConfig {
    /// Merges another AppConfig into self.
    /// Values from `other` overwrite values in `self` if present.
    pub fn merge(&mut self, other: AppConfig) {
        if let Some(binary) = other.engine.binary {
            self.engine.binary = Some(binary);
        }
        if let Some(username) = other.registry.username {
            self.registry.username = Some(username);
        }
        if let Some(password) = other.registry.password {
            self.registry.password = Some(password);
        }
        if let Some(name) = other.container.name {
            self.container.name = Some(name);
        }
        if let Some(port) = other.container.port {
            self.container.port = Some(port);
        }
        if let Some(env) = other.container.env {
            // Env accumulates across layers; exact duplicates are dropped
            let mut current = self.container.env.take().unwrap_or_default();
            for entry in env {
                if !current.contains(&entry) {
                    current.push(entry);
                }
            }
            self.container.env = Some(current);
        }
        if let Some(replace) = other.container.replace {
            self.container.replace = Some(replace);
        }
        if let Some(mode) = other.scan.mode {
            self.scan.mode = Some(mode);
        }
        if let Some(commands) = other.scan.commands {
            self.scan.commands = Some(commands);
        }
        if let Some(path) = other.scan.artifact_path {
            self.scan.artifact_path = Some(path);
        }
        if let Some(artifacts) = other.scan.artifacts {
            self.scan.artifacts = Some(artifacts);
        }
        if let Some(dir) = other.scan.output_dir {
            self.scan.output_dir = Some(dir);
        }
        if let Some(ms) = other.scan.poll_interval_ms {
            self.scan.poll_interval_ms = Some(ms);
        }
        if let Some(secs) = other.scan.timeout_secs {
            self.scan.timeout_secs = Some(secs);
        }
        if let Some(tag) = other.build.tag {
            self.build.tag = Some(tag);
        }
        if let Some(dockerfile) = other.build.dockerfile {
            self.build.dockerfile = Some(dockerfile);
        }
        if let Some(files) = other.build.context_files {
            self.build.context_files = Some(files);
        }
        if let Some(keep) = other.build.keep_image {
            self.build.keep_image = Some(keep);
        }
    }

    pub(crate) fn apply_defaults(&mut self) {
        self.engine
            .binary
            .get_or_insert_with(|| DEFAULT_ENGINE.to_string());
        self.container
            .name
            .get_or_insert_with(|| DEFAULT_CONTAINER_NAME.to_string());
        self.container.env.get_or_insert_with(Vec::new);
        self.container.replace.get_or_insert(false);
        self.scan.mode.get_or_insert_with(ScanMode::default);
        self.scan
            .commands
            .get_or_insert_with(|| DEFAULT_COMMANDS.iter().map(|c| c.to_string()).collect());
        self.scan
            .artifact_path
            .get_or_insert_with(|| DEFAULT_ARTIFACT_PATH.to_string());
        self.scan
            .artifacts
            .get_or_insert_with(|| DEFAULT_ARTIFACTS.iter().map(|a| a.to_string()).collect());
        self.scan
            .output_dir
            .get_or_insert_with(|| PathBuf::from("."));
        self.scan
            .poll_interval_ms
            .get_or_insert(DEFAULT_POLL_INTERVAL_MS);
        self.scan.timeout_secs.get_or_insert(DEFAULT_TIMEOUT_SECS);
        self.build
            .tag
            .get_or_insert_with(|| DEFAULT_BUILD_TAG.to_string());
        self.build
            .dockerfile
            .get_or_insert_with(|| PathBuf::from("Dockerfile"));
        self.build.context_files.get_or_insert_with(Vec::new);
        self.build.keep_image.get_or_insert(false);
    }

    pub fn engine_binary(&self) -> &str {
        self.engine.binary.as_deref().unwrap_or(DEFAULT_ENGINE)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.scan
                .poll_interval_ms
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
                .max(1),
        )
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self.scan.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

pub fn parse_app_config(content: &str, origin: &Path) -> Result<AppConfig> {
    toml::from_str(content).with_context(|| format!("parsing config {:?}", origin))
}

fn read_app_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path).with_context(|| format!("reading config {:?}", path))?;
    parse_app_config(&content, path)
}

/// Loads the config file and fills in defaults.
///
/// An explicit path must exist. Without one, `./image-scan.toml` is used
/// when present; otherwise only defaults apply.
pub fn load_app_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let mut app_config = AppConfig::default();

    match explicit {
        Some(path) => {
            let path = expand_path(path);
            if !path.exists() {
                bail!("Config file {:?} not found", path);
            }
            info!("Loading config from {:?}", path);
            app_config.merge(read_app_config(&path)?);
        }
        None => {
            let local = PathBuf::from("./").join(DEFAULT_CONFIG_NAME);
            if local.exists() {
                info!("Loading config from {:?}", local);
                app_config.merge(read_app_config(&local)?);
            } else {
                debug!("No {DEFAULT_CONFIG_NAME} in current directory, using defaults");
            }
        }
    }

    app_config.apply_defaults();
    Ok(app_config)
}

/// Writes the default config template into `target_dir` unless one already exists.
/// Returns the config path and whether it was written.
pub fn install_default_config(target_dir: &Path) -> Result<(PathBuf, bool)> {
    fs::create_dir_all(target_dir).with_context(|| format!("creating {:?}", target_dir))?;

    let target = target_dir.join(DEFAULT_CONFIG_NAME);
    if target.exists() {
        return Ok((target, false));
    }

    fs::write(&target, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("writing template to {:?}", target))?;

    Ok((target, true))
}

/// Expands `~` and environment variables; unresolvable paths are returned as-is
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(raw.as_ref()) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let toml = r#"
[engine]
binary = "podman"

[registry]
username = "bob"
password = "secret"

[container]
name = "scanner"
port = 8080
env = ["DB_HOST=192.168.225.51"]
replace = true

[scan]
mode = "exec"
commands = ["echo hi"]
artifact_path = "/out"
artifacts = ["report.json"]
output_dir = "reports"
poll_interval_ms = 100
timeout_secs = 0
"#;

        let config = parse_app_config(toml, Path::new("test.toml")).unwrap();

        assert_eq!(config.engine_binary(), "podman");
        assert_eq!(config.registry.username.as_deref(), Some("bob"));
        assert_eq!(config.container.port, Some(8080));
        assert_eq!(config.container.replace, Some(true));
        assert_eq!(config.scan.mode, Some(ScanMode::Exec));
        assert_eq!(config.scan.commands, Some(vec!["echo hi".to_string()]));
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn rejects_unknown_mode() {
        let toml = r#"
[scan]
mode = "shell"
"#;
        assert!(parse_app_config(toml, Path::new("test.toml")).is_err());
    }

    #[test]
    fn defaults_fill_missing_values() {
        let mut config = AppConfig::default();
        config.apply_defaults();

        assert_eq!(config.engine_binary(), "docker");
        assert_eq!(config.container.name.as_deref(), Some("scan_container"));
        assert_eq!(config.scan.mode, Some(ScanMode::Entrypoint));
        assert_eq!(
            config.scan.commands.as_ref().map(Vec::len),
            Some(DEFAULT_COMMANDS.len())
        );
        assert_eq!(config.scan.artifact_path.as_deref(), Some("/tmp"));
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.timeout(), Some(Duration::from_secs(1800)));
        assert_eq!(config.build.keep_image, Some(false));
    }

    #[test]
    fn merge_overrides_and_appends_env() {
        let mut base = AppConfig::default();
        base.container.name = Some("base".into());
        base.container.env = Some(vec!["A=1".into()]);
        base.scan.commands = Some(vec!["echo base".into()]);

        let mut other = AppConfig::default();
        other.container.name = Some("override".into());
        other.container.env = Some(vec!["A=1".into(), "B=2".into()]);

        base.merge(other);

        assert_eq!(base.container.name.as_deref(), Some("override"));
        assert_eq!(
            base.container.env,
            Some(vec!["A=1".to_string(), "B=2".to_string()])
        );
        assert_eq!(base.scan.commands, Some(vec!["echo base".to_string()]));
    }

    #[test]
    fn explicit_missing_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_app_config(Some(&dir.path().join("missing.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn loads_explicit_config_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[container]\nname = \"custom\"\n").unwrap();

        let config = load_app_config(Some(&path)).unwrap();

        assert_eq!(config.container.name.as_deref(), Some("custom"));
        assert_eq!(config.scan.artifact_path.as_deref(), Some("/tmp"));
    }

    #[test]
    fn installs_template_once() {
        let dir = tempfile::tempdir().unwrap();

        let (path, written) = install_default_config(dir.path()).unwrap();
        assert!(written);
        assert_eq!(fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG_TEMPLATE);

        fs::write(&path, "# edited").unwrap();
        let (_, written) = install_default_config(dir.path()).unwrap();
        assert!(!written);
        assert_eq!(fs::read_to_string(&path).unwrap(), "# edited");
    }

    #[test]
    fn template_parses_to_defaults() {
        let mut template = parse_app_config(DEFAULT_CONFIG_TEMPLATE, Path::new("template")).unwrap();
        let mut defaults = AppConfig::default();
        defaults.apply_defaults();

        // The template leaves credentials blank; everything else matches the built-in defaults
        template.registry = RegistryConfig::default();
        assert_eq!(template, defaults);
    }

    #[test]
    fn expands_home() {
        let Ok(home) = std::env::var("HOME") else {
            return;
        };
        assert_eq!(expand_path(Path::new("~/scans")), PathBuf::from(home).join("scans"));
    }
}
