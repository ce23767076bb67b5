use crate::domain::{
    Container, ContainerRuntime, ContainerSpec, ContainerState, Credentials, ImageRef,
};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::ffi::OsStr;
use std::io::Write;
use std::path::Path;
use std::process::{Command, ExitStatus, Output, Stdio};
use tracing::{debug, info, warn};

pub const DEFAULT_ENGINE: &str = "docker";

/// Drives the engine through its CLI (`docker`, or a compatible binary such as `podman`)
#[derive(Debug, Clone)]
pub struct DockerAdapter {
    binary: String,
}

impl DockerAdapter {
    pub fn new() -> Self {
        Self::with_binary(DEFAULT_ENGINE)
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    fn run<I, S>(&self, args: I, context: &str) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let status = self.status(args, context)?;
        ensure_success(&self.binary, status, context)
    }

    fn status<I, S>(&self, args: I, context: &str) -> Result<ExitStatus>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.command()
            .args(args)
            .status()
            .with_context(|| format!("{context} (is '{}' installed?)", self.binary))
    }

    fn output<I, S>(&self, args: I, context: &str) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.command()
            .args(args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("{context} (is '{}' installed?)", self.binary))
    }

    fn login(&self, docker_config: &Path, registry: Option<&str>, creds: &Credentials) -> Result<()> {
        let context = format!(
            "logging in to {} as {}",
            registry.unwrap_or("Docker Hub"),
            creds.username
        );

        let mut child = self
            .command()
            .env("DOCKER_CONFIG", docker_config)
            .args(login_args(registry, &creds.username))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .with_context(|| context.clone())?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(creds.password.as_bytes())
                .with_context(|| context.clone())?;
        }

        let status = child.wait().with_context(|| context.clone())?;
        ensure_success(&self.binary, status, &context)
    }
}

impl Default for DockerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerRuntime for DockerAdapter {
    fn is_available(&self) -> bool {
        self.command()
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn pull_image(&self, image: &ImageRef, credentials: Option<&Credentials>) -> Result<()> {
        let reference = image.to_string();
        let context = format!("pulling image {reference}");

        let Some(creds) = credentials else {
            return self.run(["pull", reference.as_str()], &context);
        };

        // Throwaway config dir so the login never lands in ~/.docker
        let docker_config = tempfile::tempdir().context("creating temporary docker config")?;
        self.login(docker_config.path(), image.registry(), creds)?;

        let status = self
            .command()
            .env("DOCKER_CONFIG", docker_config.path())
            .args(["pull", reference.as_str()])
            .status()
            .with_context(|| context.clone())?;
        ensure_success(&self.binary, status, &context)
    }

    fn build_image(&self, tag: &str, dockerfile: &str, context_tar: &[u8]) -> Result<()> {
        let context = format!("building image {tag}");

        let mut child = self
            .command()
            .args(build_args(tag, dockerfile))
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| context.clone())?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(context_tar)
                .with_context(|| format!("streaming build context for {tag}"))?;
        }

        let status = child.wait().with_context(|| context.clone())?;
        ensure_success(&self.binary, status, &context)
    }

    fn remove_image(&self, image: &str) -> Result<()> {
        self.run(["rmi", image], &format!("removing image {image}"))
    }

    fn inspect_container(&self, name: &str) -> Result<Option<Container>> {
        let output = self.output(
            ["container", "inspect", name],
            &format!("inspecting container {name}"),
        )?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_not_found(&stderr) {
                return Ok(None);
            }
            bail!(
                "{} returned status {:?} inspecting {name}: {}",
                self.binary,
                output.status,
                stderr.trim()
            );
        }

        parse_inspect(&output.stdout).with_context(|| format!("parsing inspect output for {name}"))
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let context = format!("creating container {}", spec.name);
        let output = self.output(create_args(spec), &context)?;

        if !output.status.success() {
            bail!(
                "{} returned status {:?} ({context}): {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            bail!("{} did not report an id ({context})", self.binary);
        }

        debug!("Created container {} ({id})", spec.name);
        Ok(id)
    }

    fn start_container(&self, id: &str) -> Result<()> {
        let output = self.output(["start", id], &format!("starting container {id}"))?;
        if !output.status.success() {
            bail!(
                "{} returned status {:?} starting {id}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    fn exec(&self, id: &str, argv: &[String]) -> Result<i64> {
        let status = self
            .command()
            .arg("exec")
            .arg(id)
            .args(argv)
            .status()
            .with_context(|| format!("executing commands in {id}"))?;

        match status.code() {
            Some(code) => Ok(i64::from(code)),
            None => bail!("exec in {id} was terminated by a signal"),
        }
    }

    fn copy_from_container(&self, id: &str, path: &str) -> Result<Vec<u8>> {
        let source = format!("{id}:{path}");
        let output = self.output(["cp", source.as_str(), "-"], &format!("copying {source}"))?;

        if !output.status.success() {
            bail!(
                "{} returned status {:?} copying {source}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        info!("Copied {} bytes from {source}", output.stdout.len());
        Ok(output.stdout)
    }

    fn stop_container(&self, id: &str) -> Result<()> {
        let output = self.output(["stop", id], &format!("stopping container {id}"))?;
        if !output.status.success() {
            bail!(
                "{} returned status {:?} stopping {id}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    fn remove_container(&self, id: &str) -> Result<()> {
        let output = self.output(["rm", "-f", "-v", id], &format!("removing container {id}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_not_found(&stderr) {
                warn!("Container {id} was already gone");
                return Ok(());
            }
            bail!(
                "{} returned status {:?} removing {id}: {}",
                self.binary,
                output.status,
                stderr.trim()
            );
        }

        Ok(())
    }
}

pub fn login_args(registry: Option<&str>, username: &str) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "login".into(),
        "--username".into(),
        username.into(),
        "--password-stdin".into(),
    ];
    if let Some(registry) = registry {
        args.push(registry.into());
    }
    args
}

pub fn build_args(tag: &str, dockerfile: &str) -> Vec<String> {
    vec![
        "build".into(),
        "--tag".into(),
        tag.into(),
        "--file".into(),
        dockerfile.into(),
        "--pull".into(),
        "--rm".into(),
        "--quiet".into(),
        "-".into(),
    ]
}

pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args: Vec<String> = vec!["create".into(), "--name".into(), spec.name.into()];

    args.push("--network".into());
    args.push(spec.network.into());
    args.push("--restart".into());
    args.push(spec.restart_policy.into());
    args.push("--log-driver".into());
    args.push(spec.log_driver.into());

    for env in spec.env {
        args.push("--env".into());
        args.push(env.clone());
    }

    if let Some(port) = spec.port {
        args.push("--publish".into());
        args.push(format!("0.0.0.0:{port}:{port}/tcp"));
        args.push("--expose".into());
        args.push(format!("{port}/tcp"));
    }

    let (entrypoint, rest) = match spec.entrypoint {
        Some([first, rest @ ..]) => (Some(first), rest),
        _ => (None, &[][..]),
    };

    if let Some(entrypoint) = entrypoint {
        args.push("--entrypoint".into());
        args.push(entrypoint.clone());
    }

    args.push(spec.image.into());
    args.extend(rest.iter().cloned());

    args
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectRecord {
    id: String,
    #[serde(default)]
    name: String,
    state: InspectState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    status: String,
    #[serde(default)]
    running: bool,
    #[serde(default)]
    exit_code: i64,
}

fn parse_inspect(stdout: &[u8]) -> Result<Option<Container>> {
    let records: Vec<InspectRecord> = serde_json::from_slice(stdout)?;
    let Some(record) = records.into_iter().next() else {
        return Ok(None);
    };

    let mut state = ContainerState::from_status(&record.state.status);
    if record.state.running && !state.is_active() {
        state = ContainerState::Running;
    }

    let name = record.name.trim_start_matches('/').to_string();
    let container = Container::new(record.id, name, state);

    Ok(Some(if container.is_running() {
        container
    } else {
        container.with_exit_code(record.state.exit_code)
    }))
}

fn is_not_found(stderr: &str) -> bool {
    stderr.to_ascii_lowercase().contains("no such")
}

fn ensure_success(binary: &str, status: ExitStatus, context: &str) -> Result<()> {
    if status.success() {
        return Ok(());
    }

    bail!("{binary} returned status {:?} ({context})", status)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn create_args_with_entrypoint_script() {
        let env = strings(&["DB_HOST=192.168.225.51", "DB_PORT=9876"]);
        let argv = strings(&["/bin/sh", "-c", "pip3 freeze && echo ok"]);
        let spec = ContainerSpec::new("scan_container", "python:3")
            .env(&env)
            .port(Some(8080))
            .entrypoint(&argv);

        assert_eq!(
            create_args(&spec),
            strings(&[
                "create",
                "--name",
                "scan_container",
                "--network",
                "bridge",
                "--restart",
                "no",
                "--log-driver",
                "json-file",
                "--env",
                "DB_HOST=192.168.225.51",
                "--env",
                "DB_PORT=9876",
                "--publish",
                "0.0.0.0:8080:8080/tcp",
                "--expose",
                "8080/tcp",
                "--entrypoint",
                "/bin/sh",
                "python:3",
                "-c",
                "pip3 freeze && echo ok",
            ])
        );
    }

    #[test]
    fn create_args_keep_image_entrypoint() {
        let spec = ContainerSpec::new("app", "app:latest");
        let args = create_args(&spec);

        assert!(!args.contains(&"--entrypoint".to_string()));
        assert!(!args.contains(&"--publish".to_string()));
        assert!(!args.contains(&"--expose".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("app:latest"));
    }

    #[test]
    fn login_args_target_registry() {
        assert_eq!(
            login_args(Some("registry.local:5000"), "bob"),
            strings(&[
                "login",
                "--username",
                "bob",
                "--password-stdin",
                "registry.local:5000"
            ])
        );
        assert_eq!(login_args(None, "bob").len(), 4);
    }

    #[test]
    fn build_args_read_context_from_stdin() {
        let args = build_args("go-check", "Dockerfile");
        assert_eq!(args.first().map(String::as_str), Some("build"));
        assert_eq!(args.last().map(String::as_str), Some("-"));
        assert!(args.windows(2).any(|w| w[0] == "--file" && w[1] == "Dockerfile"));
    }

    #[test]
    fn parses_exited_container() {
        let json = br#"[{"Id":"abc123","Name":"/scan_container","State":{"Status":"exited","Running":false,"ExitCode":2}}]"#;
        let container = parse_inspect(json).unwrap().unwrap();

        assert_eq!(container.id, "abc123");
        assert_eq!(container.name, "scan_container");
        assert_eq!(container.state, ContainerState::Exited);
        assert_eq!(container.exit_code, Some(2));
    }

    #[test]
    fn parses_running_container() {
        let json = br#"[{"Id":"abc","Name":"/x","State":{"Status":"running","Running":true,"ExitCode":0}}]"#;
        let container = parse_inspect(json).unwrap().unwrap();

        assert!(container.is_running());
        assert_eq!(container.exit_code, None);
    }

    #[test]
    fn empty_inspect_is_missing() {
        assert!(parse_inspect(b"[]").unwrap().is_none());
        assert!(parse_inspect(b"not json").is_err());
    }

    #[test]
    fn detects_not_found_messages() {
        assert!(is_not_found("Error: No such container: scan_container"));
        assert!(is_not_found("Error: no such container scan"));
        assert!(!is_not_found("Cannot connect to the Docker daemon"));
    }
}
