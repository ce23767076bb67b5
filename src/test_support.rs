use crate::domain::{
    Container, ContainerRuntime, ContainerSpec, ContainerState, Credentials, ImageRef,
};
use anyhow::{Result, bail};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Debug, Clone)]
pub struct MockContainer {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
    pub exit_code: Option<i64>,
    pub spec: MockContainerSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockContainerSpec {
    pub image: String,
    pub env: Vec<String>,
    pub port: Option<u16>,
    pub entrypoint: Option<Vec<String>>,
}

/// In-memory engine that records every call.
///
/// Containers created with an entrypoint script exit with `script_exit_code`
/// the first time they are inspected after starting; `None` keeps them running.
#[derive(Debug)]
pub struct MockRuntime {
    containers: RwLock<HashMap<String, MockContainer>>,
    images: RwLock<HashSet<String>>,
    missing_images: RwLock<HashSet<String>>,
    commands: RwLock<Vec<String>>,
    fail_on: RwLock<Option<String>>,
    script_exit_code: RwLock<Option<i64>>,
    exec_exit_code: RwLock<i64>,
    archive: RwLock<Vec<u8>>,
    available: RwLock<bool>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            images: RwLock::new(HashSet::new()),
            missing_images: RwLock::new(HashSet::new()),
            commands: RwLock::new(Vec::new()),
            fail_on: RwLock::new(None),
            script_exit_code: RwLock::new(Some(0)),
            exec_exit_code: RwLock::new(0),
            archive: RwLock::new(tar_archive(&[])),
            available: RwLock::new(true),
        }
    }

    /// Seeds a container as if left behind by an earlier run
    pub fn add_container(&self, name: &str, state: ContainerState) {
        let id = container_id(name);
        self.containers.write().unwrap().insert(
            id.clone(),
            MockContainer {
                id,
                name: name.to_string(),
                state,
                exit_code: None,
                spec: MockContainerSpec {
                    image: "leftover".to_string(),
                    env: vec![],
                    port: None,
                    entrypoint: None,
                },
            },
        );
    }

    pub fn set_fail_on(&self, operation: &str) {
        *self.fail_on.write().unwrap() = Some(operation.to_string());
    }

    pub fn set_script_exit_code(&self, code: Option<i64>) {
        *self.script_exit_code.write().unwrap() = code;
    }

    pub fn set_exec_exit_code(&self, code: i64) {
        *self.exec_exit_code.write().unwrap() = code;
    }

    pub fn set_archive(&self, data: Vec<u8>) {
        *self.archive.write().unwrap() = data;
    }

    pub fn set_available(&self, available: bool) {
        *self.available.write().unwrap() = available;
    }

    pub fn mark_image_missing(&self, image: &str) {
        self.missing_images
            .write()
            .unwrap()
            .insert(image.to_string());
    }

    pub fn get_commands(&self) -> Vec<String> {
        self.commands.read().unwrap().clone()
    }

    pub fn container_exists(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn get_spec(&self, name: &str) -> Option<MockContainerSpec> {
        self.find(name).map(|c| c.spec)
    }

    pub fn has_image(&self, image: &str) -> bool {
        self.images.read().unwrap().contains(image)
    }

    fn find(&self, name_or_id: &str) -> Option<MockContainer> {
        self.containers
            .read()
            .unwrap()
            .values()
            .find(|c| c.id == name_or_id || c.name == name_or_id)
            .cloned()
    }

    fn record_command(&self, cmd: &str) {
        self.commands.write().unwrap().push(cmd.to_string());
    }

    fn check_fail(&self, operation: &str) -> Result<()> {
        if let Some(ref fail_on) = *self.fail_on.read().unwrap() {
            if fail_on == operation {
                bail!("Mock failure on: {}", operation);
            }
        }
        Ok(())
    }

    fn require(&self, id: &str) -> Result<()> {
        if self.find(id).is_none() {
            bail!("No such container: {id}");
        }
        Ok(())
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

pub fn container_id(name: &str) -> String {
    format!("{name}-id")
}

impl ContainerRuntime for MockRuntime {
    fn is_available(&self) -> bool {
        self.record_command("is_available");
        *self.available.read().unwrap()
    }

    fn pull_image(&self, image: &ImageRef, credentials: Option<&Credentials>) -> Result<()> {
        let reference = image.to_string();
        if let Some(creds) = credentials {
            self.record_command(&format!("login:{}", creds.username));
        }
        self.record_command(&format!("pull:{reference}"));
        self.check_fail("pull")?;

        if self.missing_images.read().unwrap().contains(&reference) {
            bail!("manifest for {reference} not found");
        }

        self.images.write().unwrap().insert(reference);
        Ok(())
    }

    fn build_image(&self, tag: &str, _dockerfile: &str, context: &[u8]) -> Result<()> {
        self.record_command(&format!("build_image:{tag}"));
        self.check_fail("build_image")?;

        if context.is_empty() {
            bail!("empty build context");
        }

        self.images.write().unwrap().insert(tag.to_string());
        Ok(())
    }

    fn remove_image(&self, image: &str) -> Result<()> {
        self.record_command(&format!("remove_image:{image}"));
        self.check_fail("remove_image")?;

        self.images.write().unwrap().remove(image);
        Ok(())
    }

    fn inspect_container(&self, name: &str) -> Result<Option<Container>> {
        self.record_command(&format!("inspect:{name}"));
        self.check_fail("inspect")?;

        let script_exit = *self.script_exit_code.read().unwrap();
        let mut containers = self.containers.write().unwrap();
        let Some(container) = containers
            .values_mut()
            .find(|c| c.id == name || c.name == name)
        else {
            return Ok(None);
        };

        if container.state == ContainerState::Running && container.spec.entrypoint.is_some() {
            if let Some(code) = script_exit {
                container.state = ContainerState::Exited;
                container.exit_code = Some(code);
            }
        }

        let mut found = Container::new(
            container.id.clone(),
            container.name.clone(),
            container.state.clone(),
        );
        if let Some(code) = container.exit_code {
            found = found.with_exit_code(code);
        }
        Ok(Some(found))
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.record_command(&format!("create:{}", spec.name));
        self.check_fail("create")?;

        if self.find(spec.name).is_some() {
            bail!("Conflict. The container name \"/{}\" is already in use", spec.name);
        }

        let id = container_id(spec.name);
        self.containers.write().unwrap().insert(
            id.clone(),
            MockContainer {
                id: id.clone(),
                name: spec.name.to_string(),
                state: ContainerState::Created,
                exit_code: None,
                spec: MockContainerSpec {
                    image: spec.image.to_string(),
                    env: spec.env.to_vec(),
                    port: spec.port,
                    entrypoint: spec.entrypoint.map(|e| e.to_vec()),
                },
            },
        );
        Ok(id)
    }

    fn start_container(&self, id: &str) -> Result<()> {
        self.record_command(&format!("start:{id}"));
        self.check_fail("start")?;
        self.require(id)?;

        if let Some(container) = self.containers.write().unwrap().get_mut(id) {
            container.state = ContainerState::Running;
        }
        Ok(())
    }

    fn exec(&self, id: &str, argv: &[String]) -> Result<i64> {
        self.record_command(&format!("exec:{id}:{}", argv.join(" ")));
        self.check_fail("exec")?;
        self.require(id)?;

        Ok(*self.exec_exit_code.read().unwrap())
    }

    fn copy_from_container(&self, id: &str, path: &str) -> Result<Vec<u8>> {
        self.record_command(&format!("copy:{id}:{path}"));
        self.check_fail("copy")?;
        self.require(id)?;

        Ok(self.archive.read().unwrap().clone())
    }

    fn stop_container(&self, id: &str) -> Result<()> {
        self.record_command(&format!("stop:{id}"));
        self.check_fail("stop")?;
        self.require(id)?;

        if let Some(container) = self.containers.write().unwrap().get_mut(id) {
            container.state = ContainerState::Exited;
        }
        Ok(())
    }

    fn remove_container(&self, id: &str) -> Result<()> {
        self.record_command(&format!("remove:{id}"));
        self.check_fail("remove")?;

        self.containers
            .write()
            .unwrap()
            .retain(|_, c| c.id != id && c.name != id);
        Ok(())
    }
}

/// Builds an uncompressed tar with the given regular files, like `docker cp` emits
pub fn tar_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, body) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *body).unwrap();
    }
    builder.into_inner().unwrap()
}
