use super::{Container, ContainerSpec, Credentials, ImageRef};
use anyhow::Result;
use std::fmt::Debug;

/// Trait for container engine operations
pub trait ContainerRuntime: Send + Sync + Debug {
    /// Check if the engine binary is reachable
    fn is_available(&self) -> bool;

    /// Pull an image, logging in first when credentials are given
    fn pull_image(&self, image: &ImageRef, credentials: Option<&Credentials>) -> Result<()>;

    /// Build an image from a tar build context
    fn build_image(&self, tag: &str, dockerfile: &str, context: &[u8]) -> Result<()>;

    /// Remove an image
    fn remove_image(&self, image: &str) -> Result<()>;

    /// Inspect a container by name or id; `None` if it does not exist
    fn inspect_container(&self, name: &str) -> Result<Option<Container>>;

    /// Create a container and return its id
    fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Start a created container
    fn start_container(&self, id: &str) -> Result<()>;

    /// Run a command inside a running container and return its exit code
    fn exec(&self, id: &str, argv: &[String]) -> Result<i64>;

    /// Copy a path out of the container as a tar stream
    fn copy_from_container(&self, id: &str, path: &str) -> Result<Vec<u8>>;

    /// Stop a container
    fn stop_container(&self, id: &str) -> Result<()>;

    /// Force-remove a container together with its anonymous volumes
    fn remove_container(&self, id: &str) -> Result<()>;
}
