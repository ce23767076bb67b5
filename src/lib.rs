pub mod cli;
pub mod domain;
pub mod infra;
pub mod services;

// Make test_support available for integration tests
pub mod test_support;

pub use domain::{
    ArtifactSpec, BuildScanJob, Container, ContainerRuntime, ContainerSpec, ContainerState,
    Credentials, ImageRef, ScanJob, ScanMode, ShellScript,
};
pub use infra::DockerAdapter;
pub use services::{ContainerService, ImageService, ScanReport, Scanner};
