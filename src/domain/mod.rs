mod container;
mod image;
pub mod job;
pub mod traits;

pub use container::{Container, ContainerSpec, ContainerState};
pub use image::{Credentials, ImageRef};
pub use job::{ArtifactSpec, BuildScanJob, ScanJob, ScanMode, Separator, ShellScript, WaitPolicy};
pub use traits::ContainerRuntime;
