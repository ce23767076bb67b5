pub mod archive;
pub mod config;
pub mod docker_adapter;

pub use docker_adapter::DockerAdapter;
