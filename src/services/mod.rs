mod container_service;
mod image_service;
mod scanner;

pub use container_service::ContainerService;
pub use image_service::ImageService;
pub use scanner::{ScanReport, Scanner};
