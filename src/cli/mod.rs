pub mod build_scan;
pub mod doctor;
pub mod init;
pub mod scan;

pub use build_scan::BuildScanArgs;
pub use init::InitArgs;
pub use scan::ScanArgs;
