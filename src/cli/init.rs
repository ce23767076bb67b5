use crate::infra::config::{expand_path, install_default_config};
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory receiving image-scan.toml
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
}

pub fn run(args: InitArgs) -> Result<()> {
    let dir = expand_path(&args.dir);
    info!("Preparing config in {:?}", dir);

    let (path, written) = install_default_config(&dir)?;
    if written {
        info!("Config written to {:?}. Adjust it as needed.", path);
    } else {
        warn!("{:?} already exists, left untouched", path);
    }

    Ok(())
}
