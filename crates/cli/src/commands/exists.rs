use anyhow::Result;
use clap::Args;
use console::style;

use bucketstore_core::Storage;

use crate::config::{self, Overrides};

#[derive(Args)]
pub struct ExistsArgs {
    /// Key to check
    key: String,
}

pub async fn run(args: ExistsArgs, overrides: Overrides) -> Result<()> {
    let storage = config::storage(&overrides)?;
    if storage.exists(&args.key).await? {
        println!("{} {}", style("found").green(), args.key);
        Ok(())
    } else {
        println!("{} {}", style("missing").red(), args.key);
        anyhow::bail!("'{}' does not exist", args.key)
    }
}
