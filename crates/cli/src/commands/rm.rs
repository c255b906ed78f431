use anyhow::Result;
use clap::Args;

use bucketstore_core::Storage;

use crate::config::{self, Overrides};

#[derive(Args)]
pub struct RmArgs {
    /// Keys to delete
    #[arg(required = true)]
    keys: Vec<String>,
}

pub async fn run(args: RmArgs, overrides: Overrides) -> Result<()> {
    let storage = config::storage(&overrides)?;
    for key in &args.keys {
        storage.delete(key).await?;
        println!("Deleted: {key}");
    }
    Ok(())
}
