use anyhow::Result;
use clap::Args;
use futures::TryStreamExt;

use bucketstore_core::Storage;

use crate::config::{self, Overrides};

#[derive(Args)]
pub struct LsArgs {
    /// Path prefix to list, e.g. `photos/`
    #[arg(default_value = "")]
    path: String,
}

pub async fn run(args: LsArgs, overrides: Overrides) -> Result<()> {
    let storage = config::storage(&overrides)?;
    let (_, mut names) = storage.listdir(&args.path).await?;

    let mut count = 0u64;
    while let Some(name) = names.try_next().await? {
        println!("{name}");
        count += 1;
    }
    if count == 0 {
        eprintln!("No files found.");
    }
    Ok(())
}
