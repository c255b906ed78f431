use anyhow::Result;
use clap::Args;

use bucketstore_core::Storage;

use crate::config::{self, Overrides};

#[derive(Args)]
pub struct UrlArgs {
    /// Key to build the URL for
    key: String,
}

pub async fn run(args: UrlArgs, overrides: Overrides) -> Result<()> {
    let storage = config::storage(&overrides)?;
    println!("{}", storage.url(&args.key));
    Ok(())
}
