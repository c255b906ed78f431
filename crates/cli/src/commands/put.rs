use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use bucketstore_core::Storage;

use crate::config::{self, Overrides};
use crate::progress;

#[derive(Args)]
pub struct PutArgs {
    /// Local file to upload
    file: PathBuf,

    /// Key to store it under (defaults to the file name)
    #[arg(long)]
    key: Option<String>,
}

pub async fn run(args: PutArgs, overrides: Overrides) -> Result<()> {
    let storage = config::storage(&overrides)?;

    let key = match args.key {
        Some(key) => key,
        None => args
            .file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("cannot derive a key from {}", args.file.display()))?,
    };

    let mut file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("failed to open {}", args.file.display()))?;

    let spinner = progress::create_spinner(&format!("Uploading {key}..."));
    let result = storage.save(&key, &mut file).await;
    match &result {
        Ok(_) => spinner.finish_with_message("done"),
        Err(_) => spinner.abandon_with_message("failed"),
    }
    let key = result?;

    println!("Stored: {key}");
    println!("URL:    {}", storage.url(&key));
    Ok(())
}
