use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use bucketstore_core::Storage;

use crate::config::{self, Overrides};

#[derive(Args)]
pub struct GetArgs {
    /// Key to download
    key: String,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

pub async fn run(args: GetArgs, overrides: Overrides) -> Result<()> {
    let storage = config::storage(&overrides)?;
    let mut file = storage.open(&args.key).await?;

    match args.output {
        Some(path) => {
            let mut out = tokio::fs::File::create(&path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?;
            let bytes = tokio::io::copy(&mut file, &mut out).await?;
            eprintln!("Wrote {bytes} bytes to {}", path.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            tokio::io::copy(&mut file, &mut stdout).await?;
        }
    }
    Ok(())
}
