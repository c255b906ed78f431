use anyhow::Result;
use clap::Args;
use console::style;

use bucketstore_core::Storage;

use crate::config::{self, Overrides};

#[derive(Args)]
pub struct StatArgs {
    /// Key to inspect
    key: String,

    /// Print as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: StatArgs, overrides: Overrides) -> Result<()> {
    let storage = config::storage(&overrides)?;
    let size = storage.size(&args.key).await?;
    let modified = storage.modified_time(&args.key).await?;
    let url = storage.url(&args.key);

    if args.json {
        let out = serde_json::json!({
            "key": args.key,
            "size": size,
            "modified": modified.to_rfc3339(),
            "url": url,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}  {}", style("Key:     ").bold(), args.key);
        println!("{}  {} ({})", style("Size:    ").bold(), format_bytes(size), size);
        println!(
            "{}  {}",
            style("Modified:").bold(),
            modified.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("{}  {}", style("URL:     ").bold(), url);
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
