use anyhow::Result;
use clap::Args;
use tracing::info;

use bucketstore_core::{Location, Settings};

use crate::config::{AppConfig, BackendConfig, Overrides};
use crate::progress;

#[derive(Args)]
pub struct InitArgs {
    /// Backend type: s3 or local
    #[arg(long, default_value = "s3")]
    backend: String,

    /// Directory for the local backend
    #[arg(long)]
    path: Option<String>,

    /// Access key
    #[arg(long)]
    access_key: Option<String>,

    /// Secret key (prompted for when omitted)
    #[arg(long)]
    secret_key: Option<String>,

    /// Create or fetch the bucket right away
    #[arg(long)]
    provision: bool,
}

pub async fn run(args: InitArgs, overrides: Overrides) -> Result<()> {
    let backend = match args.backend.as_str() {
        "s3" => BackendConfig::S3,
        "local" => {
            let path = args
                .path
                .ok_or_else(|| anyhow::anyhow!("--path required for local backend"))?;
            BackendConfig::Local { path }
        }
        other => anyhow::bail!("unknown backend: {other} (supported: s3, local)"),
    };

    let bucket_name = overrides
        .bucket
        .clone()
        .ok_or_else(|| anyhow::anyhow!("--bucket required"))?;
    let location = overrides
        .location
        .as_deref()
        .unwrap_or(Location::Default.name())
        .parse::<Location>()?;

    let (access_key, secret_key) = match backend {
        BackendConfig::S3 => {
            let access_key = args
                .access_key
                .ok_or_else(|| anyhow::anyhow!("--access-key required for S3 backend"))?;
            let secret_key = match args.secret_key {
                Some(secret) => secret,
                None => dialoguer::Password::new()
                    .with_prompt("Secret key")
                    .interact()?,
            };
            (Some(access_key), Some(secret_key))
        }
        BackendConfig::Local { .. } => (args.access_key, args.secret_key),
    };

    let defaults = Settings::default();
    let config = AppConfig {
        backend,
        settings: Settings {
            bucket_name: Some(bucket_name),
            access_key,
            secret_key,
            location: location.name().to_string(),
            host: overrides.host.clone().unwrap_or(defaults.host),
            endpoint: overrides.endpoint.clone(),
        },
    };
    config.save()?;

    if args.provision {
        let storage = config.open_storage(&Overrides::default())?;
        let spinner = progress::create_spinner("Resolving bucket...");
        let bucket = storage.bucket().await?;
        spinner.finish_with_message("done");
        println!("Bucket ready: {}", bucket.name());
    }

    info!(
        config_path = %AppConfig::config_path().display(),
        "Config saved."
    );
    println!("Config: {}", AppConfig::config_path().display());
    Ok(())
}
