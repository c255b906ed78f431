use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};

use bucketstore_core::backend::Service;
use bucketstore_core::backend::local::LocalService;
use bucketstore_core::backend::s3::S3Service;
use bucketstore_core::{BucketStorage, Settings, StorageOptions};

const CONFIG_FILE: &str = "bucketstore.toml";

#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub settings: Settings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BackendConfig {
    #[serde(rename = "s3")]
    S3,
    #[serde(rename = "local")]
    Local { path: String },
}

/// On-disk form of [`AppConfig`]; unset settings fall back to the environment.
#[derive(Deserialize)]
struct ConfigFile {
    backend: BackendConfig,
    #[serde(default)]
    settings: FileSettings,
}

#[derive(Default, Deserialize)]
struct FileSettings {
    bucket_name: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
    location: Option<String>,
    host: Option<String>,
    endpoint: Option<String>,
}

/// Per-invocation overrides of the configured settings.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Bucket name
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Bucket location (DEFAULT, EU, USWest, USWest2, SAEast, APNortheast, ...)
    #[arg(long, global = true)]
    pub location: Option<String>,

    /// Public host used to build URLs
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// S3-compatible endpoint URL
    #[arg(long, global = true)]
    pub endpoint: Option<String>,
}

impl Overrides {
    fn to_options(&self) -> StorageOptions {
        StorageOptions {
            bucket_name: self.bucket.clone(),
            location: self.location.clone(),
            host: self.host.clone(),
            ..StorageOptions::default()
        }
    }
}

impl AppConfig {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bucketstore")
            .join(CONFIG_FILE)
    }

    /// Load the config file, or fall back to the environment when there is none.
    /// Settings missing from the file are taken from the environment.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self {
                backend: BackendConfig::S3,
                settings: Settings::from_env(),
            });
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Self::parse(&content, Settings::from_env())
    }

    /// Parse a config file, taking every setting it leaves out from `env`.
    fn parse(content: &str, env: Settings) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content).context("failed to parse config")?;
        let settings = file.settings;
        Ok(Self {
            backend: file.backend,
            settings: Settings {
                bucket_name: settings.bucket_name.or(env.bucket_name),
                access_key: settings.access_key.or(env.access_key),
                secret_key: settings.secret_key.or(env.secret_key),
                location: settings.location.unwrap_or(env.location),
                host: settings.host.unwrap_or(env.host),
                endpoint: settings.endpoint.or(env.endpoint),
            },
        })
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Install the loaded settings process-wide and build the storage.
    pub fn open_storage(self, overrides: &Overrides) -> Result<BucketStorage> {
        let mut options = overrides.to_options();
        let service: Arc<dyn Service> = match &self.backend {
            BackendConfig::S3 => {
                let endpoint = overrides
                    .endpoint
                    .clone()
                    .or_else(|| self.settings.endpoint.clone());
                Arc::new(S3Service::new(endpoint))
            }
            BackendConfig::Local { path } => {
                if self.settings.access_key.is_none() {
                    options = options.credentials("local", "local");
                }
                Arc::new(LocalService::new(path))
            }
        };

        Settings::install(self.settings);
        BucketStorage::new(options, service).context("invalid storage configuration")
    }
}

/// Shortcut used by every command that works on the configured storage.
pub fn storage(overrides: &Overrides) -> Result<BucketStorage> {
    AppConfig::load()?.open_storage(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_backend_config() {
        let config = AppConfig::parse(
            r#"
            [backend]
            type = "local"
            path = "/srv/objects"

            [settings]
            bucket_name = "media"
            location = "EU"
            "#,
            Settings::default(),
        )
        .unwrap();
        assert!(matches!(config.backend, BackendConfig::Local { ref path } if path == "/srv/objects"));
        assert_eq!(config.settings.bucket_name.as_deref(), Some("media"));
        assert_eq!(config.settings.location, "EU");
        assert_eq!(config.settings.host, bucketstore_core::settings::DEFAULT_HOST);
    }

    #[test]
    fn environment_fills_every_unset_setting() {
        let env = Settings {
            bucket_name: Some("env-bucket".into()),
            access_key: Some("env-ak".into()),
            secret_key: Some("env-sk".into()),
            location: "USWest2".into(),
            host: "cdn.example.com".into(),
            endpoint: Some("http://env:9000".into()),
        };
        let config = AppConfig::parse(
            r#"
            [backend]
            type = "s3"

            [settings]
            bucket_name = "file-bucket"
            "#,
            env,
        )
        .unwrap();
        assert_eq!(config.settings.bucket_name.as_deref(), Some("file-bucket"));
        assert_eq!(config.settings.access_key.as_deref(), Some("env-ak"));
        assert_eq!(config.settings.location, "USWest2");
        assert_eq!(config.settings.host, "cdn.example.com");
        assert_eq!(config.settings.endpoint.as_deref(), Some("http://env:9000"));
    }

    #[test]
    fn file_settings_win_over_environment() {
        let env = Settings {
            location: "EU".into(),
            host: "env.example.com".into(),
            ..Settings::default()
        };
        let config = AppConfig::parse(
            r#"
            [backend]
            type = "s3"

            [settings]
            location = "SAEast"
            host = "file.example.com"
            "#,
            env,
        )
        .unwrap();
        assert_eq!(config.settings.location, "SAEast");
        assert_eq!(config.settings.host, "file.example.com");
    }

    #[test]
    fn s3_config_roundtrips() {
        let config = AppConfig {
            backend: BackendConfig::S3,
            settings: Settings {
                bucket_name: Some("media".into()),
                endpoint: Some("http://localhost:9000".into()),
                ..Settings::default()
            },
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed = AppConfig::parse(&text, Settings::default()).unwrap();
        assert!(matches!(parsed.backend, BackendConfig::S3));
        assert_eq!(parsed.settings, config.settings);
    }

    #[test]
    fn overrides_become_options() {
        let overrides = Overrides {
            bucket: Some("b".into()),
            location: Some("USWest".into()),
            ..Overrides::default()
        };
        let options = overrides.to_options();
        assert_eq!(options.bucket_name.as_deref(), Some("b"));
        assert_eq!(options.location.as_deref(), Some("USWest"));
        assert!(options.access_key.is_none());
    }
}
