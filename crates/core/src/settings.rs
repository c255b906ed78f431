use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::backend::Credentials;
use crate::error::{Result, StorageError};
use crate::location::Location;

pub const DEFAULT_HOST: &str = "s3.amazonaws.com";

const ENV_BUCKET: &str = "S3_BUCKET";
const ENV_ACCESS_KEY: &str = "AWS_ACCESS_KEY_ID";
const ENV_SECRET_KEY: &str = "AWS_SECRET_ACCESS_KEY";
const ENV_LOCATION: &str = "S3_BUCKET_LOCATION";
const ENV_HOST: &str = "S3_HOST";
const ENV_ENDPOINT: &str = "S3_ENDPOINT";

static GLOBAL: OnceLock<Settings> = OnceLock::new();

/// Process-wide defaults for every storage instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub bucket_name: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_host")]
    pub host: String,
    pub endpoint: Option<String>,
}

fn default_location() -> String {
    Location::Default.name().to_string()
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bucket_name: None,
            access_key: None,
            secret_key: None,
            location: default_location(),
            host: default_host(),
            endpoint: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        Self {
            bucket_name: get(ENV_BUCKET),
            access_key: get(ENV_ACCESS_KEY),
            secret_key: get(ENV_SECRET_KEY),
            location: get(ENV_LOCATION).unwrap_or_else(default_location),
            host: get(ENV_HOST).unwrap_or_else(default_host),
            endpoint: get(ENV_ENDPOINT),
        }
    }

    /// Install the process-wide settings. Returns false if they were already set.
    pub fn install(settings: Settings) -> bool {
        GLOBAL.set(settings).is_ok()
    }

    /// Process-wide settings, read from the environment on first use unless
    /// installed earlier.
    pub fn global() -> &'static Settings {
        GLOBAL.get_or_init(Settings::from_env)
    }
}

/// Per-instance overrides. `None` falls back to [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    pub bucket_name: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub location: Option<String>,
    pub host: Option<String>,
}

impl StorageOptions {
    pub fn bucket(mut self, name: impl Into<String>) -> Self {
        self.bucket_name = Some(name.into());
        self
    }

    pub fn credentials(mut self, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

/// Fully resolved configuration of one storage instance.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket_name: String,
    pub credentials: Credentials,
    pub location: Location,
    pub host: String,
}

impl StorageConfig {
    pub fn resolve(options: StorageOptions, settings: &Settings) -> Result<Self> {
        let required = |value: Option<String>, fallback: &Option<String>, what: &str| {
            value
                .or_else(|| fallback.clone())
                .ok_or_else(|| StorageError::Config(what.to_string()))
        };

        let bucket_name = required(options.bucket_name, &settings.bucket_name, "bucket name")?;
        let access_key = required(options.access_key, &settings.access_key, "access key")?;
        let secret_key = required(options.secret_key, &settings.secret_key, "secret key")?;
        let location = options
            .location
            .as_deref()
            .unwrap_or(&settings.location)
            .parse::<Location>()?;

        Ok(Self {
            bucket_name,
            credentials: Credentials::new(access_key, secret_key),
            location,
            host: options.host.unwrap_or_else(|| settings.host.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn reads_variables_with_defaults() {
        let settings = Settings::from_lookup(lookup(&[
            ("S3_BUCKET", "media"),
            ("AWS_ACCESS_KEY_ID", "AKIA"),
            ("AWS_SECRET_ACCESS_KEY", "shh"),
            ("S3_HOST", ""),
        ]));
        assert_eq!(settings.bucket_name.as_deref(), Some("media"));
        assert_eq!(settings.location, "DEFAULT");
        assert_eq!(settings.host, DEFAULT_HOST);
        assert_eq!(settings.endpoint, None);
    }

    #[test]
    fn overrides_win_over_settings() {
        let settings = Settings {
            bucket_name: Some("from-settings".into()),
            access_key: Some("ak".into()),
            secret_key: Some("sk".into()),
            ..Settings::default()
        };
        let options = StorageOptions::default()
            .bucket("override")
            .location("EU")
            .host("storage.example.com");
        let config = StorageConfig::resolve(options, &settings).unwrap();
        assert_eq!(config.bucket_name, "override");
        assert_eq!(config.location, Location::Eu);
        assert_eq!(config.host, "storage.example.com");
        assert_eq!(config.credentials.access_key(), "ak");
    }

    #[test]
    fn missing_bucket_fails() {
        let err = StorageConfig::resolve(StorageOptions::default(), &Settings::default()).unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[test]
    fn unknown_location_fails() {
        let options = StorageOptions::default()
            .bucket("b")
            .credentials("ak", "sk")
            .location("Atlantis");
        let err = StorageConfig::resolve(options, &Settings::default()).unwrap_err();
        assert!(matches!(err, StorageError::UnknownLocation(_)));
    }
}
