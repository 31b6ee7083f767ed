use anyhow::Context;
use serde::Deserialize;
use std::{path::PathBuf, time::Duration};

use crate::remote::b2::{B2Credentials, DEFAULT_AUTH_URL};

pub const KEY_ID_ENV: &str = "MEDIADECK_REMOTE_KEY_ID";
pub const APPLICATION_KEY_ENV: &str = "MEDIADECK_REMOTE_APPLICATION_KEY";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    pub library: LibrarySource,
    pub remote: Option<Remote>,
    #[serde(default)]
    pub cache: CacheConfig,
    pub http: HttpConfig,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Config> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config {path}"))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Config> {
        toml::from_str(contents).with_context(|| "Failed to parse config TOML")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct LibrarySource {
    pub root: PathBuf,
    #[serde(default)]
    pub follow_symlinks: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Remote {
    #[serde(default)]
    pub key_id: String,
    #[serde(default)]
    pub application_key: String,
    pub bucket: String,
    /// Top level folders that may be browsed; empty allows any
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
}

impl Remote {
    /// Resolves credentials from the config, falling back to the environment.
    /// `None` when either half is missing.
    pub fn credentials(&self) -> Option<B2Credentials> {
        let pick = |configured: &str, env: &str| {
            Some(configured.trim().to_string())
                .filter(|v| !v.is_empty())
                .or_else(|| std::env::var(env).ok().filter(|v| !v.trim().is_empty()))
        };

        Some(B2Credentials {
            key_id: pick(&self.key_id, KEY_ID_ENV)?,
            application_key: pick(&self.application_key, APPLICATION_KEY_ENV)?,
            bucket: self.bucket.clone(),
            auth_url: self.auth_url.clone(),
        })
    }
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub listing_ttl_secs: u64,
    pub metadata_ttl_secs: u64,
    pub connectivity_ttl_secs: u64,
    pub probe_timeout_secs: u64,
    pub metadata_range_bytes: u64,
    pub staging_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            listing_ttl_secs: 24 * 60 * 60,
            metadata_ttl_secs: 24 * 60 * 60,
            connectivity_ttl_secs: 5 * 60,
            probe_timeout_secs: 5,
            metadata_range_bytes: 5 * 1024 * 1024,
            staging_dir: None,
        }
    }
}

/// Cache settings in the units the core works with.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub listing_ttl: Duration,
    pub metadata_ttl: Duration,
    pub connectivity_ttl: Duration,
    pub probe_timeout: Duration,
    pub metadata_range_bytes: u64,
    pub staging_dir: Option<PathBuf>,
}

impl From<&CacheConfig> for CacheSettings {
    fn from(c: &CacheConfig) -> Self {
        Self {
            listing_ttl: Duration::from_secs(c.listing_ttl_secs),
            metadata_ttl: Duration::from_secs(c.metadata_ttl_secs),
            connectivity_ttl: Duration::from_secs(c.connectivity_ttl_secs),
            probe_timeout: Duration::from_secs(c.probe_timeout_secs),
            metadata_range_bytes: c.metadata_range_bytes.max(1),
            staging_dir: c.staging_dir.clone(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_full_config_toml() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[library]
root = "/home/user/Music"
follow_symlinks = true

[remote]
key_id = "0012ab"
application_key = "K001secret"
bucket = "media"
folders = ["analog", "digital"]

[cache]
listing_ttl_secs = 60
probe_timeout_secs = 2

[http]
bind_addr = "127.0.0.1"
port = 8080
"#;

        let cfg = Config::parse(toml_str)?;

        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.library.root, PathBuf::from("/home/user/Music"));
        assert!(cfg.library.follow_symlinks);

        let remote = cfg.remote.as_ref().unwrap();
        assert_eq!(remote.folders, vec!["analog", "digital"]);
        assert_eq!(remote.auth_url, DEFAULT_AUTH_URL);
        let creds = remote.credentials().unwrap();
        assert_eq!(creds.key_id, "0012ab");
        assert_eq!(creds.bucket, "media");

        let settings = CacheSettings::from(&cfg.cache);
        assert_eq!(settings.listing_ttl, Duration::from_secs(60));
        assert_eq!(settings.probe_timeout, Duration::from_secs(2));
        // unspecified values keep their defaults
        assert_eq!(settings.metadata_ttl, Duration::from_secs(86400));
        assert_eq!(settings.connectivity_ttl, Duration::from_secs(300));

        Ok(())
    }

    #[test]
    fn test_parse_local_only_config() -> anyhow::Result<()> {
        let toml_str = r#"
version = 1

[library]
root = "/srv/music"

[http]
bind_addr = "0.0.0.0"
port = 80
"#;

        let cfg = Config::parse(toml_str)?;

        assert!(cfg.remote.is_none());
        assert!(!cfg.library.follow_symlinks);
        assert_eq!(cfg.cache.metadata_range_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.http.port, 80);

        Ok(())
    }

    #[test]
    fn test_blank_credentials_are_not_configured() {
        let remote = Remote {
            key_id: "   ".into(),
            application_key: "secret".into(),
            bucket: "media".into(),
            folders: vec![],
            auth_url: default_auth_url(),
        };
        // env var is only consulted as a fallback and is not set in tests
        if std::env::var(KEY_ID_ENV).is_err() {
            assert!(remote.credentials().is_none());
        }
    }
}
