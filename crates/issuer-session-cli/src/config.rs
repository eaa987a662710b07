/*
[INPUT]:  YAML configuration file
[OUTPUT]: Parsed CLI configuration and adapter configs derived from it
[POS]:    Configuration layer - backend, storage and linking setup
[UPDATE]: When adding new configuration options
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use issuer_session_adapter::{ClientConfig, LinkingConfig, RefreshConfig};
use serde::{Deserialize, Serialize};

/// Directory name under the platform config/data dirs
pub const APP_DIR: &str = "issuer-session";

/// Top-level configuration for the session CLI
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CliConfig {
    /// Backend base URL, including the API path prefix
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Origin the link popup reports back to
    #[serde(default = "default_page_origin")]
    pub page_origin: String,
    /// Token file; defaults to `<data_dir>/issuer-session/session.json`
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    /// Ed25519 key file; created on first login when missing
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    /// Wallet address to log in as; defaults to the hex public key
    #[serde(default)]
    pub wallet_address: Option<String>,
    /// Periodic token refresh interval in seconds
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub linking: LinkingSection,
}

/// Provider linking options
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LinkingSection {
    /// Extra origins allowed to post link results
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default)]
    pub allow_uncorrelated_messages: bool,
    /// Give up on a link attempt after this many seconds
    #[serde(default = "default_link_timeout_secs")]
    pub timeout_secs: u64,
    /// Backend poll interval while a link attempt is open
    #[serde(default = "default_backend_poll_secs")]
    pub backend_poll_secs: u64,
}

impl Default for LinkingSection {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            dev_mode: false,
            allow_uncorrelated_messages: false,
            timeout_secs: default_link_timeout_secs(),
            backend_poll_secs: default_backend_poll_secs(),
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            page_origin: default_page_origin(),
            storage_path: None,
            key_file: None,
            wallet_address: None,
            refresh_interval_secs: default_refresh_interval_secs(),
            linking: LinkingSection::default(),
        }
    }
}

fn default_api_base_url() -> String {
    ClientConfig::default().base_url
}

fn default_page_origin() -> String {
    LinkingConfig::default().page_origin
}

fn default_refresh_interval_secs() -> u64 {
    RefreshConfig::default().interval.as_secs()
}

fn default_link_timeout_secs() -> u64 {
    LinkingConfig::default().timeout.as_secs()
}

fn default_backend_poll_secs() -> u64 {
    LinkingConfig::default().backend_poll_interval.as_secs()
}

impl CliConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or from the default location if it exists, else defaults
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        url::Url::parse(&self.api_base_url)
            .with_context(|| format!("invalid api_base_url: {}", self.api_base_url))?;
        url::Url::parse(&self.page_origin)
            .with_context(|| format!("invalid page_origin: {}", self.page_origin))?;
        if self.refresh_interval_secs == 0 {
            return Err(anyhow!("refresh_interval_secs must be greater than zero"));
        }
        if self.linking.timeout_secs == 0 {
            return Err(anyhow!("linking.timeout_secs must be greater than zero"));
        }
        Ok(())
    }

    pub fn storage_path(&self) -> anyhow::Result<PathBuf> {
        match &self.storage_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("session.json")),
        }
    }

    pub fn key_file(&self) -> anyhow::Result<PathBuf> {
        match &self.key_file {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("wallet.key")),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_base_url.clone(),
            ..ClientConfig::default()
        }
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            interval: Duration::from_secs(self.refresh_interval_secs),
        }
    }

    pub fn linking_config(&self) -> LinkingConfig {
        LinkingConfig {
            page_origin: self.page_origin.clone(),
            allowed_origins: self.linking.allowed_origins.clone(),
            dev_mode: self.linking.dev_mode,
            allow_uncorrelated_messages: self.linking.allow_uncorrelated_messages,
            timeout: Duration::from_secs(self.linking.timeout_secs),
            backend_poll_interval: Duration::from_secs(self.linking.backend_poll_secs.max(1)),
            ..LinkingConfig::default()
        }
    }
}

/// `<config_dir>/issuer-session/config.yaml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.yaml"))
}

fn data_dir() -> anyhow::Result<PathBuf> {
    Ok(dirs::data_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?
        .join(APP_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let config: CliConfig = serde_yaml::from_str("api_base_url: https://api.test/api/\n").unwrap();
        assert_eq!(config.api_base_url, "https://api.test/api/");
        assert_eq!(config.page_origin, "http://localhost:3000");
        assert_eq!(config.refresh_interval_secs, 15 * 60);
        assert!(!config.linking.allow_uncorrelated_messages);
        assert_eq!(config.linking.timeout_secs, 300);
    }

    #[test]
    fn test_linking_config_mapping() {
        let config = CliConfig {
            linking: LinkingSection {
                allowed_origins: vec!["https://auth.test".to_string()],
                dev_mode: true,
                allow_uncorrelated_messages: true,
                timeout_secs: 60,
                backend_poll_secs: 5,
            },
            ..CliConfig::default()
        };
        let linking = config.linking_config();
        assert_eq!(linking.allowed_origins, vec!["https://auth.test".to_string()]);
        assert!(linking.dev_mode);
        assert!(linking.allow_uncorrelated_messages);
        assert_eq!(linking.timeout, Duration::from_secs(60));
        assert_eq!(linking.backend_poll_interval, Duration::from_secs(5));
        assert_eq!(linking.popup_width, 600);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_url = CliConfig {
            api_base_url: "not a url".to_string(),
            ..CliConfig::default()
        };
        assert!(bad_url.validate().is_err());

        let zero_interval = CliConfig {
            refresh_interval_secs: 0,
            ..CliConfig::default()
        };
        assert!(zero_interval.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip_keeps_paths() {
        let config = CliConfig {
            storage_path: Some(PathBuf::from("/tmp/session.json")),
            key_file: Some(PathBuf::from("/tmp/wallet.key")),
            ..CliConfig::default()
        };
        let parsed: CliConfig = serde_yaml::from_str(&config.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.storage_path().unwrap(), PathBuf::from("/tmp/session.json"));
    }
}
