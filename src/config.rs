use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use crate::access::ApiKeys;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bind address (default: "0.0.0.0")
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port number (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of the feed root, used for download links and next-page
    /// links (default: "http://localhost:8080/api/v2/")
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Maximum entries per feed page (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Digest recorded for every archive (default: sha512)
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
    /// API keys; none configured means an open server
    #[serde(default)]
    pub api_keys: ApiKeys,
    /// Registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_base_url() -> String {
    "http://localhost:8080/api/v2/".to_string()
}

fn default_page_size() -> usize {
    100
}

/// Registry backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RegistryConfig {
    Filesystem { path: PathBuf },
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig::Filesystem {
            path: PathBuf::from("./packages"),
        }
    }
}

/// Content hash applied to uploaded archives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    #[default]
    Sha512,
}

impl HashAlgorithm {
    /// Name reported alongside the hash.
    pub fn label(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA256",
            HashAlgorithm::Sha512 => "SHA512",
        }
    }

    /// Hex digest of `data`.
    pub fn digest(self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
            HashAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            base_url: default_base_url(),
            page_size: default_page_size(),
            hash_algorithm: HashAlgorithm::default(),
            api_keys: ApiKeys::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, environment, and CLI arguments
    pub fn load(
        config_path: Option<&PathBuf>,
        cli_bind: Option<&str>,
        cli_port: Option<u16>,
        cli_registry_path: Option<&PathBuf>,
        cli_base_url: Option<&str>,
    ) -> anyhow::Result<Self> {
        // Start with default config
        let mut config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            // Try default config file
            if let Ok(content) = std::fs::read_to_string("depot.toml") {
                toml::from_str(&content)?
            } else {
                Config::default()
            }
        };

        // Override with environment variables
        if let Ok(bind) = std::env::var("DEPOT_BIND") {
            config.bind = bind;
        }
        // PORT is what most container platforms inject
        for var in ["PORT", "DEPOT_PORT"] {
            if let Ok(port) = std::env::var(var) {
                if let Ok(p) = port.parse() {
                    config.port = p;
                }
            }
        }
        if let Ok(path) = std::env::var("DEPOT_REGISTRY_PATH") {
            config.registry = RegistryConfig::Filesystem {
                path: PathBuf::from(path),
            };
        }
        if let Ok(url) = std::env::var("DEPOT_BASE_URL") {
            config.base_url = url;
        }

        // Override with CLI arguments
        if let Some(bind) = cli_bind {
            config.bind = bind.to_string();
        }
        if let Some(port) = cli_port {
            config.port = port;
        }
        if let Some(path) = cli_registry_path {
            config.registry = RegistryConfig::Filesystem { path: path.clone() };
        }
        if let Some(url) = cli_base_url {
            config.base_url = url.to_string();
        }

        if config.page_size == 0 {
            anyhow::bail!("page_size must be at least 1");
        }

        Ok(config)
    }
}
