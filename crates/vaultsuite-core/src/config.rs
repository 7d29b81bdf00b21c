//! Driver configuration.
//!
//! Configuration is read from a TOML file when one is available and from
//! `VAULT_*` / `OPENBAO_*` environment variables otherwise:
//!
//! ```toml
//! default = "vault"
//!
//! [drivers.vault]
//! address = "https://vault.example.com:8200"
//! namespace = "team-a"
//! timeout = 5
//!
//! [drivers.vault.engine]
//! mount = "secret"
//! version = 2
//!
//! [bootstrap]
//! enabled = true
//! paths = { DB_PASSWORD = "apps/api/database#password" }
//! ```
//!
//! Tokens may be left out of the file; `VAULT_TOKEN` / `OPENBAO_TOKEN` fill
//! them in after loading.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::bootstrap::BootstrapConfig;
use crate::error::SecretsError;
use crate::{OPENBAO_DRIVER, VAULT_DRIVER};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "VAULTSUITE_CONFIG";

/// Environment variable selecting the default driver.
pub const DEFAULT_DRIVER_ENV: &str = "VAULTSUITE_DRIVER";

/// Default backend address.
pub const DEFAULT_ADDRESS: &str = "http://127.0.0.1:8200";

/// Default KV mount.
pub const DEFAULT_MOUNT: &str = "secret";

/// Default request timeout in seconds when a driver block omits one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {name}: '{value}'")]
    InvalidEnv { name: String, value: String },
}

impl From<ConfigError> for SecretsError {
    fn from(err: ConfigError) -> Self {
        SecretsError::Configuration(err.to_string())
    }
}

/// KV secrets engine version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "u8")]
pub enum KvVersion {
    V1,
    #[default]
    V2,
}

impl TryFrom<u8> for KvVersion {
    type Error = SecretsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(SecretsError::Configuration(format!(
                "unsupported KV engine version {other} (expected 1 or 2)"
            ))),
        }
    }
}

impl std::str::FromStr for KvVersion {
    type Err = SecretsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u8 = s.trim().parse().map_err(|_| {
            SecretsError::Configuration(format!(
                "unsupported KV engine version '{s}' (expected 1 or 2)"
            ))
        })?;
        Self::try_from(n)
    }
}

impl fmt::Display for KvVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V1 => f.write_str("1"),
            Self::V2 => f.write_str("2"),
        }
    }
}

/// Default KV engine a driver routes secret paths to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_mount")]
    pub mount: String,

    #[serde(default)]
    pub version: KvVersion,
}

fn default_mount() -> String {
    DEFAULT_MOUNT.to_owned()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mount: default_mount(),
            version: KvVersion::V2,
        }
    }
}

/// Connection settings for one named driver. Immutable once a driver has
/// been built from it.
#[derive(Clone, Deserialize)]
pub struct DriverConfig {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,

    /// TLS certificate verification. Disabled only when explicitly `false`.
    #[serde(default = "default_verify")]
    pub verify: bool,

    /// Request timeout in seconds. `None` or `0` means no timeout.
    #[serde(default = "default_timeout", alias = "timeout_secs")]
    pub timeout: Option<u64>,

    #[serde(default)]
    pub ca_cert: Option<PathBuf>,

    #[serde(default)]
    pub client_cert: Option<PathBuf>,

    #[serde(default)]
    pub client_key: Option<PathBuf>,

    /// Extra headers merged into every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_owned()
}

fn default_verify() -> bool {
    true
}

fn default_timeout() -> Option<u64> {
    Some(DEFAULT_TIMEOUT_SECS)
}

impl DriverConfig {
    /// A config pointing at `address` with every other setting defaulted.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: None,
            namespace: None,
            verify: true,
            timeout: None,
            ca_cert: None,
            client_cert: None,
            client_key: None,
            headers: BTreeMap::new(),
            engine: EngineConfig::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_engine(mut self, mount: impl Into<String>, version: KvVersion) -> Self {
        self.engine = EngineConfig {
            mount: mount.into(),
            version,
        };
        self
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}

impl fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverConfig")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("namespace", &self.namespace)
            .field("verify", &self.verify)
            .field("timeout", &self.timeout)
            .field("ca_cert", &self.ca_cert)
            .field("client_cert", &self.client_cert)
            .field("client_key", &self.client_key)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("engine", &self.engine)
            .finish()
    }
}

/// Process-wide secrets configuration: one block per named driver.
#[derive(Debug, Clone, Deserialize)]
pub struct SecretsConfig {
    #[serde(default = "default_driver")]
    pub default: String,

    #[serde(default)]
    pub drivers: HashMap<String, DriverConfig>,

    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

fn default_driver() -> String {
    VAULT_DRIVER.to_owned()
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            default: default_driver(),
            drivers: HashMap::new(),
            bootstrap: BootstrapConfig::default(),
        }
    }
}

impl SecretsConfig {
    /// Parse a TOML document.
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml_edit::de::from_str(toml_str).map_err(|e| e.to_string())
    }

    /// Load configuration from `explicit`, `$VAULTSUITE_CONFIG`, or
    /// `~/.vaultsuite/config.toml`, falling back to the environment when no
    /// file is found.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let lookup = |name: &str| std::env::var(name).ok();

        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => match lookup(CONFIG_PATH_ENV) {
                Some(p) if !p.is_empty() => Some(PathBuf::from(p)),
                _ => Some(default_config_path()).filter(|p| p.exists()),
            },
        };

        match path {
            Some(path) => {
                let mut config = Self::from_file(&path)?;
                config.fill_tokens_from(lookup);
                Ok(config)
            }
            None => Self::from_lookup(lookup),
        }
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Build `vault` and `openbao` blocks from environment-style variables.
    ///
    /// Each `OPENBAO_*` variable falls back to its `VAULT_*` counterpart.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let vault = driver_from_lookup(|suffix| get(format!("VAULT_{suffix}").as_str()))?;
        let openbao = driver_from_lookup(|suffix| {
            get(format!("OPENBAO_{suffix}").as_str())
                .or_else(|| get(format!("VAULT_{suffix}").as_str()))
        })?;

        let mut drivers = HashMap::new();
        drivers.insert(VAULT_DRIVER.to_owned(), vault);
        drivers.insert(OPENBAO_DRIVER.to_owned(), openbao);

        Ok(Self {
            default: get(DEFAULT_DRIVER_ENV).unwrap_or_else(default_driver),
            drivers,
            bootstrap: BootstrapConfig::default(),
        })
    }

    /// Fill missing tokens of the built-in driver blocks from the environment.
    fn fill_tokens_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (name, var) in [(VAULT_DRIVER, "VAULT_TOKEN"), (OPENBAO_DRIVER, "OPENBAO_TOKEN")] {
            if let Some(driver) = self.drivers.get_mut(name) {
                if driver.token.is_none() {
                    driver.token = lookup(var).filter(|t| !t.is_empty());
                }
            }
        }
    }

    /// The configuration block for `name`, if any.
    pub fn driver(&self, name: &str) -> Option<&DriverConfig> {
        self.drivers.get(name)
    }
}

fn driver_from_lookup<F>(get: F) -> Result<DriverConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let verify = match get("VERIFY") {
        Some(v) => parse_bool(&v).ok_or_else(|| ConfigError::InvalidEnv {
            name: "VERIFY".into(),
            value: v,
        })?,
        None => true,
    };
    let timeout = match get("TIMEOUT") {
        Some(v) => Some(v.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
            name: "TIMEOUT".into(),
            value: v,
        })?),
        None => Some(DEFAULT_TIMEOUT_SECS),
    };
    let version = match get("ENGINE_VERSION") {
        Some(v) => v.parse::<KvVersion>().map_err(|_| ConfigError::InvalidEnv {
            name: "ENGINE_VERSION".into(),
            value: v,
        })?,
        None => KvVersion::V2,
    };

    Ok(DriverConfig {
        address: get("ADDR").unwrap_or_else(default_address),
        token: get("TOKEN"),
        namespace: get("NAMESPACE"),
        verify,
        timeout,
        ca_cert: get("CACERT").map(PathBuf::from),
        client_cert: get("CLIENT_CERT").map(PathBuf::from),
        client_key: get("CLIENT_KEY").map(PathBuf::from),
        headers: BTreeMap::new(),
        engine: EngineConfig {
            mount: get("ENGINE_MOUNT").unwrap_or_else(default_mount),
            version,
        },
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// `~/.vaultsuite/config.toml`.
pub fn default_config_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vaultsuite")
        .join("config.toml")
}
