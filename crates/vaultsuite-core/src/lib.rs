//! Client abstraction over Vault/OpenBao-compatible secrets backends.
//!
//! The [`SecretsManager`] facade resolves a named driver through the
//! [`DriverRegistry`] and forwards secret reads, writes, listings, seal
//! inspection, unseal sequencing and engine mounts to it.

pub mod bootstrap;
pub mod config;
pub mod driver;
pub mod error;
pub mod keys;
pub mod manager;
pub mod normalize;
pub mod registry;
pub mod route;
pub mod vault;

pub use config::{DriverConfig, EngineConfig, KvVersion, SecretsConfig};
pub use driver::{
    DriverFuture, EngineOptions, EngineSettings, KvOptions, SealStatus, SecretPayload,
    SecretsDriver, UnsealOptions,
};
pub use error::{Result, SecretsError};
pub use keys::KeyShare;
pub use manager::SecretsManager;
pub use registry::DriverRegistry;

/// Name of the built-in HashiCorp Vault driver.
pub const VAULT_DRIVER: &str = "vault";

/// Name of the built-in OpenBao driver (same wire contract as Vault).
pub const OPENBAO_DRIVER: &str = "openbao";
