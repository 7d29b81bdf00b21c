//! The secrets driver contract and the typed values that flow through it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::config::KvVersion;
use crate::error::Result;
use crate::keys::KeyShare;

/// Secret material stored at one path. No fixed schema.
pub type SecretPayload = serde_json::Map<String, serde_json::Value>;

/// Boxed future returned by every [`SecretsDriver`] operation.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Per-call overrides for secret path operations (read, write, delete, list).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvOptions {
    /// Overrides the driver's default mount. Surrounding slashes are ignored.
    pub mount: Option<String>,
    /// Overrides the driver's default KV engine version.
    pub version: Option<KvVersion>,
}

impl KvOptions {
    pub fn mount(mut self, mount: impl Into<String>) -> Self {
        self.mount = Some(mount.into());
        self
    }

    pub fn version(mut self, version: KvVersion) -> Self {
        self.version = Some(version);
        self
    }
}

/// Flags forwarded with an unseal key share. Absent flags are not sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnsealOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrate: Option<bool>,
}

/// Mount flags for enabling a secrets engine. Only set flags are sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub local: bool,
    pub seal_wrap: bool,
}

/// Engine settings forwarded in the mount request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineSettings {
    pub description: Option<String>,
    pub config: serde_json::Map<String, serde_json::Value>,
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// Seal state reported by the backend.
///
/// Every other field, including `cluster_name` and `version`, is kept
/// verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealStatus {
    /// Treated as sealed when the backend omits the field.
    #[serde(default = "default_sealed")]
    pub sealed: bool,

    #[serde(default)]
    pub progress: u32,

    /// Number of key shares required to unseal.
    #[serde(default)]
    pub t: u32,

    #[serde(default)]
    pub initialized: bool,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_sealed() -> bool {
    true
}

impl SealStatus {
    pub fn is_unsealed(&self) -> bool {
        !self.sealed
    }

    pub fn cluster_name(&self) -> Option<&str> {
        self.extra.get("cluster_name").and_then(|v| v.as_str())
    }

    pub fn version(&self) -> Option<&str> {
        self.extra.get("version").and_then(|v| v.as_str())
    }
}

/// Operations every secrets backend driver provides.
///
/// Drivers hold only immutable configuration and a transport handle, so a
/// single instance is shared across threads by the registry.
pub trait SecretsDriver: Send + Sync + fmt::Debug {
    /// Read the secret payload stored at `path`.
    fn read<'a>(&'a self, path: &'a str, options: &'a KvOptions) -> DriverFuture<'a, SecretPayload>;

    /// Write `payload` to `path`, returning the backend's response data
    /// (the version metadata for KV v2).
    fn write<'a>(
        &'a self,
        path: &'a str,
        payload: &'a SecretPayload,
        options: &'a KvOptions,
    ) -> DriverFuture<'a, SecretPayload>;

    fn delete<'a>(&'a self, path: &'a str, options: &'a KvOptions) -> DriverFuture<'a, ()>;

    /// List key names beneath `path`. Names ending in `/` are sub-paths.
    /// Ordering is whatever the backend returns.
    fn list<'a>(&'a self, path: &'a str, options: &'a KvOptions) -> DriverFuture<'a, Vec<String>>;

    fn seal_status(&self) -> DriverFuture<'_, SealStatus>;

    /// Submit a single unseal key share.
    fn submit_unseal_key<'a>(
        &'a self,
        key: &'a KeyShare,
        options: &'a UnsealOptions,
    ) -> DriverFuture<'a, SealStatus>;

    /// Mount a secrets engine of `engine_type` at the literal mount `path`.
    fn enable_secrets_engine<'a>(
        &'a self,
        engine_type: &'a str,
        path: &'a str,
        settings: &'a EngineSettings,
        options: &'a EngineOptions,
    ) -> DriverFuture<'a, serde_json::Value>;
}
