//! Driver-selecting facade and the unseal sequencing algorithm.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::config::SecretsConfig;
use crate::driver::{
    EngineOptions, EngineSettings, KvOptions, SealStatus, SecretPayload, SecretsDriver,
    UnsealOptions,
};
use crate::error::Result;
use crate::keys::KeyShare;
use crate::registry::DriverRegistry;

/// Entry point for hosts and the CLI.
///
/// Every method takes an optional driver name; `None` selects the
/// configured default.
#[derive(Debug)]
pub struct SecretsManager {
    registry: DriverRegistry,
}

impl SecretsManager {
    pub fn new(config: SecretsConfig) -> Self {
        Self::with_registry(DriverRegistry::new(config))
    }

    pub fn with_registry(registry: DriverRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub fn driver(&self, name: Option<&str>) -> Result<Arc<dyn SecretsDriver>> {
        self.registry.driver(name)
    }

    /// Read the payload at `path`, optionally projecting a single key.
    ///
    /// Without a key the whole payload is returned as an object. With a key,
    /// the value is looked up as in [`project_key`]; `None` when not found.
    pub async fn fetch(
        &self,
        path: &str,
        key: Option<&str>,
        options: &KvOptions,
        driver: Option<&str>,
    ) -> Result<Option<Value>> {
        let payload = self.driver(driver)?.read(path, options).await?;
        Ok(match key {
            None => Some(Value::Object(payload)),
            Some(key) => project_key(&payload, key).cloned(),
        })
    }

    pub async fn put(
        &self,
        path: &str,
        payload: &SecretPayload,
        options: &KvOptions,
        driver: Option<&str>,
    ) -> Result<SecretPayload> {
        self.driver(driver)?.write(path, payload, options).await
    }

    pub async fn delete(&self, path: &str, options: &KvOptions, driver: Option<&str>) -> Result<()> {
        self.driver(driver)?.delete(path, options).await
    }

    pub async fn list(
        &self,
        path: &str,
        options: &KvOptions,
        driver: Option<&str>,
    ) -> Result<Vec<String>> {
        self.driver(driver)?.list(path, options).await
    }

    pub async fn seal_status(&self, driver: Option<&str>) -> Result<SealStatus> {
        self.driver(driver)?.seal_status().await
    }

    /// Submit key shares in order until the backend reports unsealed.
    ///
    /// Returns immediately, without submitting anything, when the backend is
    /// already unsealed. `reset` is forwarded only with the first share.
    /// Stops at the first response with `sealed == false`. A failed
    /// submission aborts the sequence; progress already recorded by the
    /// backend is left as is.
    pub async fn unseal(
        &self,
        keys: &[KeyShare],
        options: &UnsealOptions,
        driver: Option<&str>,
    ) -> Result<SealStatus> {
        let driver = self.driver(driver)?;
        let mut status = driver.seal_status().await?;

        if status.is_unsealed() {
            debug!("backend already unsealed; no key shares submitted");
            return Ok(status);
        }

        let reset_requested = options.reset.unwrap_or(false);
        for (index, key) in keys.iter().enumerate() {
            let per_key = UnsealOptions {
                reset: Some(reset_requested && index == 0),
                migrate: options.migrate,
            };

            status = driver.submit_unseal_key(key, &per_key).await?;
            debug!(
                submitted = index + 1,
                progress = status.progress,
                threshold = status.t,
                "unseal key share submitted"
            );

            if status.is_unsealed() {
                info!(submitted = index + 1, "backend unsealed");
                break;
            }
        }

        Ok(status)
    }

    pub async fn enable_secrets_engine(
        &self,
        engine_type: &str,
        path: &str,
        settings: &EngineSettings,
        options: &EngineOptions,
        driver: Option<&str>,
    ) -> Result<Value> {
        self.driver(driver)?
            .enable_secrets_engine(engine_type, path, settings, options)
            .await
    }
}

/// Look up `key` in `payload`.
///
/// An exact top-level match wins; otherwise the key is split on `.` and
/// walked through nested objects.
pub fn project_key<'a>(payload: &'a SecretPayload, key: &str) -> Option<&'a Value> {
    if let Some(value) = payload.get(key) {
        return Some(value);
    }

    let mut segments = key.split('.');
    let mut current = payload.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
