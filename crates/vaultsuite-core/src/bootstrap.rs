//! Secret-ref bootstrap for host configuration.
//!
//! Resolves `ENV_NAME -> "path#key"` mappings through the facade so a host
//! can hydrate its environment at startup. Exporting the values is left to
//! the host.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::driver::KvOptions;
use crate::error::{Result, SecretsError};
use crate::manager::SecretsManager;

/// `[bootstrap]` configuration table.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Driver to resolve refs with; the default driver when absent.
    #[serde(default)]
    pub driver: Option<String>,

    /// Fail when a ref resolves to no value instead of skipping it.
    #[serde(default = "default_fail_on_missing")]
    pub fail_on_missing: bool,

    /// `ENV_NAME -> "path#key"`.
    #[serde(default)]
    pub paths: BTreeMap<String, String>,
}

fn default_fail_on_missing() -> bool {
    true
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            driver: None,
            fail_on_missing: default_fail_on_missing(),
            paths: BTreeMap::new(),
        }
    }
}

/// Parsed `path#key` ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef<'a> {
    pub path: &'a str,
    pub key: &'a str,
}

impl<'a> SecretRef<'a> {
    pub fn parse(ref_str: &'a str) -> Result<Self> {
        let (path, key) = ref_str.split_once('#').ok_or_else(|| {
            SecretsError::Input(format!(
                "invalid secret ref '{ref_str}': expected format <path>#<key>"
            ))
        })?;

        let path = path.trim_matches('/');
        if path.is_empty() || key.is_empty() {
            return Err(SecretsError::Input(format!(
                "invalid secret ref '{ref_str}': path and key must be non-empty"
            )));
        }

        if ref_str.chars().any(|c| c.is_ascii_control()) {
            return Err(SecretsError::Input(format!(
                "invalid secret ref '{}': must not contain control characters",
                ref_str.escape_debug()
            )));
        }

        Ok(Self { path, key })
    }
}

/// Render a resolved value for an environment variable.
fn env_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Resolve every configured ref. Returns an empty map when disabled.
///
/// Refs are parsed up front so a malformed entry fails before any backend
/// call. Backend errors propagate; a missing value fails with
/// [`SecretsError::MissingSecret`] unless `fail_on_missing` is off.
pub async fn hydrate(
    manager: &SecretsManager,
    config: &BootstrapConfig,
) -> Result<HashMap<String, String>> {
    let mut resolved = HashMap::new();
    if !config.enabled {
        return Ok(resolved);
    }

    let refs = config
        .paths
        .iter()
        .map(|(name, ref_str)| SecretRef::parse(ref_str).map(|r| (name, ref_str, r)))
        .collect::<Result<Vec<_>>>()?;

    let options = KvOptions::default();
    for (name, ref_str, secret_ref) in refs {
        let value = manager
            .fetch(
                secret_ref.path,
                Some(secret_ref.key),
                &options,
                config.driver.as_deref(),
            )
            .await?;

        match value.filter(|v| !v.is_null()) {
            Some(value) => {
                resolved.insert(name.clone(), env_value(&value));
            }
            None if config.fail_on_missing => {
                return Err(SecretsError::MissingSecret(ref_str.clone()));
            }
            None => warn!(env = %name, "bootstrap secret ref resolved to no value; skipping"),
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::config::{DriverConfig, SecretsConfig};

    #[test]
    fn parse_ref_valid() {
        assert_eq!(
            SecretRef::parse("apps/laravel/database#password").unwrap(),
            SecretRef {
                path: "apps/laravel/database",
                key: "password",
            }
        );
    }

    #[test]
    fn parse_ref_trims_path_slashes() {
        assert_eq!(SecretRef::parse("/apps/api/#key").unwrap().path, "apps/api");
    }

    #[test]
    fn parse_ref_requires_delimiter() {
        let err = SecretRef::parse("apps/laravel").unwrap_err();
        assert!(err.to_string().contains("expected format"));
    }

    #[test]
    fn parse_ref_empty_parts() {
        assert!(SecretRef::parse("#key").is_err());
        assert!(SecretRef::parse("apps/api#").is_err());
        assert!(SecretRef::parse("/#key").is_err());
    }

    #[test]
    fn parse_ref_rejects_control_characters() {
        let err = SecretRef::parse("apps/api#pass\nword").unwrap_err();
        assert!(err.to_string().contains("control characters"));
    }

    #[test]
    fn env_value_formats() {
        assert_eq!(env_value(&json!("s")), "s");
        assert_eq!(env_value(&json!(5432)), "5432");
        assert_eq!(env_value(&json!(true)), "true");
        assert_eq!(env_value(&json!({ "a": 1 })), r#"{"a":1}"#);
    }

    fn manager_for(server: &MockServer) -> SecretsManager {
        let mut config = SecretsConfig::default();
        config
            .drivers
            .insert("vault".into(), DriverConfig::new(server.uri()));
        SecretsManager::new(config)
    }

    fn bootstrap(paths: &[(&str, &str)], fail_on_missing: bool) -> BootstrapConfig {
        BootstrapConfig {
            enabled: true,
            driver: None,
            fail_on_missing,
            paths: paths
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    async fn mount_app_secret(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/apps/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "data": { "app_key": "base64:abc", "port": 8080 } }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn hydrate_disabled_makes_no_requests() {
        let server = MockServer::start().await;
        let manager = manager_for(&server);
        let mut config = bootstrap(&[("APP_KEY", "apps/api#app_key")], true);
        config.enabled = false;
        assert!(hydrate(&manager, &config).await.unwrap().is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hydrate_resolves_refs() {
        let server = MockServer::start().await;
        mount_app_secret(&server).await;
        let manager = manager_for(&server);

        let values = hydrate(
            &manager,
            &bootstrap(
                &[("APP_KEY", "apps/api#app_key"), ("APP_PORT", "apps/api#port")],
                true,
            ),
        )
        .await
        .unwrap();
        assert_eq!(values["APP_KEY"], "base64:abc");
        assert_eq!(values["APP_PORT"], "8080");
    }

    #[tokio::test]
    async fn hydrate_missing_value_fails_when_required() {
        let server = MockServer::start().await;
        mount_app_secret(&server).await;
        let manager = manager_for(&server);

        let err = hydrate(&manager, &bootstrap(&[("DB", "apps/api#db_password")], true))
            .await
            .unwrap_err();
        assert!(matches!(err, SecretsError::MissingSecret(ref r) if r == "apps/api#db_password"));
    }

    #[tokio::test]
    async fn hydrate_missing_value_skipped_when_optional() {
        let server = MockServer::start().await;
        mount_app_secret(&server).await;
        let manager = manager_for(&server);

        let values = hydrate(
            &manager,
            &bootstrap(
                &[("DB", "apps/api#db_password"), ("APP_KEY", "apps/api#app_key")],
                false,
            ),
        )
        .await
        .unwrap();
        assert_eq!(values.len(), 1);
        assert!(values.contains_key("APP_KEY"));
    }

    #[tokio::test]
    async fn hydrate_rejects_malformed_ref_before_requests() {
        let server = MockServer::start().await;
        let manager = manager_for(&server);

        let err = hydrate(&manager, &bootstrap(&[("BAD", "apps/api")], true))
            .await
            .unwrap_err();
        assert!(matches!(err, SecretsError::Input(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn hydrate_propagates_backend_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(json!({ "errors": ["permission denied"] })),
            )
            .mount(&server)
            .await;
        let manager = manager_for(&server);

        let err = hydrate(&manager, &bootstrap(&[("APP_KEY", "apps/api#app_key")], false))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
    }
}
