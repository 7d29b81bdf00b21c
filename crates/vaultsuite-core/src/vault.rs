//! Vault / OpenBao HTTP driver.
//!
//! Both backends share one wire contract, so the OpenBao registry entry
//! builds this same driver.

use std::fmt;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{DriverConfig, EngineConfig, KvVersion};
use crate::driver::{
    DriverFuture, EngineOptions, EngineSettings, KvOptions, SealStatus, SecretPayload,
    SecretsDriver, UnsealOptions,
};
use crate::error::{Result, SecretsError};
use crate::keys::KeyShare;
use crate::normalize;
use crate::route::{self, Operation, Target};

/// Bearer credential header.
pub const TOKEN_HEADER: &str = "x-vault-token";

/// Tenancy header.
pub const NAMESPACE_HEADER: &str = "x-vault-namespace";

/// Header sent with `LIST` requests.
pub const REQUEST_HEADER: &str = "x-vault-request";

#[derive(Serialize)]
struct UnsealRequest<'a> {
    key: &'a str,
    #[serde(flatten)]
    options: &'a UnsealOptions,
}

/// Driver for Vault-compatible HTTP APIs.
#[derive(Clone)]
pub struct VaultDriver {
    http: reqwest::Client,
    base_url: String,
    engine: EngineConfig,
}

impl fmt::Debug for VaultDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultDriver")
            .field("base_url", &self.base_url)
            .field("engine", &self.engine)
            .finish()
    }
}

impl VaultDriver {
    /// Build the user-agent string from crate version.
    fn user_agent() -> String {
        format!("vaultsuite/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Build a driver and its HTTP transport from `config`.
    pub fn new(config: &DriverConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(Self::user_agent())
            .default_headers(default_headers(config)?);

        if !config.verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(secs) = config.timeout.filter(|s| *s > 0) {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        if let Some(ca_path) = &config.ca_cert {
            let pem = std::fs::read(ca_path).map_err(|e| {
                SecretsError::Configuration(format!(
                    "failed to read CA certificate {}: {e}",
                    ca_path.display()
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                SecretsError::Configuration(format!(
                    "invalid CA certificate {}: {e}",
                    ca_path.display()
                ))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        match (&config.client_cert, &config.client_key) {
            (Some(cert_path), key_path) => {
                let mut pem = read_pem(cert_path, "client certificate")?;
                if let Some(key_path) = key_path {
                    pem.push(b'\n');
                    pem.extend(read_pem(key_path, "client key")?);
                }
                let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                    SecretsError::Configuration(format!("invalid client identity: {e}"))
                })?;
                builder = builder.identity(identity);
            }
            (None, Some(_)) => {
                return Err(SecretsError::Configuration(
                    "client_key is set without client_cert".into(),
                ));
            }
            (None, None) => {}
        }

        let http = builder.build().map_err(|e| {
            SecretsError::Configuration(format!("failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            http,
            base_url: config.address.trim_end_matches('/').to_owned(),
            engine: config.engine.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn route(&self, path: &str, options: &KvOptions, operation: Operation) -> String {
        route::resolve(path, options, &self.engine, operation)
    }

    fn version(&self, options: &KvOptions) -> KvVersion {
        Target::new(options, &self.engine).version
    }

    /// Perform one request and return the parsed body of a 2xx response.
    async fn send(
        &self,
        method: Method,
        route: &str,
        headers: HeaderMap,
        body: Option<&Value>,
    ) -> Result<Value> {
        let text = self.send_raw(method, route, headers, body).await?;
        normalize::parse_body(&text)
    }

    /// Perform one request and return the raw body of a 2xx response.
    async fn send_raw(
        &self,
        method: Method,
        route: &str,
        headers: HeaderMap,
        body: Option<&Value>,
    ) -> Result<String> {
        debug!(%method, route, "secrets backend request");

        let url = format!("{}{route}", self.base_url);
        let mut req = self
            .http
            .request(method, &url)
            .header(ACCEPT, "application/json")
            .headers(headers);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(SecretsError::Network)?;
        let status = resp.status();
        let text = resp.text().await.map_err(SecretsError::Network)?;

        if !status.is_success() {
            warn!(status = status.as_u16(), route, "secrets backend request failed");
            return Err(SecretsError::request_failed(status.as_u16(), &text));
        }

        Ok(text)
    }
}

fn read_pem(path: &std::path::Path, what: &str) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        SecretsError::Configuration(format!("failed to read {what} {}: {e}", path.display()))
    })
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| SecretsError::Configuration(format!("invalid value for header {name}")))
}

/// Namespace, custom headers, then the token; later entries win.
fn default_headers(config: &DriverConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    if let Some(namespace) = &config.namespace {
        headers.insert(
            HeaderName::from_static(NAMESPACE_HEADER),
            header_value(NAMESPACE_HEADER, namespace)?,
        );
    }

    for (name, value) in &config.headers {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| SecretsError::Configuration(format!("invalid header name {name}")))?;
        headers.insert(header, header_value(name, value)?);
    }

    if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
        let mut value = header_value(TOKEN_HEADER, token)?;
        value.set_sensitive(true);
        headers.insert(HeaderName::from_static(TOKEN_HEADER), value);
    }

    Ok(headers)
}

fn engine_payload(engine_type: &str, settings: &EngineSettings, options: &EngineOptions) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("type".into(), Value::String(engine_type.to_owned()));
    if !settings.config.is_empty() {
        body.insert("config".into(), Value::Object(settings.config.clone()));
    }
    if !settings.options.is_empty() {
        body.insert("options".into(), Value::Object(settings.options.clone()));
    }
    if let Some(description) = settings.description.as_deref().filter(|d| !d.is_empty()) {
        body.insert("description".into(), Value::String(description.to_owned()));
    }
    if options.local {
        body.insert("local".into(), Value::Bool(true));
    }
    if options.seal_wrap {
        body.insert("seal_wrap".into(), Value::Bool(true));
    }
    Value::Object(body)
}

impl SecretsDriver for VaultDriver {
    fn read<'a>(&'a self, path: &'a str, options: &'a KvOptions) -> DriverFuture<'a, SecretPayload> {
        Box::pin(async move {
            let route = self.route(path, options, Operation::Read);
            let body = self.send(Method::GET, &route, HeaderMap::new(), None).await?;
            Ok(normalize::read_payload(&body, self.version(options)))
        })
    }

    fn write<'a>(
        &'a self,
        path: &'a str,
        payload: &'a SecretPayload,
        options: &'a KvOptions,
    ) -> DriverFuture<'a, SecretPayload> {
        Box::pin(async move {
            let route = self.route(path, options, Operation::Write);
            let body = match self.version(options) {
                KvVersion::V2 => serde_json::json!({ "data": payload }),
                KvVersion::V1 => Value::Object(payload.clone()),
            };
            let resp = self
                .send(Method::POST, &route, HeaderMap::new(), Some(&body))
                .await?;
            Ok(normalize::write_payload(&resp))
        })
    }

    fn delete<'a>(&'a self, path: &'a str, options: &'a KvOptions) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            let route = self.route(path, options, Operation::Delete);
            self.send_raw(Method::DELETE, &route, HeaderMap::new(), None)
                .await?;
            Ok(())
        })
    }

    fn list<'a>(&'a self, path: &'a str, options: &'a KvOptions) -> DriverFuture<'a, Vec<String>> {
        Box::pin(async move {
            let route = self.route(path, options, Operation::List);
            let method = Method::from_bytes(b"LIST")
                .map_err(|e| SecretsError::Configuration(format!("invalid LIST method: {e}")))?;
            let mut headers = HeaderMap::new();
            headers.insert(
                HeaderName::from_static(REQUEST_HEADER),
                HeaderValue::from_static("true"),
            );
            let body = self.send(method, &route, headers, None).await?;
            Ok(normalize::list_keys(&body))
        })
    }

    fn seal_status(&self) -> DriverFuture<'_, SealStatus> {
        Box::pin(async move {
            let body = self
                .send(Method::GET, route::SEAL_STATUS_ROUTE, HeaderMap::new(), None)
                .await?;
            normalize::seal_status(body)
        })
    }

    fn submit_unseal_key<'a>(
        &'a self,
        key: &'a KeyShare,
        options: &'a UnsealOptions,
    ) -> DriverFuture<'a, SealStatus> {
        Box::pin(async move {
            let body = serde_json::to_value(UnsealRequest {
                key: key.expose(),
                options,
            })
            .map_err(|e| SecretsError::InvalidResponse(format!("unseal request: {e}")))?;
            let resp = self
                .send(Method::POST, route::UNSEAL_ROUTE, HeaderMap::new(), Some(&body))
                .await?;
            normalize::seal_status(resp)
        })
    }

    fn enable_secrets_engine<'a>(
        &'a self,
        engine_type: &'a str,
        path: &'a str,
        settings: &'a EngineSettings,
        options: &'a EngineOptions,
    ) -> DriverFuture<'a, Value> {
        Box::pin(async move {
            let route = self.route(path, &KvOptions::default(), Operation::EnableEngine);
            let body = engine_payload(engine_type, settings, options);
            let resp = self
                .send(Method::POST, &route, HeaderMap::new(), Some(&body))
                .await?;
            Ok(normalize::passthrough(resp))
        })
    }
}
