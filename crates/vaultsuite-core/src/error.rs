//! Error taxonomy shared by every driver and the facade.

/// Errors surfaced by drivers, the registry and the facade.
///
/// Backend and network failures propagate unchanged; nothing in this crate
/// retries or swallows them.
#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    /// Unknown driver, missing driver block, or an unusable driver setting.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The backend answered with a non-success HTTP status.
    #[error("secrets backend request failed with HTTP {status}: {message}")]
    Request { status: u16, message: String },

    #[error("network error communicating with secrets backend")]
    Network(#[source] reqwest::Error),

    /// A success response whose body does not have the expected shape.
    #[error("unexpected secrets backend response: {0}")]
    InvalidResponse(String),

    /// A local caller error detected before contacting the backend.
    #[error("{0}")]
    Input(String),

    #[error("secret not found for ref '{0}'")]
    MissingSecret(String),
}

impl SecretsError {
    /// Build a request failure from a status code and the raw response body.
    ///
    /// Uses the backend's `errors` array joined with `, ` when present and
    /// non-empty, otherwise the raw body.
    pub fn request_failed(status: u16, body: &str) -> Self {
        let errors = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("errors").and_then(|e| e.as_array()).cloned())
            .unwrap_or_default();

        let joined = errors
            .iter()
            .filter_map(|e| match e {
                serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
                serde_json::Value::String(_) | serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect::<Vec<_>>()
            .join(", ");

        let message = if joined.is_empty() {
            body.to_owned()
        } else {
            joined
        };

        Self::Request { status, message }
    }

    /// HTTP status code of a backend request failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error is a setup problem rather than a runtime condition.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, SecretsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_failed_joins_backend_errors() {
        let err = SecretsError::request_failed(
            403,
            r#"{"errors":["permission denied","token expired"]}"#,
        );
        assert_eq!(err.status(), Some(403));
        assert_eq!(
            err.to_string(),
            "secrets backend request failed with HTTP 403: permission denied, token expired"
        );
    }

    #[test]
    fn request_failed_falls_back_to_raw_body() {
        let err = SecretsError::request_failed(502, "upstream unavailable");
        assert!(err.to_string().ends_with("HTTP 502: upstream unavailable"));
    }

    #[test]
    fn request_failed_ignores_empty_errors_array() {
        let err = SecretsError::request_failed(500, r#"{"errors":[""]}"#);
        match err {
            SecretsError::Request { message, .. } => assert_eq!(message, r#"{"errors":[""]}"#),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn status_is_none_for_local_errors() {
        assert_eq!(SecretsError::Input("no keys".into()).status(), None);
        assert!(SecretsError::Configuration("x".into()).is_configuration());
    }
}
