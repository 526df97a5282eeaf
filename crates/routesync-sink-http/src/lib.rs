// # HTTP Config Sink
//
// Pushes rendered documents to a proxy admin API with a single PUT per
// apply call.
//
// ## Scope
//
// The sink makes exactly one HTTP request per apply. Retries, backoff and
// scheduling are owned by the engine; the sink only classifies the outcome
// so the engine knows whether retrying makes sense:
//
// - Transport errors, timeouts, 429 and 5xx responses are transient
// - 401/403 and other 4xx responses are permanent (the document or the
//   credentials are wrong, retrying the same payload cannot help)
//
// ## Security
//
// The bearer token never appears in logs or error messages. The Debug
// implementation redacts it.

use async_trait::async_trait;
use routesync_core::config::SinkConfig;
use routesync_core::render::RenderedConfig;
use routesync_core::traits::{ConfigSink, ConfigSinkFactory};
use routesync_core::{Error, Result, SyncRegistry};
use std::time::Duration;

/// Default HTTP timeout for admin API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP config sink
///
/// Issues `PUT <endpoint>` with the rendered JSON document as the body and
/// `Content-Type: application/json`. An optional bearer token is attached
/// when configured.
pub struct HttpSink {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

// Token stays out of Debug output
impl std::fmt::Debug for HttpSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSink")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<REDACTED>"))
            .finish()
    }
}

impl HttpSink {
    /// Create an HTTP sink for the given admin endpoint
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(Error::config(format!(
                "Sink endpoint must be an http(s) URL, got: {}",
                endpoint
            )));
        }
        if let Some(ref t) = token {
            if t.trim().is_empty() {
                return Err(Error::config("Sink token must not be empty when set"));
            }
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint,
            token,
            client,
        })
    }

    /// Map an HTTP response status to the engine's failure taxonomy
    fn classify_status(status: u16, body: &str) -> Error {
        match status {
            401 | 403 => Error::write_permanent(format!(
                "Authentication failed: invalid or insufficient credentials (status {})",
                status
            )),
            429 => Error::write_transient(format!("Rate limit exceeded (status {})", status)),
            500..=599 => Error::write_transient(format!(
                "Proxy admin API server error: {} - {}",
                status, body
            )),
            _ => Error::write_permanent(format!(
                "Proxy admin API rejected configuration: {} - {}",
                status, body
            )),
        }
    }
}

#[async_trait]
impl ConfigSink for HttpSink {
    async fn apply(&self, config: &RenderedConfig) -> Result<()> {
        let mut request = self
            .client
            .put(&self.endpoint)
            .header("Content-Type", "application/json")
            .body(config.document().to_string());

        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            // reqwest errors here are connection or timeout failures
            Error::write_transient(format!("HTTP request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(Self::classify_status(status.as_u16(), &body));
        }

        tracing::debug!(
            "pushed configuration {} to {}",
            config.fingerprint(),
            self.endpoint
        );
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP sinks
pub struct HttpSinkFactory;

impl ConfigSinkFactory for HttpSinkFactory {
    fn create(&self, config: &SinkConfig) -> Result<Box<dyn ConfigSink>> {
        match config {
            SinkConfig::Http { endpoint, token } => {
                Ok(Box::new(HttpSink::new(endpoint, token.clone())?))
            }
            _ => Err(Error::config("Invalid config for http sink")),
        }
    }
}

/// Register the HTTP sink with a registry
pub fn register(registry: &SyncRegistry) {
    registry.register_sink("http", Box::new(HttpSinkFactory));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_endpoint() {
        assert!(HttpSink::new("ftp://proxy.internal/config", None).is_err());
        assert!(HttpSink::new("proxy.internal", None).is_err());
    }

    #[test]
    fn rejects_blank_token() {
        assert!(HttpSink::new("http://proxy.internal/config", Some("  ".into())).is_err());
    }

    #[test]
    fn accepts_https_endpoint_with_token() {
        let sink = HttpSink::new("https://proxy.internal/config", Some("tok".into())).unwrap();
        assert_eq!(sink.sink_name(), "http");
    }

    #[test]
    fn auth_failures_are_permanent() {
        assert!(!HttpSink::classify_status(401, "").is_transient());
        assert!(!HttpSink::classify_status(403, "").is_transient());
    }

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        assert!(HttpSink::classify_status(429, "").is_transient());
        assert!(HttpSink::classify_status(500, "").is_transient());
        assert!(HttpSink::classify_status(503, "").is_transient());
    }

    #[test]
    fn schema_rejection_is_permanent() {
        assert!(!HttpSink::classify_status(400, "bad document").is_transient());
        assert!(!HttpSink::classify_status(422, "bad document").is_transient());
    }

    #[test]
    fn debug_output_redacts_token() {
        let sink = HttpSink::new("https://proxy.internal/config", Some("secret".into())).unwrap();
        let rendered = format!("{:?}", sink);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn factory_rejects_mismatched_config() {
        use routesync_core::config::SinkConfig;
        // The Ok type is a boxed trait object without Debug, so take the
        // error side without formatting the success side.
        let err = HttpSinkFactory
            .create(&SinkConfig::File {
                path: "/tmp/x.json".into(),
            })
            .err()
            .unwrap();
        assert!(!err.is_transient());
    }
}
