//! Issuer platform HTTP client.
//!
//! Only the two endpoints the controller needs: the liveness probe and
//! identity creation.

use crate::config::{IdentityDefaults, PlatformConfig};
use crate::error::{IssuerError, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Request body of `POST /v1/identities`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIdentityRequest<'a> {
    pub did_metadata: &'a IdentityDefaults,
}

/// Raw answer of the platform API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiReply {
    pub status: u16,
    pub body: String,
}

/// Client for the running issuer platform API.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    client: Client,
    base_url: String,
    user: String,
    password: String,
    timeout: Duration,
}

impl PlatformClient {
    /// Creates a client with basic-auth credentials.
    pub fn new(
        base_url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IssuerError::connection_with_source(&base_url, e))?;

        Ok(Self {
            client,
            base_url,
            user: user.into(),
            password: password.into(),
            timeout,
        })
    }

    /// Creates a client from the platform settings.
    pub fn from_settings(settings: &PlatformConfig, timeout: Duration) -> Result<Self> {
        Self::new(
            &settings.server_url,
            &settings.api_user,
            &settings.api_password,
            timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probes `GET /status`.
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/status", self.base_url);
        debug!(url = %url, "Probing platform API");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.send_error("health check", e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(IssuerError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }

    /// Creates an identity with the given DID metadata.
    ///
    /// Returns the raw reply; non-success statuses are errors carrying the
    /// body so the operator sees what the platform said.
    pub async fn create_identity(&self, metadata: &IdentityDefaults) -> Result<ApiReply> {
        let url = format!("{}/v1/identities", self.base_url);
        info!(
            url = %url,
            method = %metadata.method,
            blockchain = %metadata.blockchain,
            network = %metadata.network,
            "Creating identity"
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&CreateIdentityRequest {
                did_metadata: metadata,
            })
            .send()
            .await
            .map_err(|e| self.send_error("create identity", e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| self.send_error("read identity response", e))?;

        if (200..300).contains(&status) {
            Ok(ApiReply { status, body })
        } else {
            Err(IssuerError::Api { status, body })
        }
    }

    fn send_error(&self, operation: &str, error: reqwest::Error) -> IssuerError {
        if error.is_timeout() {
            IssuerError::Timeout {
                operation: operation.to_string(),
                seconds: self.timeout.as_secs(),
            }
        } else {
            IssuerError::connection_with_source(&self.base_url, error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    const AUTH: &str = "Basic dXNlci1pc3N1ZXI6cGFzc3dvcmQtaXNzdWVy";

    async fn create(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let authorized = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            == Some(AUTH);
        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"message": "unauthorized"})),
            );
        }
        (
            StatusCode::CREATED,
            Json(json!({"identifier": "did:iden3:privado:main:2Sc", "received": body})),
        )
    }

    /// Serves a fake platform API on an ephemeral port.
    async fn fake_platform() -> String {
        let app = Router::new()
            .route("/status", get(|| async { "ok" }))
            .route("/v1/identities", post(create));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base_url: &str, password: &str) -> PlatformClient {
        PlatformClient::new(base_url, "user-issuer", password, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let client = client("http://localhost:3001/", "p");
        assert_eq!(client.base_url(), "http://localhost:3001");
    }

    #[test]
    fn test_request_payload_shape() {
        let identity = IdentityDefaults::default();
        let body = serde_json::to_value(CreateIdentityRequest {
            did_metadata: &identity,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({"didMetadata": {"method": "iden3", "blockchain": "privado", "network": "main", "type": "BJJ"}})
        );
    }

    #[tokio::test]
    async fn test_health_and_create_identity() {
        let base = fake_platform().await;
        let client = client(&base, "password-issuer");

        client.health().await.unwrap();

        let reply = client
            .create_identity(&IdentityDefaults::default())
            .await
            .unwrap();
        assert_eq!(reply.status, 201);
        let body: Value = serde_json::from_str(&reply.body).unwrap();
        assert_eq!(body["received"]["didMetadata"]["network"], "main");
    }

    #[tokio::test]
    async fn test_rejected_request_is_api_error() {
        let base = fake_platform().await;
        let client = client(&base, "wrong");

        let err = client
            .create_identity(&IdentityDefaults::default())
            .await
            .unwrap_err();
        match err {
            IssuerError::Api { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("unauthorized"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_api_is_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client(&format!("http://{}", addr), "password-issuer");
        let err = client.health().await.unwrap_err();
        assert!(matches!(err, IssuerError::Connection { .. }));
    }
}
