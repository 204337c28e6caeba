//! Remote sync endpoint contract and its HTTP client.

use std::future::Future;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::protocol::{PullRequest, PullResponse, PushRequest};
use crate::auth::CredentialProvider;
use crate::config::SyncClientConfig;
use crate::error::{Error, Result};

/// The server side of a sync round
pub trait RemoteEndpoint: Send + Sync {
    /// Fetch every change after `request.last_pulled_at`
    fn pull(&self, request: &PullRequest) -> impl Future<Output = Result<PullResponse>> + Send;

    /// Submit this device's outstanding changes
    fn push(&self, request: &PushRequest) -> impl Future<Output = Result<()>> + Send;
}

/// `POST <base>/sync` over HTTPS with bearer auth
#[derive(Clone)]
pub struct HttpSyncEndpoint<C: CredentialProvider> {
    endpoint: String,
    client: Client,
    credentials: C,
}

impl<C: CredentialProvider> HttpSyncEndpoint<C> {
    pub fn new(config: &SyncClientConfig, credentials: C) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| Error::Network(format!("failed to build HTTP client: {error}")))?;
        Ok(Self {
            endpoint: config.sync_endpoint(),
            client,
            credentials,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<B: Serialize + Sync>(&self, body: &B) -> Result<reqwest::Response> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(body);
        if let Some(token) = self.credentials.bearer_token()? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = parse_api_error(status, &body);
        if status == StatusCode::UNAUTHORIZED {
            self.credentials.revoke()?;
            tracing::warn!("Sync credential rejected; stored token revoked");
            return Err(Error::Auth(message));
        }
        Err(Error::Server {
            status: status.as_u16(),
            message,
        })
    }
}

impl<C: CredentialProvider> RemoteEndpoint for HttpSyncEndpoint<C> {
    async fn pull(&self, request: &PullRequest) -> Result<PullResponse> {
        let response = self.post(request).await?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&body).map_err(|error| Error::Server {
            status: status.as_u16(),
            message: format!("malformed pull response: {error}"),
        })
    }

    async fn push(&self, request: &PushRequest) -> Result<()> {
        self.post(request).await?;
        Ok(())
    }
}

impl<C: CredentialProvider> std::fmt::Debug for HttpSyncEndpoint<C> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpSyncEndpoint")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

fn transport_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::Network(format!("sync request timed out: {error}"))
    } else {
        Error::Network(error.to_string())
    }
}

/// Longest server error text carried into an error message
const MAX_ERROR_CHARS: usize = 180;

/// Collapse whitespace and cap a server error body for display
fn summarize_body(body: &str) -> String {
    body.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_ERROR_CHARS)
        .collect()
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", summarize_body(&message), status.as_u16());
        }
    }

    let trimmed = summarize_body(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{trimmed} ({})", status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticCredentials;
    use crate::sync::protocol::SyncChanges;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    async fn serve(router: Router) -> SyncClientConfig {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        SyncClientConfig::new(format!("http://{address}"))
            .unwrap()
            .with_request_timeout(Duration::from_secs(5))
    }

    fn pull_request() -> PullRequest {
        PullRequest {
            last_pulled_at: Some(100),
            schema_version: 5,
            migration: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pull_sends_bearer_token_and_parses_changes() {
        let router = Router::new().route(
            "/sync",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let authorized = headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    == Some("Bearer secret");
                if !authorized || body["lastPulledAt"] != json!(100) {
                    return (AxumStatus::BAD_REQUEST, Json(json!({ "error": "bad request" })));
                }
                (
                    AxumStatus::OK,
                    Json(json!({
                        "changes": {
                            "users": {
                                "created": [],
                                "updated": [{ "id": "u1", "name": "Asha", "created_at": 1, "updated_at": 150 }],
                                "deleted": []
                            }
                        },
                        "timestamp": 200
                    })),
                )
            }),
        );
        let config = serve(router).await;
        let endpoint = HttpSyncEndpoint::new(&config, StaticCredentials::new("secret")).unwrap();

        let response = endpoint.pull(&pull_request()).await.unwrap();
        assert_eq!(response.timestamp, 200);
        assert_eq!(response.changes.users.updated[0].name, "Asha");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unauthorized_revokes_token() {
        let router = Router::new().route(
            "/sync",
            post(|| async {
                (
                    AxumStatus::UNAUTHORIZED,
                    Json(json!({ "message": "token expired" })),
                )
            }),
        );
        let config = serve(router).await;
        let credentials = Arc::new(StaticCredentials::new("secret"));
        let endpoint = HttpSyncEndpoint::new(&config, credentials.clone()).unwrap();

        let error = endpoint.pull(&pull_request()).await.unwrap_err();
        assert!(matches!(error, Error::Auth(ref message) if message.contains("token expired")));
        assert!(credentials.is_revoked());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_server_failure_is_server_error() {
        let router = Router::new().route(
            "/sync",
            post(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "database unavailable") }),
        );
        let config = serve(router).await;
        let endpoint = HttpSyncEndpoint::new(&config, StaticCredentials::anonymous()).unwrap();

        let error = endpoint
            .push(&PushRequest {
                last_pulled_at: 200,
                changes: SyncChanges::default(),
            })
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Server { status: 500, .. }));
        assert!(error.is_retryable());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_malformed_pull_body_is_server_error() {
        let router = Router::new().route("/sync", post(|| async { "not json" }));
        let config = serve(router).await;
        let endpoint = HttpSyncEndpoint::new(&config, StaticCredentials::anonymous()).unwrap();

        let error = endpoint.pull(&pull_request()).await.unwrap_err();
        assert!(matches!(error, Error::Server { status: 200, .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unreachable_server_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let config = SyncClientConfig::new(format!("http://{address}")).unwrap();
        let endpoint = HttpSyncEndpoint::new(&config, StaticCredentials::anonymous()).unwrap();
        let error = endpoint.pull(&pull_request()).await.unwrap_err();
        assert!(matches!(error, Error::Network(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_slow_server_times_out_as_network_error() {
        let router = Router::new().route(
            "/sync",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "too late"
            }),
        );
        let config = serve(router)
            .await
            .with_request_timeout(Duration::from_millis(100));
        let endpoint = HttpSyncEndpoint::new(&config, StaticCredentials::anonymous()).unwrap();

        let error = endpoint.pull(&pull_request()).await.unwrap_err();
        assert!(matches!(error, Error::Network(ref message) if message.contains("timed out")));
        assert!(error.is_retryable());
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, r#"{"error":"upstream","message":"retry later"}"#),
            "retry later (502)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn error_bodies_are_collapsed_and_capped() {
        assert_eq!(summarize_body(" upstream\n  timed   out "), "upstream timed out");
        let page = format!("<html>{}</html>", "x".repeat(500));
        assert_eq!(summarize_body(&page).chars().count(), MAX_ERROR_CHARS);
    }
}
