//! Authenticated Microsoft Graph client.
//!
//! Every remote call goes through [`ApiClient::request`]: one bearer-token
//! request, no retries, no caching. Failures are returned to the caller
//! immediately with the raw error body logged for diagnostics.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

use crate::auth::TokenSource;
use crate::config::Config;
use crate::error::ApiError;

/// Request/response access to the directory API.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    /// Send `body` (as JSON) to `endpoint` and return the JSON answer.
    ///
    /// Successful responses without a JSON content type yield an empty object.
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError>;
}

/// GET `endpoint` and deserialize the answer.
pub async fn get_json<T, A>(api: &A, endpoint: &str) -> Result<T, ApiError>
where
    T: DeserializeOwned,
    A: DirectoryApi + ?Sized,
{
    let value = api.request(Method::GET, endpoint, None).await?;
    serde_json::from_value(value).map_err(|e| ApiError::ParseFailed(e.to_string()))
}

/// Microsoft Graph API client.
pub struct ApiClient {
    http_client: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl ApiClient {
    /// Create a new Graph client that authenticates with `tokens`.
    pub fn new(config: &Config, tokens: Arc<dyn TokenSource>) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.api.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.api.connect_timeout_seconds))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            http_client,
            base_url: config.api.graph_base_url.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Resolve an endpoint against the base URL.
    ///
    /// Absolute URLs (Graph paging links) are accepted only under the base URL
    /// so the bearer token never leaves the directory API.
    fn url_for(&self, endpoint: &str) -> Result<String, ApiError> {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            if endpoint.starts_with(&format!("{}/", self.base_url)) {
                return Ok(endpoint.to_string());
            }
            return Err(ApiError::InvalidEndpoint(endpoint.to_string()));
        }

        if endpoint.starts_with('/') {
            Ok(format!("{}{}", self.base_url, endpoint))
        } else {
            Ok(format!("{}/{}", self.base_url, endpoint))
        }
    }
}

#[async_trait]
impl DirectoryApi for ApiClient {
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let url = self.url_for(endpoint)?;
        let token = self.tokens.access_token().await?;
        let request_id = Uuid::new_v4().to_string();

        debug!("{} {} (client-request-id {})", method, url, request_id);

        let mut builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(token.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header("client-request-id", &request_id);

        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let is_json = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.contains("application/json"))
                .unwrap_or(false);

            if !is_json {
                // 202/204 from sendMail and friends
                return Ok(Value::Object(serde_json::Map::new()));
            }

            return response
                .json::<Value>()
                .await
                .map_err(|e| ApiError::ParseFailed(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        error!(
            "Graph API error response: {} {} -> HTTP {} (client-request-id {}): {}",
            method, endpoint, status, request_id, body
        );

        Err(ApiError::Http {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            body,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::secure::SecureString;
    use crate::config::tests::test_config;
    use crate::error::AuthError;
    use crate::testing::{CannedResponse, MockServer};
    use serde_json::json;

    pub(crate) struct StaticToken(pub &'static str);

    #[async_trait]
    impl TokenSource for StaticToken {
        async fn access_token(&self) -> Result<SecureString, AuthError> {
            Ok(SecureString::from(self.0))
        }
    }

    struct SignedOut;

    #[async_trait]
    impl TokenSource for SignedOut {
        async fn access_token(&self) -> Result<SecureString, AuthError> {
            Err(AuthError::NoActiveSession)
        }
    }

    fn client_for(base_url: &str, tokens: Arc<dyn TokenSource>) -> ApiClient {
        let mut config = test_config();
        config.api.graph_base_url = format!("{}/v1.0", base_url);
        ApiClient::new(&config, tokens).unwrap()
    }

    #[tokio::test]
    async fn test_json_response_is_parsed() {
        let server = MockServer::start(vec![CannedResponse::json(
            200,
            json!({"value": [{"displayName": "Sales", "groupTypes": ["Unified"]}]}),
        )]);
        let client = client_for(&server.base_url, Arc::new(StaticToken("token-123")));

        let value = client
            .request(Method::GET, "/users/alice%40example.com/memberOf", None)
            .await
            .unwrap();
        assert_eq!(value["value"][0]["displayName"], "Sales");

        let requests = server.finish();
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].path, "/v1.0/users/alice%40example.com/memberOf");
        assert_eq!(
            requests[0].header("authorization"),
            Some("Bearer token-123")
        );
        assert_eq!(
            requests[0].header("content-type"),
            Some("application/json")
        );
        assert!(requests[0].header("client-request-id").is_some());
    }

    #[tokio::test]
    async fn test_non_json_success_is_empty_object() {
        let server = MockServer::start(vec![
            CannedResponse::no_content(),
            CannedResponse::text(200, "plain"),
        ]);
        let client = client_for(&server.base_url, Arc::new(StaticToken("t")));

        let value = client
            .request(Method::POST, "/me/sendMail", Some(json!({"message": {}})))
            .await
            .unwrap();
        assert_eq!(value, json!({}));

        let value = client.request(Method::GET, "/health", None).await.unwrap();
        assert_eq!(value, json!({}));

        let requests = server.finish();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(
            serde_json::from_str::<Value>(&requests[0].body).unwrap(),
            json!({"message": {}})
        );
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let body = json!({"error": {"code": "Authorization_RequestDenied"}});
        let server = MockServer::start(vec![CannedResponse::json(403, body.clone())]);
        let client = client_for(&server.base_url, Arc::new(StaticToken("t")));

        let err = client.request(Method::GET, "/users", None).await.unwrap_err();
        match err {
            ApiError::Http {
                status,
                reason,
                body: text,
            } => {
                assert_eq!(status, 403);
                assert_eq!(reason, "Forbidden");
                assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), body);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        server.finish();
    }

    #[tokio::test]
    async fn test_missing_session_fails_before_request() {
        let client = client_for("http://127.0.0.1:9", Arc::new(SignedOut));
        let err = client.request(Method::GET, "/users", None).await.unwrap_err();
        assert!(matches!(err, ApiError::Session(AuthError::NoActiveSession)));
    }

    #[tokio::test]
    async fn test_paging_link_under_base_is_followed() {
        let server = MockServer::start(vec![CannedResponse::json(200, json!({"value": []}))]);
        let client = client_for(&server.base_url, Arc::new(StaticToken("t")));

        let next = format!("{}/v1.0/users?$skiptoken=abc", server.base_url);
        client.request(Method::GET, &next, None).await.unwrap();

        let requests = server.finish();
        assert_eq!(requests[0].path, "/v1.0/users?$skiptoken=abc");
    }

    #[tokio::test]
    async fn test_foreign_absolute_url_is_rejected() {
        let client = client_for("http://127.0.0.1:9", Arc::new(StaticToken("t")));
        let err = client
            .request(Method::GET, "https://evil.example.com/steal", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidEndpoint(_)));
    }

    #[tokio::test]
    async fn test_get_json_deserializes() {
        #[derive(serde::Deserialize)]
        struct Page {
            value: Vec<Value>,
        }

        let server = MockServer::start(vec![CannedResponse::json(
            200,
            json!({"value": [1, 2, 3]}),
        )]);
        let client = client_for(&server.base_url, Arc::new(StaticToken("t")));

        let page: Page = get_json(&client, "/groups").await.unwrap();
        assert_eq!(page.value.len(), 3);
        server.finish();
    }
}
