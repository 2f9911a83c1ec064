//! OAuth2 token exchange.
//!
//! `login` obtains an authorization code from the host (AUTHORIZE) and hands
//! it to a [`TokenExchange`] to get an access token. The default
//! implementation talks to the OAuth2 token endpoint over HTTPS.

use crate::error::ClientError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Default API base of the OAuth2 endpoints.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api";

/// Inputs of an authorization-code exchange.
#[derive(Debug, Clone)]
pub struct TokenRequest {
    pub code: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

/// Access token plus refresh and expiry metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl AccessToken {
    /// Wraps a bare access token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            access_token: token.into(),
            token_type: Some("Bearer".to_string()),
            refresh_token: None,
            expires_in: None,
            scope: None,
        }
    }
}

/// Turns authorization codes into access tokens.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchanges an authorization code for an access token.
    async fn exchange(&self, request: TokenRequest) -> Result<AccessToken, ClientError>;

    /// Fetches an RPC token to pass along with AUTHORIZE.
    async fn rpc_token(
        &self,
        _client_id: &str,
        _client_secret: Option<&str>,
    ) -> Result<String, ClientError> {
        Err(ClientError::TokenExchange(
            "rpc tokens are not supported by this exchange".to_string(),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct RpcTokenResponse {
    rpc_token: String,
}

/// Token exchange over HTTP.
///
/// With a custom `token_endpoint`, the code is posted as JSON
/// (`{"code": ...}`) to that endpoint, which is expected to hold the client
/// secret and answer with an [`AccessToken`]. Otherwise the standard
/// `/oauth2/token` form exchange is used.
#[derive(Debug, Clone)]
pub struct HttpTokenExchange {
    http: reqwest::Client,
    api_base: String,
    token_endpoint: Option<String>,
}

impl Default for HttpTokenExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTokenExchange {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            token_endpoint: None,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = Some(endpoint.into());
        self
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ClientError::TokenExchange(e.to_string()))?;

        if !status.is_success() {
            return Err(ClientError::TokenExchange(format!("{status}: {body}")));
        }

        serde_json::from_str(&body)
            .map_err(|_| ClientError::TokenExchange(format!("unexpected response: {body}")))
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange(&self, request: TokenRequest) -> Result<AccessToken, ClientError> {
        let resp = match &self.token_endpoint {
            Some(endpoint) => {
                tracing::debug!("Exchanging code via {}", endpoint);
                self.http
                    .post(endpoint)
                    .json(&serde_json::json!({ "code": request.code }))
                    .send()
                    .await
            }
            None => {
                let url = format!("{}/oauth2/token", self.api_base);
                tracing::debug!("Exchanging code via {}", url);
                let mut form = vec![
                    ("client_id", request.client_id),
                    ("grant_type", "authorization_code".to_string()),
                    ("code", request.code),
                ];
                if let Some(secret) = request.client_secret {
                    form.push(("client_secret", secret));
                }
                if let Some(redirect_uri) = request.redirect_uri {
                    form.push(("redirect_uri", redirect_uri));
                }
                self.http.post(url).form(&form).send().await
            }
        }
        .map_err(|e| ClientError::TokenExchange(e.to_string()))?;

        Self::read_json(resp).await
    }

    async fn rpc_token(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<String, ClientError> {
        let url = format!("{}/oauth2/token/rpc", self.api_base);
        let mut form = vec![("client_id", client_id)];
        if let Some(secret) = client_secret {
            form.push(("client_secret", secret));
        }

        let resp = self
            .http
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ClientError::TokenExchange(e.to_string()))?;

        let token: RpcTokenResponse = Self::read_json(resp).await?;
        Ok(token.rpc_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> TokenRequest {
        TokenRequest {
            code: "abc".to_string(),
            client_id: "123".to_string(),
            client_secret: Some("shh".to_string()),
            redirect_uri: Some("http://localhost/cb".to_string()),
        }
    }

    #[tokio::test]
    async fn test_form_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok",
                "token_type": "Bearer",
                "refresh_token": "ref",
                "expires_in": 604800,
                "scope": "rpc identify"
            })))
            .mount(&server)
            .await;

        let exchange = HttpTokenExchange::new().with_api_base(server.uri());
        let token = exchange.exchange(request()).await.unwrap();
        assert_eq!(token.access_token, "tok");
        assert_eq!(token.refresh_token.as_deref(), Some("ref"));
        assert_eq!(token.expires_in, Some(604800));
    }

    #[tokio::test]
    async fn test_custom_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/token"))
            .and(body_string_contains("\"code\":\"abc\""))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access_token": "custom" })),
            )
            .mount(&server)
            .await;

        let exchange = HttpTokenExchange::new()
            .with_token_endpoint(format!("{}/auth/token", server.uri()));
        let token = exchange.exchange(request()).await.unwrap();
        assert_eq!(token.access_token, "custom");
        assert_eq!(token.refresh_token, None);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let exchange = HttpTokenExchange::new().with_api_base(server.uri());
        let err = exchange.exchange(request()).await.unwrap_err();
        match err {
            ClientError::TokenExchange(msg) => assert!(msg.contains("invalid_grant")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_rpc_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token/rpc"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "rpc_token": "r1" })),
            )
            .mount(&server)
            .await;

        let exchange = HttpTokenExchange::new().with_api_base(server.uri());
        assert_eq!(exchange.rpc_token("123", Some("shh")).await.unwrap(), "r1");
    }
}
