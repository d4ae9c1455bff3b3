//! OAuth2 client with PKCE support for Azure AD authentication.

use crate::config::Config;
use crate::error::AuthError;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use super::secure::SecureString;

/// PKCE code verifier and challenge pair.
#[derive(Debug)]
pub struct PkceChallenge {
    /// The code verifier (stored locally, sent in token exchange).
    pub verifier: SecureString,
    /// The code challenge (SHA256 hash of verifier, sent in auth request).
    pub challenge: String,
}

impl PkceChallenge {
    /// Generate a new PKCE challenge pair.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let verifier_bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
        let verifier = URL_SAFE_NO_PAD.encode(&verifier_bytes);

        // challenge = BASE64URL(SHA256(verifier))
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

        Self {
            verifier: SecureString::new(verifier),
            challenge,
        }
    }
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

/// OAuth2 client for Azure AD authentication.
pub struct OAuth2Client {
    client_id: String,
    authorize_endpoint: String,
    token_endpoint: String,
    logout_endpoint: String,
    redirect_uri: String,
    scopes: Vec<String>,
    http_client: reqwest::Client,
}

impl OAuth2Client {
    /// Create a new OAuth2 client from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.api.connect_timeout_seconds))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client_id: config.oauth.client_id.clone(),
            authorize_endpoint: config.auth_url(),
            token_endpoint: config.token_url(),
            logout_endpoint: config.logout_url(),
            redirect_uri: config.oauth.redirect_uri.clone(),
            scopes: config.oauth.scopes.scopes.clone(),
            http_client,
        })
    }

    /// Generate the authorization URL for browser-based sign-in.
    ///
    /// Returns the URL and a CSRF state token that must be verified in the callback.
    pub fn generate_auth_url(&self, pkce: &PkceChallenge) -> Result<(Url, String), AuthError> {
        let mut rng = rand::thread_rng();
        let state_bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
        let state = URL_SAFE_NO_PAD.encode(&state_bytes);

        let mut url = Url::parse(&self.authorize_endpoint)
            .map_err(|e| AuthError::OAuthFailed(format!("Invalid authorize endpoint: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", &state)
            .append_pair("prompt", "select_account")
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256");

        Ok((url, state))
    }

    /// Front-channel sign-out URL that ends the identity provider session.
    pub fn logout_url(&self) -> Result<Url, AuthError> {
        let mut url = Url::parse(&self.logout_endpoint)
            .map_err(|e| AuthError::OAuthFailed(format!("Invalid logout endpoint: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("post_logout_redirect_uri", &self.redirect_uri);
        Ok(url)
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &SecureString,
    ) -> Result<TokenResponse, AuthError> {
        let scope = self.scopes.join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code_verifier", pkce_verifier.as_str()),
            ("scope", scope.as_str()),
        ];

        self.token_request(&params)
            .await
            .map_err(AuthError::TokenExchangeFailed)
    }

    /// Refresh an access token using a refresh token.
    pub async fn refresh_token(
        &self,
        refresh_token: &SecureString,
    ) -> Result<TokenResponse, AuthError> {
        let scope = self.scopes.join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("scope", scope.as_str()),
        ];

        self.token_request(&params)
            .await
            .map_err(AuthError::TokenRefreshFailed)
    }

    /// POST a form to the token endpoint; the error string is safe to show.
    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(params)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            // Log error details for debugging (doesn't expose to user)
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!("Token request failed: HTTP {} - {}", status, error_body);
            return Err(format!("HTTP {}", status.as_u16()));
        }

        response.json().await.map_err(|e| e.to_string())
    }
}

/// Token response from Azure AD.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: SecureString,
    pub expires_in: u64,
    pub refresh_token: Option<SecureString>,
    pub id_token: Option<SecureString>,
    #[serde(default)]
    pub scope: String,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("expires_in", &self.expires_in)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .field("scope", &self.scope)
            .finish()
    }
}

/// Parse OAuth callback URL to extract code and state.
pub fn parse_callback_url(url_string: &str) -> Result<(String, String), AuthError> {
    let url = Url::parse(url_string).map_err(|_| AuthError::InvalidAuthCode)?;

    let params: HashMap<_, _> = url.query_pairs().collect();

    if let Some(error) = params.get("error") {
        if error == "access_denied" {
            return Err(AuthError::UserCancelled);
        }
        let description = params
            .get("error_description")
            .map(|s| s.to_string())
            .unwrap_or_else(|| error.to_string());
        return Err(AuthError::OAuthFailed(description));
    }

    let code = params
        .get("code")
        .ok_or(AuthError::InvalidAuthCode)?
        .to_string();

    let state = params
        .get("state")
        .ok_or(AuthError::StateValidationFailed)?
        .to_string();

    Ok((code, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;

    #[test]
    fn test_pkce_generation() {
        let pkce = PkceChallenge::new();

        // 32 bytes base64url-encoded without padding
        assert_eq!(pkce.verifier.as_str().len(), 43);
        assert!(!pkce.challenge.is_empty());
        assert_ne!(pkce.verifier.as_str(), pkce.challenge);
    }

    #[test]
    fn test_pkce_challenge_matches_verifier() {
        let pkce = PkceChallenge::new();
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.verifier.as_str().as_bytes()));
        assert_eq!(pkce.challenge, expected);
    }

    #[test]
    fn test_auth_url_parameters() {
        let client = OAuth2Client::new(&test_config()).unwrap();
        let pkce = PkceChallenge::new();
        let (url, state) = client.generate_auth_url(&pkce).unwrap();

        assert!(url
            .as_str()
            .starts_with("https://login.microsoftonline.com/test-tenant/oauth2/v2.0/authorize?"));

        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "test-client");
        assert_eq!(params["redirect_uri"], "http://localhost:8000");
        assert_eq!(params["state"], state);
        assert_eq!(params["code_challenge"], pkce.challenge);
        assert_eq!(params["code_challenge_method"], "S256");
        assert!(params["scope"].contains("Group.Read.All"));
        assert!(params["scope"].contains("Mail.Send"));
    }

    #[test]
    fn test_logout_url() {
        let client = OAuth2Client::new(&test_config()).unwrap();
        let url = client.logout_url().unwrap();
        assert_eq!(url.path(), "/test-tenant/oauth2/v2.0/logout");
        assert!(url.query().unwrap().contains("post_logout_redirect_uri="));
    }

    #[test]
    fn test_parse_callback_success() {
        let url = "http://localhost:8000/?code=abc123&state=xyz789";
        let (code, state) = parse_callback_url(url).unwrap();
        assert_eq!(code, "abc123");
        assert_eq!(state, "xyz789");
    }

    #[test]
    fn test_parse_callback_error() {
        let url = "http://localhost:8000/?error=consent_required&error_description=Admin%20consent";
        let result = parse_callback_url(url);
        assert!(matches!(result, Err(AuthError::OAuthFailed(d)) if d == "Admin consent"));

        let url = "http://localhost:8000/?error=access_denied";
        assert!(matches!(
            parse_callback_url(url),
            Err(AuthError::UserCancelled)
        ));
    }

    #[test]
    fn test_parse_callback_missing_code() {
        let url = "http://localhost:8000/?state=xyz789";
        let result = parse_callback_url(url);
        assert!(matches!(result, Err(AuthError::InvalidAuthCode)));
    }

    #[test]
    fn test_token_response_debug_redacts() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"secret-at","token_type":"Bearer","expires_in":3599,"refresh_token":"secret-rt"}"#,
        )
        .unwrap();
        let debug = format!("{:?}", response);
        assert!(!debug.contains("secret"));
        assert_eq!(response.access_token.as_str(), "secret-at");
    }
}
