//! Session ownership: interactive login, silent refresh and logout.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::mpsc as std_mpsc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::callback_server::{self, CallbackResult};
use super::oauth::{parse_callback_url, OAuth2Client, PkceChallenge, TokenResponse};
use super::secure::SecureString;
use crate::config::{CallbackTarget, Config};
use crate::error::AuthError;

/// Anything that can hand out a bearer token for the directory API.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<SecureString, AuthError>;
}

/// The signed-in operator, taken from the ID token claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Account {
    #[serde(rename = "name")]
    pub display_name: Option<String>,
    #[serde(rename = "preferred_username")]
    pub username: Option<String>,
    #[serde(rename = "oid")]
    pub object_id: Option<String>,
    #[serde(rename = "tid")]
    pub tenant_id: Option<String>,
}

impl Account {
    /// Decode the claims of an ID token.
    ///
    /// The token comes straight from the token endpoint over TLS, so the
    /// signature is not checked here.
    pub fn from_id_token(id_token: &str) -> Result<Self, AuthError> {
        let payload = id_token
            .split('.')
            .nth(1)
            .ok_or_else(|| AuthError::TokenExchangeFailed("Malformed ID token".into()))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| AuthError::TokenExchangeFailed(format!("ID token encoding: {}", e)))?;

        serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::TokenExchangeFailed(format!("ID token claims: {}", e)))
    }

    /// Best available label for the operator.
    pub fn label(&self) -> String {
        match (&self.display_name, &self.username) {
            (Some(name), Some(upn)) => format!("{} <{}>", name, upn),
            (Some(name), None) => name.clone(),
            (None, Some(upn)) => upn.clone(),
            (None, None) => "Unknown User".to_string(),
        }
    }
}

/// Live authenticated state for one operator.
struct Session {
    account: Account,
    access_token: SecureString,
    refresh_token: Option<SecureString>,
    expires_at: DateTime<Utc>,
}

impl Session {
    fn from_token_response(response: TokenResponse) -> Result<Self, AuthError> {
        let account = match &response.id_token {
            Some(id_token) => Account::from_id_token(id_token.as_str())?,
            None => Account::default(),
        };

        Ok(Self {
            account,
            expires_at: expiry_from(response.expires_in),
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        })
    }
}

/// Token lifetimes above a day are treated as a day.
const MAX_TOKEN_LIFETIME_SECS: u64 = 24 * 60 * 60;

fn expiry_from(expires_in: u64) -> DateTime<Utc> {
    let secs = expires_in.min(MAX_TOKEN_LIFETIME_SECS) as i64;
    Utc::now() + Duration::seconds(secs)
}

/// Snapshot of the session for display.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub account: Account,
    pub expires_at: DateTime<Utc>,
}

impl SessionStatus {
    /// Human-readable remaining token lifetime, e.g. "45 min" or "expired".
    pub fn remaining(&self) -> String {
        let left = self.expires_at - Utc::now();
        if left <= Duration::zero() {
            "expired".to_string()
        } else {
            format_duration(left)
        }
    }
}

/// Owns the operator's session and the OAuth flows around it.
pub struct TokenProvider {
    oauth: OAuth2Client,
    callback: CallbackTarget,
    login_timeout: std::time::Duration,
    refresh_margin: Duration,
    session: Mutex<Option<Session>>,
}

impl TokenProvider {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            oauth: OAuth2Client::new(config)?,
            callback: config.callback_target()?,
            login_timeout: std::time::Duration::from_secs(config.oauth.login_timeout_seconds),
            refresh_margin: Duration::seconds(config.token.refresh_before_expiry_seconds as i64),
            session: Mutex::new(None),
        })
    }

    /// Run the interactive sign-in and store the resulting session.
    ///
    /// `on_auth_url` is called with the authorization URL before the browser
    /// is opened so the caller can show it as a fallback. Any failure leaves
    /// no session behind.
    pub async fn login(&self, on_auth_url: impl FnOnce(&Url)) -> Result<Account, AuthError> {
        if self.session.lock().await.take().is_some() {
            info!("Discarding previous session before signing in again");
        }

        let pkce = PkceChallenge::new();
        let (auth_url, expected_state) = self.oauth.generate_auth_url(&pkce)?;

        let (cancel_tx, cancel_rx) = std_mpsc::channel();
        let target = self.callback.clone();
        let mut server = tokio::task::spawn_blocking(move || {
            callback_server::start_callback_server(&target, cancel_rx)
        });

        on_auth_url(&auth_url);
        if let Err(e) = open::that(auth_url.as_str()) {
            let _ = cancel_tx.send(());
            let _ = server.await;
            return Err(AuthError::BrowserLaunch(e.to_string()));
        }

        let result = match tokio::time::timeout(self.login_timeout, &mut server).await {
            Ok(joined) => joined.map_err(|e| AuthError::CallbackServer(e.to_string()))?,
            Err(_) => {
                let _ = cancel_tx.send(());
                let _ = server.await;
                warn!("No OAuth callback within {:?}", self.login_timeout);
                return Err(AuthError::CallbackTimeout);
            }
        };

        let callback_url = match result {
            CallbackResult::Success(url) => url,
            CallbackResult::Cancelled => return Err(AuthError::UserCancelled),
            CallbackResult::Error(e) => return Err(AuthError::CallbackServer(e)),
        };

        let account = self
            .complete_login(&callback_url, &expected_state, &pkce)
            .await?;
        info!("Sign-in successful: {}", account.label());
        Ok(account)
    }

    /// Validate the callback, redeem the code and install the session.
    async fn complete_login(
        &self,
        callback_url: &str,
        expected_state: &str,
        pkce: &PkceChallenge,
    ) -> Result<Account, AuthError> {
        let (code, state) = parse_callback_url(callback_url)?;

        if state != expected_state {
            return Err(AuthError::StateValidationFailed);
        }

        let response = self.oauth.exchange_code(&code, &pkce.verifier).await?;
        let session = Session::from_token_response(response)?;
        let account = session.account.clone();

        *self.session.lock().await = Some(session);
        Ok(account)
    }

    /// End the session. Returns the identity provider sign-out URL when a
    /// session was actually ended, so the caller can offer it to the operator.
    pub async fn logout(&self) -> Option<Url> {
        let ended = self.session.lock().await.take();

        let session = ended?;
        info!("Signed out {}", session.account.label());

        match self.oauth.logout_url() {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Could not build sign-out URL: {}", e);
                None
            }
        }
    }

    /// Return a valid access token, refreshing silently when it is about to expire.
    pub async fn get_token(&self) -> Result<SecureString, AuthError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(AuthError::NoActiveSession)?;

        let now = Utc::now();
        if session.expires_at - self.refresh_margin > now {
            return Ok(session.access_token.clone());
        }

        let Some(refresh_token) = session.refresh_token.clone() else {
            if session.expires_at > now {
                return Ok(session.access_token.clone());
            }
            return Err(AuthError::TokenRefreshFailed(
                "Access token expired and no refresh token is available".into(),
            ));
        };

        debug!("Access token expires at {}, refreshing", session.expires_at);
        let response = self.oauth.refresh_token(&refresh_token).await?;

        session.expires_at = expiry_from(response.expires_in);
        session.access_token = response.access_token;
        if let Some(new_refresh) = response.refresh_token {
            session.refresh_token = Some(new_refresh);
        }

        info!("Token refreshed, expires at {}", session.expires_at);
        Ok(session.access_token.clone())
    }

    /// Account and expiry of the current session, if any.
    pub async fn status(&self) -> Option<SessionStatus> {
        self.session.lock().await.as_ref().map(|s| SessionStatus {
            account: s.account.clone(),
            expires_at: s.expires_at,
        })
    }

    #[cfg(test)]
    async fn install_session(&self, response: TokenResponse) {
        *self.session.lock().await = Some(Session::from_token_response(response).unwrap());
    }
}

#[async_trait]
impl TokenSource for TokenProvider {
    async fn access_token(&self) -> Result<SecureString, AuthError> {
        self.get_token().await
    }
}

/// Format duration as human-readable string (e.g., "45 min", "1 hour").
pub fn format_duration(duration: Duration) -> String {
    let total_minutes = duration.num_minutes();

    if total_minutes < 1 {
        "< 1 min".to_string()
    } else if total_minutes < 60 {
        format!("{} min", total_minutes)
    } else {
        let hours = total_minutes / 60;
        let mins = total_minutes % 60;
        if mins == 0 {
            format!("{} hour{}", hours, if hours == 1 { "" } else { "s" })
        } else {
            format!("{}h {}m", hours, mins)
        }
    }
}
