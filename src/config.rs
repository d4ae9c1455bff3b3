//! Configuration loading and management.
//!
//! Loads configuration from the embedded config.toml, merges an optional user
//! file on top of it, then applies environment variable overrides.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use url::Url;

/// Embedded configuration file content.
const CONFIG_TOML: &str = include_str!("../config.toml");

/// File name of the optional user configuration.
const USER_CONFIG_FILE: &str = "config.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub oauth: OAuthConfig,
    pub api: ApiConfig,
    pub token: TokenConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub authority: String,
    pub client_id: String,
    pub tenant: String,
    pub redirect_uri: String,
    pub login_timeout_seconds: u64,
    pub scopes: ScopesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopesConfig {
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub graph_base_url: String,
    pub request_timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub refresh_before_expiry_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    pub csv_file_name: String,
    pub mail_subject: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: bool,
}

/// Where the loopback callback server listens, derived from the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackTarget {
    pub port: u16,
    pub path: String,
}

impl Config {
    /// Load configuration: embedded defaults, user file, then environment overrides.
    pub fn load() -> Result<Self> {
        let user_file = user_config_path();
        let mut config = Self::from_layers(user_file.as_deref())?;

        if let Ok(authority) = env::var("AZURE_AUTHORITY") {
            config.oauth.authority = authority;
        }

        if let Ok(client_id) = env::var("AZURE_CLIENT_ID") {
            config.oauth.client_id = client_id;
        }

        if let Ok(tenant) = env::var("AZURE_TENANT_ID") {
            config.oauth.tenant = tenant;
        }

        if let Ok(redirect_uri) = env::var("AZURE_REDIRECT_URI") {
            config.oauth.redirect_uri = redirect_uri;
        }

        if let Ok(base_url) = env::var("GRAPH_BASE_URL") {
            config.api.graph_base_url = base_url;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            config.logging.level = log_level;
        }

        config.validate()?;

        Ok(config)
    }

    /// Parse the embedded defaults and merge the user file (if it exists) on top.
    fn from_layers(user_file: Option<&Path>) -> Result<Self> {
        let mut merged: toml::Value =
            toml::from_str(CONFIG_TOML).context("Failed to parse embedded config.toml")?;

        if let Some(path) = user_file.filter(|p| p.exists()) {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let overlay: toml::Value = toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            merge_toml(&mut merged, overlay);
            tracing::debug!("Merged user configuration from {}", path.display());
        }

        merged
            .try_into()
            .context("Configuration does not match the expected schema")
    }

    /// Validate that required configuration is present.
    fn validate(&self) -> Result<()> {
        if self.oauth.client_id.is_empty() || self.oauth.client_id == "YOUR_AZURE_AD_CLIENT_ID" {
            anyhow::bail!(
                "Azure AD client_id not configured. Set AZURE_CLIENT_ID environment variable \
                 or update config.toml"
            );
        }

        if self.oauth.tenant.is_empty() || self.oauth.tenant == "YOUR_TENANT_ID" {
            anyhow::bail!(
                "Azure AD tenant not configured. Set AZURE_TENANT_ID environment variable \
                 or update config.toml"
            );
        }

        self.callback_target()?;

        Url::parse(&self.oauth.authority)
            .with_context(|| format!("Invalid authority: {}", self.oauth.authority))?;

        Url::parse(&self.api.graph_base_url)
            .with_context(|| format!("Invalid graph_base_url: {}", self.api.graph_base_url))?;

        Ok(())
    }

    /// Get the authorization URL for Azure AD.
    pub fn auth_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/authorize",
            self.authority(),
            self.oauth.tenant
        )
    }

    /// Get the token URL for Azure AD.
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority(),
            self.oauth.tenant
        )
    }

    /// Get the front-channel sign-out URL for Azure AD.
    pub fn logout_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/logout",
            self.authority(),
            self.oauth.tenant
        )
    }

    fn authority(&self) -> &str {
        self.oauth.authority.trim_end_matches('/')
    }

    /// Derive the loopback port and path from the redirect URI.
    ///
    /// Only `http` redirects to `localhost` or `127.0.0.1` with an explicit
    /// port can be served by the local callback server.
    pub fn callback_target(&self) -> Result<CallbackTarget> {
        let url = Url::parse(&self.oauth.redirect_uri)
            .with_context(|| format!("Invalid redirect_uri: {}", self.oauth.redirect_uri))?;

        if url.scheme() != "http" {
            anyhow::bail!("redirect_uri must use http for the loopback callback");
        }

        match url.host_str() {
            Some("localhost") | Some("127.0.0.1") => {}
            _ => anyhow::bail!("redirect_uri must point at localhost or 127.0.0.1"),
        }

        let port = url
            .port()
            .ok_or_else(|| anyhow::anyhow!("redirect_uri must include a port"))?;

        Ok(CallbackTarget {
            port,
            path: url.path().to_string(),
        })
    }
}

/// Path of the optional user configuration file.
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "m365report").map(|dirs| dirs.config_dir().join(USER_CONFIG_FILE))
}

/// Recursively merge `overlay` into `base`; tables merge, everything else replaces.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
