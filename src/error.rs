//! Error types for the m365report application.
//!
//! Uses `thiserror` for library-style errors with automatic `Display` and `Error` implementations.

use thiserror::Error;

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

/// Authentication-related errors.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No active session. Please login first.")]
    NoActiveSession,

    #[error("OAuth2 authorization failed: {0}")]
    OAuthFailed(String),

    #[error("Invalid authorization code")]
    InvalidAuthCode,

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("State validation failed (possible CSRF attack)")]
    StateValidationFailed,

    #[error("OAuth callback timeout")]
    CallbackTimeout,

    #[error("User cancelled authentication")]
    UserCancelled,

    #[error("Callback server failed: {0}")]
    CallbackServer(String),

    #[error("Failed to open browser: {0}")]
    BrowserLaunch(String),
}

/// Directory API errors.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] AuthError),

    #[error("Graph API call failed: {status} {reason}")]
    Http {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("Graph API request failed: {0}")]
    Network(String),

    #[error("Failed to parse API response: {0}")]
    ParseFailed(String),

    #[error("Refusing to call endpoint outside the Graph base URL: {0}")]
    InvalidEndpoint(String),
}

impl ApiError {
    /// HTTP status code, if the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Report building, export and distribution errors.
#[derive(Error, Debug)]
pub enum ReportError {
    /// Missing or invalid operator input; raised before any network call.
    #[error("{0}")]
    Validation(String),

    #[error("Failed to write report: {0}")]
    Export(#[from] std::io::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// The user action an error surfaced from, used to pick the alert text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Login,
    Search,
    SendMail,
    Export,
}

impl AppError {
    /// Returns a user-friendly message for display in the console.
    ///
    /// Validation messages are shown verbatim; everything else gets a generic,
    /// action-specific alert. Details go to the log, not the operator.
    pub fn user_message(&self, action: Action) -> String {
        match self {
            Self::Report(ReportError::Validation(msg)) => msg.clone(),
            Self::Auth(AuthError::NoActiveSession)
            | Self::Api(ApiError::Session(AuthError::NoActiveSession))
            | Self::Report(ReportError::Api(ApiError::Session(AuthError::NoActiveSession))) => {
                "No active account. Please login first.".to_string()
            }
            Self::Auth(AuthError::UserCancelled) => "Sign-in was cancelled.".to_string(),
            Self::Auth(AuthError::CallbackTimeout) => {
                "Sign-in timed out. Please try again.".to_string()
            }
            _ if self.requires_sign_in() => "Session expired. Please login again.".to_string(),
            _ => match action {
                Action::Login => "Login failed.",
                Action::Search => "Failed to retrieve membership data.",
                Action::SendMail => "Failed to send the report. Please try again.",
                Action::Export => "Failed to write the report file.",
            }
            .to_string(),
        }
    }

    /// Returns true if the operator has to sign in (again) before retrying.
    pub fn requires_sign_in(&self) -> bool {
        let api = match self {
            Self::Auth(AuthError::NoActiveSession | AuthError::TokenRefreshFailed(_)) => {
                return true
            }
            Self::Api(e) | Self::Report(ReportError::Api(e)) => e,
            _ => return false,
        };

        matches!(
            api,
            ApiError::Session(AuthError::NoActiveSession | AuthError::TokenRefreshFailed(_))
        ) || api.status() == Some(401)
    }
}
