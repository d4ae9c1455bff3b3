//! Azure AD authentication module.
//!
//! Provides OAuth2 with PKCE sign-in through a loopback callback server and the
//! token provider that owns the operator's session.

pub mod callback_server;
pub mod oauth;
pub mod secure;
pub mod token_provider;

pub use token_provider::{Account, TokenProvider, TokenSource};
