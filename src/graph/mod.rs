//! Microsoft Graph access: the authenticated client and the payloads it carries.

pub mod client;
pub mod models;

pub use client::{get_json, ApiClient, DirectoryApi};
