//! Emailing the displayed report through the signed-in mailbox.

use reqwest::Method;
use tracing::info;

use super::html;
use crate::error::{ApiError, ReportError};
use crate::graph::models::SendMailRequest;
use crate::graph::DirectoryApi;
use crate::report::Report;

const SEND_MAIL_ENDPOINT: &str = "/me/sendMail";

/// Check the recipient and the report before anything is sent.
pub fn validate(recipient: &str, report: &Report) -> Result<String, ReportError> {
    let recipient = recipient.trim();
    if recipient.is_empty() {
        return Err(ReportError::Validation(
            "Please enter a valid recipient email.".to_string(),
        ));
    }

    let plausible = recipient
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
    if !plausible {
        return Err(ReportError::Validation(format!(
            "\"{}\" is not an email address. Use the form name@domain.",
            recipient
        )));
    }

    if report.is_empty() {
        return Err(ReportError::Validation(
            "No data to send. Please retrieve and display user details first.".to_string(),
        ));
    }

    Ok(recipient.to_string())
}

/// Build the sendMail payload for `report`.
pub fn compose(report: &Report, subject: &str, recipient: &str) -> SendMailRequest {
    SendMailRequest::html(subject, html::mail_body(report), recipient)
}

/// Send `report` to `recipient`. Validation failures make no network call.
pub async fn send_report(
    api: &dyn DirectoryApi,
    report: &Report,
    subject: &str,
    recipient: &str,
) -> Result<(), ReportError> {
    let recipient = validate(recipient, report)?;

    let payload = serde_json::to_value(compose(report, subject, &recipient))
        .map_err(|e| ApiError::ParseFailed(e.to_string()))?;
    api.request(Method::POST, SEND_MAIL_ENDPOINT, Some(payload))
        .await?;

    info!("Report with {} rows sent to {}", report.len(), recipient);
    Ok(())
}
