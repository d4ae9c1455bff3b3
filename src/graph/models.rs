//! Microsoft Graph payloads used by the report builder and mail sender.
//!
//! Every field Graph may omit is optional; the report layer decides how
//! absent values are shown.

use serde::{Deserialize, Serialize};

/// A page of a Graph collection.
#[derive(Debug, Clone, Deserialize)]
pub struct Collection<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,

    /// Absolute URL of the next page, if any.
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// The signed-in operator as returned by `/me`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: Option<String>,
    pub user_principal_name: Option<String>,
    pub mail: Option<String>,
    pub job_title: Option<String>,
}

/// A user as returned by `/users?$select=userPrincipalName`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_principal_name: Option<String>,
}

/// A directory object from `/users/{id}/memberOf`.
///
/// `memberOf` can also return directory roles and administrative units; they
/// carry a display name but no group types.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipGroup {
    pub display_name: Option<String>,
    pub group_types: Option<Vec<String>>,
}

/// A group with its expanded members.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub display_name: Option<String>,
    pub group_types: Option<Vec<String>>,
    pub members: Option<Vec<Member>>,
}

/// First group type, e.g. "Unified" or "DynamicMembership".
pub fn first_group_type(group_types: &Option<Vec<String>>) -> Option<String> {
    group_types.as_ref().and_then(|types| types.first().cloned())
}

/// A member projected to principal name and mail.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub user_principal_name: Option<String>,
    pub mail: Option<String>,
}

/// Body of `POST /me/sendMail`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMailRequest {
    pub message: MailMessage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailMessage {
    pub subject: String,
    pub body: MailBody,
    pub to_recipients: Vec<Recipient>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailBody {
    pub content_type: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email_address: EmailAddress,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailAddress {
    pub address: String,
}

impl SendMailRequest {
    /// An HTML message to a single recipient.
    pub fn html(subject: &str, content: String, recipient: &str) -> Self {
        Self {
            message: MailMessage {
                subject: subject.to_string(),
                body: MailBody {
                    content_type: "HTML".to_string(),
                    content,
                },
                to_recipients: vec![Recipient {
                    email_address: EmailAddress {
                        address: recipient.to_string(),
                    },
                }],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_with_next_link() {
        let page: Collection<User> = serde_json::from_value(json!({
            "@odata.context": "https://graph.microsoft.com/v1.0/$metadata#users(userPrincipalName)",
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/users?$skiptoken=X",
            "value": [{"userPrincipalName": "a@contoso.com"}, {}]
        }))
        .unwrap();

        assert_eq!(page.value.len(), 2);
        assert_eq!(page.value[1].user_principal_name, None);
        assert!(page.next_link.unwrap().ends_with("$skiptoken=X"));
    }

    #[test]
    fn test_collection_without_value() {
        let page: Collection<Group> = serde_json::from_value(json!({})).unwrap();
        assert!(page.value.is_empty());
        assert!(page.next_link.is_none());
    }

    #[test]
    fn test_profile_fields() {
        let profile: Profile = serde_json::from_value(json!({
            "displayName": "Ada Admin",
            "userPrincipalName": "ada@contoso.com",
            "mail": null
        }))
        .unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Ada Admin"));
        assert!(profile.mail.is_none());
        assert!(profile.job_title.is_none());
    }

    #[test]
    fn test_first_group_type() {
        assert_eq!(
            first_group_type(&Some(vec!["Unified".into(), "DynamicMembership".into()])),
            Some("Unified".to_string())
        );
        assert_eq!(first_group_type(&Some(vec![])), None);
        assert_eq!(first_group_type(&None), None);
    }

    #[test]
    fn test_send_mail_payload_shape() {
        let request = SendMailRequest::html("Subject", "<p>Hi</p>".into(), "ops@contoso.com");
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "message": {
                    "subject": "Subject",
                    "body": {"contentType": "HTML", "content": "<p>Hi</p>"},
                    "toRecipients": [{"emailAddress": {"address": "ops@contoso.com"}}]
                }
            })
        );
    }
}
