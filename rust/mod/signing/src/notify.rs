//! Collaborator interfaces. The core produces messages and consumes tokens;
//! delivery and the OAuth2 dance live outside this crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("email delivery failed: {0}")]
    Email(String),

    #[error("oauth2 exchange failed: {0}")]
    OAuth(String),
}

/// An outbound email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub content: Vec<u8>,
}

/// Outbound email delivery.
pub trait EmailSender: Send + Sync {
    fn send(&self, msg: &EmailMessage) -> Result<(), CollaboratorError>;
}

/// Result of an OAuth2 code exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Unix seconds; 0 when the provider does not say.
    #[serde(default)]
    pub expiry: i64,
    /// Authorized organization email reported by the provider.
    pub email: String,
}

/// An OAuth2 provider used to authorize an organization email.
pub trait OAuth2Provider: Send + Sync {
    /// Platform identifier, e.g. `gmail`.
    fn platform(&self) -> &str;

    /// URL the user is redirected to, carrying `state`.
    fn code_url(&self, state: &str) -> String;

    fn exchange(&self, code: &str) -> Result<OAuthToken, CollaboratorError>;
}
