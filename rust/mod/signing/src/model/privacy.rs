use serde::{Deserialize, Serialize};

/// The privacy statement version a platform account last agreed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyConsent {
    pub account: String,
    pub platform: String,
    pub version: String,
    pub consented_at: String,
}
