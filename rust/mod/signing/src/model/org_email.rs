use serde::{Deserialize, Serialize};

use crate::notify::OAuthToken;

/// An organization email authorized through an OAuth2 provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgEmail {
    pub email: String,
    pub platform: String,
    pub token: OAuthToken,
}
