use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::ManagerSummary;

/// Free-form answers to a CLA's fields, keyed by field id.
pub type SigningInfo = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningKind {
    Individual,
    /// Signed by an employee of a corporation that holds a corporate signing.
    Employee,
    /// An enabled employee signing under a live corporate signing that
    /// approves the email's domain.
    Corporation,
}

impl SigningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningKind::Individual => "individual",
            SigningKind::Employee => "employee",
            SigningKind::Corporation => "corporation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "individual" => Some(SigningKind::Individual),
            "employee" => Some(SigningKind::Employee),
            "corporation" => Some(SigningKind::Corporation),
            _ => None,
        }
    }
}

/// Input for an individual or employee signature.
#[derive(Debug, Clone, Deserialize)]
pub struct IndividualSigningInput {
    pub email: String,
    pub name: String,
    pub date: String,
    pub cla_language: String,
    /// Privacy statement version the signer agreed to.
    #[serde(default)]
    pub privacy_version: String,
    #[serde(default)]
    pub info: SigningInfo,
}

/// A stored individual or employee signature, decrypted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndividualSigning {
    pub link_id: String,
    pub email: String,
    pub name: String,
    pub date: String,
    pub kind: SigningKind,
    pub enabled: bool,
    pub cla_language: String,
    pub cla_hash: String,
    /// Corporate signing an employee signed under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corp_signing_id: Option<String>,
    pub privacy_version: String,
    pub info: SigningInfo,
}

/// Listing projection. Answers are never included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndividualSummary {
    pub email: String,
    pub name: String,
    pub date: String,
    pub kind: SigningKind,
    pub enabled: bool,
    pub cla_language: String,
}

#[derive(Debug, Clone, Default)]
pub struct IndividualFilter {
    pub kind: Option<SigningKind>,
    pub cla_language: Option<String>,
    pub enabled: Option<bool>,
    /// Only signers whose email is in this domain.
    pub email_domain: Option<String>,
}

/// Input for a corporate signature.
#[derive(Debug, Clone, Deserialize)]
pub struct CorpSigningInput {
    pub cla_language: String,
    pub admin_email: String,
    pub admin_name: String,
    pub corporation_name: String,
    pub date: String,
    #[serde(default)]
    pub privacy_version: String,
    #[serde(default)]
    pub info: SigningInfo,
}

/// Returned by a successful corporate signature. The initial password is
/// only ever available here.
#[derive(Debug, Clone)]
pub struct CorpSigningCreated {
    pub signing_id: String,
    pub admin_id: String,
    pub initial_password: String,
}

/// A stored corporate signing, decrypted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpSigning {
    pub id: String,
    pub link_id: String,
    pub cla_language: String,
    pub cla_hash: String,
    pub admin_email: String,
    pub admin_name: String,
    pub corporation_name: String,
    pub date: String,
    pub privacy_version: String,
    pub info: SigningInfo,
    /// Primary domain first.
    pub email_domains: Vec<String>,
    pub pdf_uploaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<ManagerSummary>,
}

/// Listing projection. Answers are never included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpSigningSummary {
    pub id: String,
    pub cla_language: String,
    pub admin_email: String,
    pub admin_name: String,
    pub corporation_name: String,
    pub date: String,
    pub pdf_uploaded: bool,
    pub admin_added: bool,
}
