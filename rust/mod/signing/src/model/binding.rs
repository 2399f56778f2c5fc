use serde::{Deserialize, Serialize};

/// Legal basis a CLA applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyTo {
    Individual,
    Corporation,
}

impl ApplyTo {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyTo::Individual => "individual",
            ApplyTo::Corporation => "corporation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "individual" => Some(ApplyTo::Individual),
            "corporation" => Some(ApplyTo::Corporation),
            _ => None,
        }
    }
}

/// One entry of a CLA's field schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// A CLA document. `content_hash` is the SHA-256 hex of the document bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaTemplate {
    pub id: String,
    pub title: String,
    pub url: String,
    pub content_hash: String,
    pub created_at: String,
}

/// Input for registering a CLA document.
#[derive(Debug, Clone)]
pub struct CreateTemplate {
    pub title: String,
    pub url: String,
    pub content: Vec<u8>,
}

/// Input for attaching a template to a link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBinding {
    pub template_id: String,
    pub language: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Organization counter-signature, if the CLA carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_signature: Option<Vec<u8>>,
}

/// A template attached to a link for one (apply_to, language).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaBinding {
    pub link_id: String,
    pub apply_to: ApplyTo,
    pub language: String,
    pub template_id: String,
    pub cla_hash: String,
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_signature: Option<Vec<u8>>,
}
