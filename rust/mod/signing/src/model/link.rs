use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::NewBinding;

/// A hosting-platform organization or repository. An empty `repo_id`
/// addresses the whole organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrgRepo {
    pub platform: String,
    pub org_id: String,
    #[serde(default)]
    pub repo_id: String,
}

impl OrgRepo {
    pub fn new(platform: &str, org_id: &str, repo_id: &str) -> Self {
        Self {
            platform: platform.to_string(),
            org_id: org_id.to_string(),
            repo_id: repo_id.to_string(),
        }
    }
}

impl fmt::Display for OrgRepo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.repo_id.is_empty() {
            write!(f, "{}/{}", self.platform, self.org_id)
        } else {
            write!(f, "{}/{}/{}", self.platform, self.org_id, self.repo_id)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Ready,
    Deleted,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Ready => "ready",
            LinkStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ready" => Some(LinkStatus::Ready),
            "deleted" => Some(LinkStatus::Deleted),
            _ => None,
        }
    }
}

/// What signers agree to under a link. DCO links carry individual
/// documents only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    #[default]
    Cla,
    Dco,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Cla => "cla",
            LinkType::Dco => "dco",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cla" => Some(LinkType::Cla),
            "dco" => Some(LinkType::Dco),
            _ => None,
        }
    }
}

/// Input for creating a link.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLink {
    pub org_repo: OrgRepo,
    #[serde(default)]
    pub link_type: LinkType,
    #[serde(default)]
    pub org_alias: String,
    /// Authorized organization email used as the sender for this link.
    #[serde(default)]
    pub org_email: String,
    pub submitter: String,
    /// Bindings attached in the same operation as the link itself.
    #[serde(default)]
    pub individual_cla: Option<NewBinding>,
    #[serde(default)]
    pub corp_cla: Option<NewBinding>,
}

/// Link projection without bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub link_id: String,
    pub org_repo: OrgRepo,
    pub link_type: LinkType,
    pub org_alias: String,
    pub org_email: String,
    pub submitter: String,
    pub status: LinkStatus,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}
