//! Server-side configuration file.
//!
//! ```toml
//! [storage]
//! data_dir = "/var/lib/clasign/prod"
//!
//! [crypto]
//! encryption_key = "<64 hex chars>"
//! corp_id_key = "<64 hex chars>"
//!
//! [signing]
//! code_ttl = 300
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use signing::SigningConfig;

/// Directory holding named configs, `<name>.toml`.
pub const CONFIG_DIR: &str = "/etc/clasign";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub signing: SigningSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

/// Both keys are 32 bytes, hex encoded. They must never change once data
/// has been written with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    pub encryption_key: String,
    pub corp_id_key: String,
}

/// Optional overrides of the signing defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_ttl: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_issue_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_login_failures: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lockout_penalty: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_employee_managers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_prefix: Option<String>,
}

impl ServerConfig {
    /// A bare name resolves to `/etc/clasign/<name>.toml`; anything with a
    /// `/` or `.` is used as a path.
    pub fn resolve_path(name_or_path: &str) -> PathBuf {
        if name_or_path.contains('/') || name_or_path.contains('.') {
            PathBuf::from(name_or_path)
        } else {
            PathBuf::from(CONFIG_DIR).join(format!("{name_or_path}.toml"))
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn signing_config(&self) -> SigningConfig {
        let defaults = SigningConfig::default();
        let s = &self.signing;
        SigningConfig {
            code_ttl: s.code_ttl.unwrap_or(defaults.code_ttl),
            code_issue_interval: s.code_issue_interval.unwrap_or(defaults.code_issue_interval),
            max_login_failures: s.max_login_failures.unwrap_or(defaults.max_login_failures),
            lockout_penalty: s.lockout_penalty.unwrap_or(defaults.lockout_penalty),
            max_employee_managers: s
                .max_employee_managers
                .unwrap_or(defaults.max_employee_managers),
            pdf_prefix: s.pdf_prefix.clone().unwrap_or(defaults.pdf_prefix),
            ..defaults
        }
    }
}
