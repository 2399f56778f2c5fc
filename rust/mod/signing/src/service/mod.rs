pub mod binding;
pub mod corporate;
pub mod individual;
pub mod limiter;
pub mod link;
pub mod login_miss;
pub mod manager;
pub mod org_email;
pub mod privacy;
pub mod schema;
pub mod verification;

use std::sync::Arc;

use thiserror::Error;
use tracing::error;

use clasign_blob::{BlobError, BlobStore};
use clasign_core::{error_code, new_id, ServiceError};
use clasign_crypto::{
    AesGcmEncryption, Argon2Hasher, CorpIdDeriver, CryptoError, DigitCode, Encryption, HmacCorpId,
    PasswordHasher, RandomCode,
};
use clasign_kv::{KVError, KVStore};
use clasign_sql::{SQLError, SQLStore};

use crate::clock::{Clock, SystemClock};
use crate::service::limiter::Limiter;

/// Signing service error type.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("you have already signed")]
    AlreadySigned,

    #[error("the corporation already has an administrator")]
    DuplicateAdmin,

    #[error("manager id {0} is already taken")]
    DuplicateManagerId(String),

    #[error("denied: {0}")]
    Denied(String),

    #[error("too many attempts, try again after {until}")]
    Locked { until: i64 },

    #[error("validation: {0}")]
    Validation(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl From<SQLError> for SigningError {
    fn from(e: SQLError) -> Self {
        SigningError::Storage(e.to_string())
    }
}

impl From<KVError> for SigningError {
    fn from(e: KVError) -> Self {
        SigningError::Storage(e.to_string())
    }
}

impl From<BlobError> for SigningError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::NotFound(path) => SigningError::NotFound(format!("object {path}")),
            other => SigningError::Storage(other.to_string()),
        }
    }
}

impl From<CryptoError> for SigningError {
    fn from(e: CryptoError) -> Self {
        SigningError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for SigningError {
    fn from(e: serde_json::Error) -> Self {
        SigningError::Internal(e.to_string())
    }
}

impl From<SigningError> for ServiceError {
    fn from(e: SigningError) -> Self {
        match e {
            SigningError::NotFound(m) => ServiceError::NotFound(m),
            SigningError::AlreadyExists(m) => ServiceError::Conflict {
                code: error_code::ALREADY_EXISTS,
                message: m,
            },
            e @ SigningError::AlreadySigned => ServiceError::Conflict {
                code: error_code::ALREADY_SIGNED,
                message: e.to_string(),
            },
            e @ SigningError::DuplicateAdmin => ServiceError::Conflict {
                code: error_code::DUPLICATE_ADMIN,
                message: e.to_string(),
            },
            e @ SigningError::DuplicateManagerId(_) => ServiceError::Conflict {
                code: error_code::DUPLICATE_MANAGER_ID,
                message: e.to_string(),
            },
            SigningError::Denied(m) => ServiceError::Denied(m),
            SigningError::Locked { until } => ServiceError::Locked { until },
            SigningError::Validation(m) => ServiceError::Validation(m),
            SigningError::Storage(cause) | SigningError::Internal(cause) => {
                error!("signing system error: {cause}");
                ServiceError::System
            }
        }
    }
}

/// Configuration for the signing service.
#[derive(Debug, Clone)]
pub struct SigningConfig {
    /// Verification code lifetime in seconds (default: 5 min).
    pub code_ttl: u64,
    /// Minimum seconds between two codes for one (email, purpose). 0 disables.
    pub code_issue_interval: u64,
    /// Failed logins that trigger a lockout (default: 5).
    pub max_login_failures: i64,
    /// Lockout length in seconds (default: 30 min).
    pub lockout_penalty: u64,
    /// Managers (excluding the admin) per corporate signing.
    pub max_employee_managers: usize,
    /// Object-store prefix for corporate signing PDFs.
    pub pdf_prefix: String,
    /// Trailing labels an added email domain must share with the primary domain.
    pub min_shared_domain_labels: usize,
    /// Length of generated initial passwords.
    pub initial_password_len: usize,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            code_ttl: 300,                  // 5 min
            code_issue_interval: 60,        // 1 min
            max_login_failures: 5,
            lockout_penalty: 1800,          // 30 min
            max_employee_managers: 5,
            pdf_prefix: "corp-pdf".to_string(),
            min_shared_domain_labels: 2,
            initial_password_len: 12,
        }
    }
}

/// Crypto backends injected into the service.
#[derive(Clone)]
pub struct CryptoSuite {
    pub encryption: Arc<dyn Encryption>,
    pub corp_id: Arc<dyn CorpIdDeriver>,
    pub passwords: Arc<dyn PasswordHasher>,
    pub codes: Arc<dyn RandomCode>,
}

impl CryptoSuite {
    /// AES-GCM + HMAC corpID + argon2id + 6-digit codes from raw 32-byte keys.
    pub fn from_keys(encryption_key: &[u8], corp_id_key: &[u8]) -> Result<Self, SigningError> {
        Ok(Self {
            encryption: Arc::new(AesGcmEncryption::new(encryption_key)?),
            corp_id: Arc::new(HmacCorpId::new(corp_id_key)?),
            passwords: Arc::new(Argon2Hasher::default()),
            codes: Arc::new(DigitCode::default()),
        })
    }
}

/// The signing service. Holds storage backends, crypto and configuration.
///
/// Every operation is a short sequence of store calls; no in-process lock
/// is held between them. Uniqueness comes from conditional statements and
/// transactions in the SQL store.
pub struct SigningService {
    pub(crate) sql: Arc<dyn SQLStore>,
    pub(crate) blob: Arc<dyn BlobStore>,
    pub(crate) crypto: CryptoSuite,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) limiter: Limiter,
    pub(crate) config: SigningConfig,
    /// Verified against when a login names no account, so a miss costs the
    /// same as a wrong password.
    pub(crate) decoy_hash: String,
}

impl SigningService {
    /// Create a new SigningService on the system clock, initializing the DB schema.
    pub fn new(
        sql: Arc<dyn SQLStore>,
        kv: Arc<dyn KVStore>,
        blob: Arc<dyn BlobStore>,
        crypto: CryptoSuite,
        config: SigningConfig,
    ) -> Result<Arc<Self>, SigningError> {
        Self::with_clock(sql, kv, blob, crypto, config, Arc::new(SystemClock))
    }

    /// Like `new`, reading time from `clock`.
    pub fn with_clock(
        sql: Arc<dyn SQLStore>,
        kv: Arc<dyn KVStore>,
        blob: Arc<dyn BlobStore>,
        crypto: CryptoSuite,
        config: SigningConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, SigningError> {
        schema::init_schema(sql.as_ref())?;
        let limiter = Limiter::new(kv, Arc::clone(&clock));
        let decoy_hash = crypto.passwords.hash(&new_id())?;
        Ok(Arc::new(Self {
            sql,
            blob,
            crypto,
            clock,
            limiter,
            config,
            decoy_hash,
        }))
    }

    pub fn config(&self) -> &SigningConfig {
        &self.config
    }

    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }

    // ── Shared helpers ──

    pub(crate) fn now(&self) -> i64 {
        self.clock.now()
    }

    pub(crate) fn now_rfc3339(&self) -> String {
        crate::clock::rfc3339(self.now())
    }

    /// Deterministic ciphertext of a normalized email, used as the stored
    /// and queried form.
    pub(crate) fn seal_email(&self, email: &str) -> Result<String, SigningError> {
        Ok(self.crypto.encryption.encrypt_str_deterministic(email)?)
    }

    pub(crate) fn open_str(&self, cipher_hex: &str) -> Result<String, SigningError> {
        Ok(self.crypto.encryption.decrypt_str(cipher_hex)?)
    }

    /// Randomized encryption of a serializable value.
    pub(crate) fn seal_json<T: serde::Serialize>(&self, value: &T) -> Result<Vec<u8>, SigningError> {
        let json = serde_json::to_vec(value)?;
        Ok(self.crypto.encryption.encrypt(&json)?)
    }

    pub(crate) fn open_json<T: serde::de::DeserializeOwned>(
        &self,
        cipher: &[u8],
    ) -> Result<T, SigningError> {
        let json = self.crypto.encryption.decrypt(cipher)?;
        Ok(serde_json::from_slice(&json)?)
    }

    pub(crate) fn corp_id_of(&self, domain: &str) -> String {
        self.crypto.corp_id.corp_id(domain)
    }
}

/// A validated, lowercased email address and its domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EmailAddr {
    pub(crate) addr: String,
    pub(crate) domain: String,
}

impl EmailAddr {
    pub(crate) fn parse(raw: &str) -> Result<Self, SigningError> {
        let addr = raw.trim().to_ascii_lowercase();
        let invalid = || SigningError::Validation(format!("invalid email address: {raw:?}"));
        let (local, domain) = addr.split_once('@').ok_or_else(invalid)?;
        if local.is_empty() || !is_valid_domain(domain) {
            return Err(invalid());
        }
        let domain = domain.to_string();
        Ok(Self { addr, domain })
    }
}

/// At least two non-empty labels of letters, digits and hyphens.
pub(crate) fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|l| {
            !l.is_empty() && l.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

/// Map a unique-constraint violation to `on_conflict`, everything else to a
/// storage error.
pub(crate) fn conflict_or_storage(
    e: SQLError,
    on_conflict: impl FnOnce() -> SigningError,
) -> SigningError {
    if e.is_constraint() {
        on_conflict()
    } else {
        e.into()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use clasign_blob::FileStore;
    use clasign_kv::RedbStore;
    use clasign_sql::SqliteStore;

    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{
        ApplyTo, CorpSigningInput, CreateLink, CreateTemplate, NewBinding, OrgRepo, SigningInfo,
    };

    pub(crate) struct Harness {
        pub(crate) svc: Arc<SigningService>,
        pub(crate) clock: Arc<ManualClock>,
        _dir: tempfile::TempDir,
    }

    pub(crate) fn crypto() -> CryptoSuite {
        CryptoSuite {
            encryption: Arc::new(AesGcmEncryption::new(&[11u8; 32]).unwrap()),
            corp_id: Arc::new(HmacCorpId::new(&[22u8; 32]).unwrap()),
            passwords: Arc::new(Argon2Hasher::with_cost(64, 1).unwrap()),
            codes: Arc::new(DigitCode::default()),
        }
    }

    pub(crate) fn test_service_with(config: SigningConfig) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let sql = Arc::new(SqliteStore::open_in_memory().unwrap());
        let kv = Arc::new(RedbStore::open(&dir.path().join("kv.redb")).unwrap());
        let blob = Arc::new(FileStore::open(&dir.path().join("blobs")).unwrap());
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let svc =
            SigningService::with_clock(sql, kv, blob, crypto(), config, clock.clone()).unwrap();
        Harness {
            svc,
            clock,
            _dir: dir,
        }
    }

    pub(crate) fn test_service() -> Harness {
        test_service_with(SigningConfig::default())
    }

    /// A ready link for github/org/repo with an English individual and
    /// corporation binding.
    pub(crate) fn link_with_bindings(svc: &SigningService, repo: &str) -> String {
        let t = svc
            .create_template(CreateTemplate {
                title: "Apache-style CLA".into(),
                url: "https://example.com/cla.pdf".into(),
                content: format!("cla text for {repo}").into_bytes(),
            })
            .unwrap();
        let binding = |_: ApplyTo| NewBinding {
            template_id: t.id.clone(),
            language: "english".into(),
            fields: vec![],
            org_signature: None,
        };
        svc.create_link(CreateLink {
            org_repo: OrgRepo::new("github", "org", repo),
            org_alias: "Org".into(),
            org_email: "cla@org.io".into(),
            submitter: "owner".into(),
            individual_cla: Some(binding(ApplyTo::Individual)),
            corp_cla: Some(binding(ApplyTo::Corporation)),
            link_type: Default::default(),
        })
        .unwrap()
    }

    pub(crate) fn corp_input(admin: &str, corporation: &str) -> CorpSigningInput {
        CorpSigningInput {
            cla_language: "English".into(),
            admin_email: admin.into(),
            admin_name: "Alice Admin".into(),
            corporation_name: corporation.into(),
            date: "2024-03-01".into(),
            privacy_version: "v1".into(),
            info: SigningInfo::new(),
        }
    }
}
