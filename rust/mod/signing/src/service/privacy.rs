use tracing::info;

use crate::model::PrivacyConsent;
use crate::service::{SigningError, SigningService};

impl SigningService {
    /// Record that a platform account agreed to a privacy statement
    /// version. A later consent replaces the earlier one.
    pub fn record_privacy_consent(
        &self,
        account: &str,
        platform: &str,
        version: &str,
    ) -> Result<PrivacyConsent, SigningError> {
        let (account, platform, version) = (account.trim(), platform.trim(), version.trim());
        if account.is_empty() || platform.is_empty() {
            return Err(SigningError::Validation("account and platform are required".into()));
        }
        if version.is_empty() {
            return Err(SigningError::Validation("privacy version is required".into()));
        }
        let consented_at = self.now_rfc3339();
        self.sql.exec(
            "INSERT INTO privacy_consents (account, platform, version, consented_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (account, platform) DO UPDATE SET
                 version = excluded.version,
                 consented_at = excluded.consented_at",
            &[
                self.seal_email(account)?.into(),
                platform.into(),
                version.into(),
                consented_at.as_str().into(),
            ],
        )?;
        info!(platform, version, "privacy consent recorded");
        Ok(PrivacyConsent {
            account: account.to_string(),
            platform: platform.to_string(),
            version: version.to_string(),
            consented_at,
        })
    }

    /// The consent on record, if any.
    pub fn get_privacy_consent(
        &self,
        account: &str,
        platform: &str,
    ) -> Result<Option<PrivacyConsent>, SigningError> {
        let (account, platform) = (account.trim(), platform.trim());
        let rows = self.sql.query(
            "SELECT version, consented_at FROM privacy_consents
             WHERE account = ?1 AND platform = ?2",
            &[self.seal_email(account)?.into(), platform.into()],
        )?;
        Ok(rows.first().map(|row| PrivacyConsent {
            account: account.to_string(),
            platform: platform.to_string(),
            version: row.get_str("version").unwrap_or_default().to_string(),
            consented_at: row.get_str("consented_at").unwrap_or_default().to_string(),
        }))
    }

    /// Whether the account's consent is for `current`. A missing or older
    /// consent means the statement must be shown again.
    pub fn has_current_consent(
        &self,
        account: &str,
        platform: &str,
        current: &str,
    ) -> Result<bool, SigningError> {
        Ok(self
            .get_privacy_consent(account, platform)?
            .is_some_and(|c| c.version == current.trim()))
    }
}
