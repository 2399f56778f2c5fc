use tracing::{info, warn};

use crate::model::IssuedCode;
use crate::notify::{EmailMessage, EmailSender};
use crate::service::{EmailAddr, SigningError, SigningService};

fn invalid_code() -> SigningError {
    SigningError::Denied("invalid verification code".into())
}

fn check_purpose(purpose: &str) -> Result<&str, SigningError> {
    let purpose = purpose.trim();
    if purpose.is_empty() {
        return Err(SigningError::Validation("code purpose is required".into()));
    }
    Ok(purpose)
}

/// The email carrying a verification code.
pub fn compose_code_email(to: &str, purpose: &str, code: &str, ttl: u64) -> EmailMessage {
    let minutes = ttl.div_ceil(60).max(1);
    EmailMessage {
        to: vec![to.to_string()],
        subject: format!("Verification code for {purpose}"),
        body: format!(
            "Your verification code is {code}.\n\n\
             It expires in {minutes} minute(s) and can be used once. \
             If you did not request it, ignore this email."
        ),
        attachment: None,
    }
}

impl SigningService {
    /// Issue a code for (email, purpose) valid for the configured TTL.
    pub fn issue_code(&self, email: &str, purpose: &str) -> Result<IssuedCode, SigningError> {
        self.issue_code_with_ttl(email, purpose, self.config.code_ttl)
    }

    /// Issue a code valid for `ttl` seconds. Any earlier code for the pair
    /// stops working; expired codes of every pair are purged on the way.
    pub fn issue_code_with_ttl(
        &self,
        email: &str,
        purpose: &str,
        ttl: u64,
    ) -> Result<IssuedCode, SigningError> {
        let email = EmailAddr::parse(email)?;
        let purpose = check_purpose(purpose)?;
        let email_ct = self.seal_email(&email.addr)?;

        let now = self.now();
        let expiry = i64::try_from(ttl)
            .ok()
            .and_then(|ttl| now.checked_add(ttl))
            .ok_or_else(|| SigningError::Validation(format!("code ttl {ttl} is out of range")))?;

        let throttle = format!("vc:{purpose}:{email_ct}");
        if !self.limiter.try_acquire(&throttle, self.config.code_issue_interval)? {
            return Err(SigningError::Denied(
                "a code was sent recently, try again later".into(),
            ));
        }

        let issued = IssuedCode {
            code: self.crypto.codes.new_code(),
            expiry,
        };
        // A code that was never stored must not hold the throttle slot.
        let purged = match self.store_code(&email_ct, purpose, &issued, now) {
            Ok(purged) => purged,
            Err(e) => {
                if let Err(release) = self.limiter.release(&throttle) {
                    warn!(purpose, "failed to release code throttle: {release}");
                }
                return Err(e);
            }
        };

        info!(purpose, expiry = issued.expiry, purged, "verification code issued");
        Ok(issued)
    }

    /// Replace the pair's code with `issued`, purging expired codes of
    /// every pair in the same transaction.
    fn store_code(
        &self,
        email_ct: &str,
        purpose: &str,
        issued: &IssuedCode,
        now: i64,
    ) -> Result<u64, SigningError> {
        let tx = self.sql.begin()?;
        tx.exec(
            "DELETE FROM verification_codes WHERE email = ?1 AND purpose = ?2",
            &[email_ct.into(), purpose.into()],
        )?;
        let purged = tx.exec(
            "DELETE FROM verification_codes WHERE expiry <= ?1",
            &[now.into()],
        )?;
        tx.exec(
            "INSERT INTO verification_codes (email, purpose, code, expiry, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            &[
                email_ct.into(),
                purpose.into(),
                issued.code.as_str().into(),
                issued.expiry.into(),
                self.now_rfc3339().into(),
            ],
        )?;
        tx.commit()?;
        Ok(purged)
    }

    /// Consume a code. Returns its expiry on success.
    ///
    /// The lookup and the delete are one statement, so a code is accepted
    /// at most once. Wrong, used and expired codes are indistinguishable to
    /// the caller.
    pub fn verify_code(&self, email: &str, purpose: &str, code: &str) -> Result<i64, SigningError> {
        let code = code.trim();
        if !self.crypto.codes.is_valid(code) {
            return Err(invalid_code());
        }
        let email = EmailAddr::parse(email)?;
        let purpose = check_purpose(purpose)?;

        let rows = self.sql.query(
            "DELETE FROM verification_codes WHERE email = ?1 AND purpose = ?2 AND code = ?3
             RETURNING expiry",
            &[
                self.seal_email(&email.addr)?.into(),
                purpose.into(),
                code.into(),
            ],
        )?;
        let expiry = rows
            .first()
            .and_then(|r| r.get_i64("expiry"))
            .ok_or_else(invalid_code)?;
        if expiry <= self.now() {
            return Err(invalid_code());
        }
        Ok(expiry)
    }

    /// Delete every expired code. Returns how many were deleted.
    pub fn purge_expired_codes(&self) -> Result<u64, SigningError> {
        let purged = self.sql.exec(
            "DELETE FROM verification_codes WHERE expiry <= ?1",
            &[self.now().into()],
        )?;
        if purged > 0 {
            info!(purged, "expired verification codes purged");
        }
        Ok(purged)
    }

    /// Issue a code and email it to `email`.
    pub fn send_verification_code(
        &self,
        sender: &dyn EmailSender,
        email: &str,
        purpose: &str,
    ) -> Result<IssuedCode, SigningError> {
        let issued = self.issue_code(email, purpose)?;
        let msg = compose_code_email(email.trim(), purpose, &issued.code, self.config.code_ttl);
        sender.send(&msg).map_err(|e| {
            warn!(purpose, "verification email not sent: {e}");
            SigningError::Internal(e.to_string())
        })?;
        Ok(issued)
    }
}
