use tracing::info;

use crate::model::OrgEmail;
use crate::notify::{OAuth2Provider, OAuthToken};
use crate::service::{EmailAddr, SigningError, SigningService};

impl SigningService {
    /// Store or replace the OAuth2 token of an organization email. The token
    /// is encrypted at rest.
    pub fn save_org_email(
        &self,
        email: &str,
        platform: &str,
        token: &OAuthToken,
    ) -> Result<(), SigningError> {
        let email = EmailAddr::parse(email)?;
        if platform.trim().is_empty() {
            return Err(SigningError::Validation("platform is required".into()));
        }
        let now = self.now_rfc3339();
        self.sql.exec(
            "INSERT INTO org_emails (email, platform, token, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (email) DO UPDATE SET
                 platform = excluded.platform,
                 token = excluded.token,
                 updated_at = excluded.updated_at",
            &[
                self.seal_email(&email.addr)?.into(),
                platform.trim().into(),
                self.seal_json(token)?.into(),
                now.into(),
            ],
        )?;
        info!(platform, "org email saved");
        Ok(())
    }

    pub fn get_org_email(&self, email: &str) -> Result<OrgEmail, SigningError> {
        let email = EmailAddr::parse(email)?;
        let rows = self.sql.query(
            "SELECT platform, token FROM org_emails WHERE email = ?1",
            &[self.seal_email(&email.addr)?.into()],
        )?;
        let row = rows
            .first()
            .ok_or_else(|| SigningError::NotFound(format!("org email {}", email.addr)))?;
        Ok(OrgEmail {
            platform: row.get_str("platform").unwrap_or_default().to_string(),
            token: self.open_json(row.get_blob("token").unwrap_or_default())?,
            email: email.addr,
        })
    }

    /// Finish an OAuth2 authorization: exchange `code` and save the token
    /// under the email the provider reports.
    pub fn authorize_org_email(
        &self,
        provider: &dyn OAuth2Provider,
        code: &str,
    ) -> Result<OrgEmail, SigningError> {
        let token = provider
            .exchange(code)
            .map_err(|e| SigningError::Denied(e.to_string()))?;
        self.save_org_email(&token.email, provider.platform(), &token)?;
        self.get_org_email(&token.email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::CollaboratorError;
    use crate::service::testing::test_service;

    fn token(access: &str) -> OAuthToken {
        OAuthToken {
            access_token: access.into(),
            refresh_token: "refresh".into(),
            expiry: 1_700_003_600,
            email: "cla@org.io".into(),
        }
    }

    struct FakeProvider;

    impl OAuth2Provider for FakeProvider {
        fn platform(&self) -> &str {
            "gmail"
        }

        fn code_url(&self, state: &str) -> String {
            format!("https://accounts.example.com/auth?state={state}")
        }

        fn exchange(&self, code: &str) -> Result<OAuthToken, CollaboratorError> {
            if code == "good" {
                Ok(token("from-exchange"))
            } else {
                Err(CollaboratorError::OAuth("bad code".into()))
            }
        }
    }

    #[test]
    fn save_get_and_replace() {
        let h = test_service();
        h.svc.save_org_email("CLA@org.io", "gmail", &token("t1")).unwrap();
        h.svc.save_org_email("cla@org.io", "gmail", &token("t2")).unwrap();

        let got = h.svc.get_org_email("cla@org.io").unwrap();
        assert_eq!(got.email, "cla@org.io");
        assert_eq!(got.token.access_token, "t2");

        let rows = h.svc.sql.query("SELECT token FROM org_emails", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!String::from_utf8_lossy(rows[0].get_blob("token").unwrap()).contains("t2"));
    }

    #[test]
    fn missing_org_email() {
        let h = test_service();
        assert!(matches!(
            h.svc.get_org_email("nobody@org.io"),
            Err(SigningError::NotFound(_))
        ));
    }

    #[test]
    fn authorize_through_provider() {
        let h = test_service();
        let saved = h.svc.authorize_org_email(&FakeProvider, "good").unwrap();
        assert_eq!(saved.platform, "gmail");
        assert_eq!(saved.token.access_token, "from-exchange");
        assert!(FakeProvider.code_url("s1").ends_with("state=s1"));
        assert!(matches!(
            h.svc.authorize_org_email(&FakeProvider, "bad"),
            Err(SigningError::Denied(_))
        ));
    }
}
