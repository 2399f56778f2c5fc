use serde::{Deserialize, Serialize};
use tracing::info;

use clasign_sql::{Row, SQLExecutor, Value};

use crate::model::{
    IndividualFilter, IndividualSigning, IndividualSigningInput, IndividualSummary, SigningInfo,
    SigningKind,
};
use crate::service::binding::normalize_language;
use crate::service::{conflict_or_storage, EmailAddr, SigningError, SigningService};

/// Encrypted part of an individual signing row.
#[derive(Serialize, Deserialize)]
struct IndividualPii {
    name: String,
    #[serde(default)]
    info: SigningInfo,
}

const COLUMNS: &str = "link_id, email, corp_id, kind, enabled, cla_language, cla_hash, date, \
     corp_signing_id, privacy_version, pii";

/// Approved domain of a live corporate signing under the link (?1) matching
/// the corpID (?3).
const CORP_COVERS_DOMAIN: &str = "SELECT d.signing_id FROM corp_email_domains d
    JOIN corp_signings c ON c.id = d.signing_id
    WHERE c.link_id = ?1 AND c.link_status = 'ready' AND d.corp_id = ?3";

/// Every signature carries the privacy statement version agreed to.
pub(crate) fn require_privacy(version: &str) -> Result<&str, SigningError> {
    let version = version.trim();
    if version.is_empty() {
        return Err(SigningError::Validation(
            "must agree to the privacy statement".into(),
        ));
    }
    Ok(version)
}

impl SigningService {
    /// Record an individual signature. At most one per (link, email): the
    /// duplicate check and the insert are a single statement.
    ///
    /// Refused when a corporation has signed for the email's domain; those
    /// signers go through `sign_employee`.
    pub fn sign_individual(
        &self,
        link_id: &str,
        input: IndividualSigningInput,
    ) -> Result<(), SigningError> {
        self.sign_as(link_id, input, SigningKind::Individual)
    }

    /// Record an employee signature under the corporate signing that
    /// approved the email's domain. Employee signings start disabled until a
    /// corporate manager enables them.
    pub fn sign_employee(
        &self,
        link_id: &str,
        input: IndividualSigningInput,
    ) -> Result<(), SigningError> {
        self.sign_as(link_id, input, SigningKind::Employee)
    }

    fn sign_as(
        &self,
        link_id: &str,
        input: IndividualSigningInput,
        kind: SigningKind,
    ) -> Result<(), SigningError> {
        let email = EmailAddr::parse(&input.email)?;
        if input.name.trim().is_empty() {
            return Err(SigningError::Validation("name is required".into()));
        }
        let language = normalize_language(&input.cla_language)?;
        let privacy_version = require_privacy(&input.privacy_version)?;
        let email_ct = self.seal_email(&email.addr)?;
        let corp_id = self.corp_id_of(&email.domain);
        let pii = self.seal_json(&IndividualPii {
            name: input.name,
            info: input.info,
        })?;

        let sql = match kind {
            SigningKind::Employee => format!(
                "INSERT INTO individual_signings ({COLUMNS}, link_status, created_at)
                 SELECT l.id, ?2, ?3, 'employee', 0, b.language, b.cla_hash, ?4,
                        ({CORP_COVERS_DOMAIN} ORDER BY c.created_at LIMIT 1), ?8, ?5, 'ready', ?6
                 FROM links l
                 JOIN cla_bindings b ON b.link_id = l.id AND b.apply_to = 'individual' AND b.language = ?7
                 WHERE l.id = ?1 AND l.status = 'ready'
                   AND NOT EXISTS (
                       SELECT 1 FROM individual_signings s
                       WHERE s.link_id = ?1 AND s.corp_id = ?3 AND s.email = ?2
                   )
                   AND EXISTS ({CORP_COVERS_DOMAIN})"
            ),
            _ => format!(
                "INSERT INTO individual_signings ({COLUMNS}, link_status, created_at)
                 SELECT l.id, ?2, ?3, 'individual', 1, b.language, b.cla_hash, ?4, NULL, ?8, ?5, 'ready', ?6
                 FROM links l
                 JOIN cla_bindings b ON b.link_id = l.id AND b.apply_to = 'individual' AND b.language = ?7
                 WHERE l.id = ?1 AND l.status = 'ready'
                   AND NOT EXISTS (
                       SELECT 1 FROM individual_signings s
                       WHERE s.link_id = ?1 AND s.corp_id = ?3 AND s.email = ?2
                   )
                   AND NOT EXISTS ({CORP_COVERS_DOMAIN})"
            ),
        };

        let params = [
            Value::from(link_id),
            email_ct.as_str().into(),
            corp_id.as_str().into(),
            input.date.as_str().into(),
            pii.into(),
            self.now_rfc3339().into(),
            language.as_str().into(),
            privacy_version.into(),
        ];
        let inserted = self
            .sql
            .exec(&sql, &params)
            .map_err(|e| conflict_or_storage(e, || SigningError::AlreadySigned))?;
        if inserted == 1 {
            info!(link_id, kind = kind.as_str(), "individual signing created");
            return Ok(());
        }

        // Nothing inserted: report the first predicate that failed.
        let db = self.sql.as_ref();
        self.ensure_ready_link(db, link_id)?;
        let binding = db.query(
            "SELECT 1 AS x FROM cla_bindings WHERE link_id = ?1 AND apply_to = 'individual' AND language = ?2",
            &[link_id.into(), language.as_str().into()],
        )?;
        if binding.is_empty() {
            return Err(SigningError::NotFound(format!(
                "individual cla for language {language}"
            )));
        }
        let signed = db.query(
            "SELECT 1 AS x FROM individual_signings WHERE link_id = ?1 AND email = ?2",
            &[link_id.into(), email_ct.as_str().into()],
        )?;
        if !signed.is_empty() {
            return Err(SigningError::AlreadySigned);
        }
        Err(match kind {
            SigningKind::Employee => SigningError::NotFound(format!(
                "corporation signing for domain {}",
                email.domain
            )),
            _ => SigningError::Validation(format!(
                "a corporation has signed for {}, sign as an employee",
                email.domain
            )),
        })
    }

    /// Whether `email` has signed under the link as `kind`.
    ///
    /// `Individual` and `Employee` hold while the record exists, enabled or
    /// not. `Corporation` needs an enabled employee signing and a live
    /// corporate signing that still approves the email's domain.
    pub fn is_signed(
        &self,
        link_id: &str,
        email: &str,
        kind: SigningKind,
    ) -> Result<bool, SigningError> {
        let email = EmailAddr::parse(email)?;
        let mut params = vec![
            Value::from(link_id),
            self.seal_email(&email.addr)?.into(),
            self.corp_id_of(&email.domain).into(),
        ];
        let sql = match kind {
            SigningKind::Corporation => format!(
                "SELECT 1 AS x FROM individual_signings
                 WHERE link_id = ?1 AND email = ?2 AND kind = 'employee' AND enabled = 1
                   AND link_status = 'ready'
                   AND corp_signing_id IN ({CORP_COVERS_DOMAIN})"
            ),
            _ => {
                params.push(kind.as_str().into());
                "SELECT 1 AS x FROM individual_signings
                 WHERE link_id = ?1 AND email = ?2 AND corp_id = ?3 AND kind = ?4
                   AND link_status = 'ready'"
                    .to_string()
            }
        };
        let rows = self.sql.query(&sql, &params)?;
        Ok(!rows.is_empty())
    }

    /// Get the signing of `email` under a live link.
    pub fn get_individual(
        &self,
        link_id: &str,
        email: &str,
    ) -> Result<IndividualSigning, SigningError> {
        let email = EmailAddr::parse(email)?;
        let rows = self.sql.query(
            &format!(
                "SELECT {COLUMNS} FROM individual_signings
                 WHERE link_id = ?1 AND email = ?2 AND link_status = 'ready'"
            ),
            &[link_id.into(), self.seal_email(&email.addr)?.into()],
        )?;
        let row = rows
            .first()
            .ok_or_else(|| SigningError::NotFound(format!("signing of {}", email.addr)))?;
        let pii: IndividualPii = self.open_json(row.get_blob("pii").unwrap_or_default())?;
        let text = |col: &str| row.get_str(col).unwrap_or_default().to_string();
        Ok(IndividualSigning {
            link_id: text("link_id"),
            email: email.addr,
            name: pii.name,
            date: text("date"),
            kind: parse_kind(row)?,
            enabled: row.get_bool("enabled").unwrap_or(false),
            cla_language: text("cla_language"),
            cla_hash: text("cla_hash"),
            corp_signing_id: row.get_str("corp_signing_id").map(str::to_string),
            privacy_version: text("privacy_version"),
            info: pii.info,
        })
    }

    pub fn disable(&self, link_id: &str, email: &str) -> Result<(), SigningError> {
        self.set_enabled(link_id, email, false)
    }

    pub fn enable(&self, link_id: &str, email: &str) -> Result<(), SigningError> {
        self.set_enabled(link_id, email, true)
    }

    /// Single-row update; setting the current state again is a no-op.
    fn set_enabled(&self, link_id: &str, email: &str, enabled: bool) -> Result<(), SigningError> {
        let email = EmailAddr::parse(email)?;
        let matched = self.sql.exec(
            "UPDATE individual_signings SET enabled = ?3
             WHERE link_id = ?1 AND email = ?2 AND link_status = 'ready'",
            &[
                link_id.into(),
                self.seal_email(&email.addr)?.into(),
                enabled.into(),
            ],
        )?;
        if matched == 0 {
            return Err(SigningError::NotFound(format!("signing of {}", email.addr)));
        }
        info!(link_id, enabled, "individual signing toggled");
        Ok(())
    }

    /// Move a signing into the archive. Copy, delete and the check that the
    /// live row is gone all commit together or not at all.
    pub fn delete_individual(&self, link_id: &str, email: &str) -> Result<(), SigningError> {
        let email = EmailAddr::parse(email)?;
        let email_ct = self.seal_email(&email.addr)?;
        let now = self.now_rfc3339();

        let tx = self.sql.begin()?;
        let copied = tx.exec(
            &format!(
                "INSERT INTO individual_signings_deleted ({COLUMNS}, created_at, deleted_at)
                 SELECT {COLUMNS}, created_at, ?3 FROM individual_signings
                 WHERE link_id = ?1 AND email = ?2 AND link_status = 'ready'"
            ),
            &[link_id.into(), email_ct.as_str().into(), now.into()],
        )?;
        if copied == 0 {
            return Err(SigningError::NotFound(format!("signing of {}", email.addr)));
        }
        tx.exec(
            "DELETE FROM individual_signings WHERE link_id = ?1 AND email = ?2",
            &[link_id.into(), email_ct.as_str().into()],
        )?;
        let remaining = tx.query(
            "SELECT 1 AS x FROM individual_signings WHERE link_id = ?1 AND email = ?2",
            &[link_id.into(), email_ct.as_str().into()],
        )?;
        if !remaining.is_empty() {
            return Err(SigningError::Internal("live signing survived delete".into()));
        }
        tx.commit()?;

        info!(link_id, "individual signing archived");
        Ok(())
    }

    /// Archive and delete the employee signings made under a corporate
    /// signing. Runs inside the caller's transaction.
    pub(crate) fn archive_employees(
        &self,
        db: &(impl SQLExecutor + ?Sized),
        corp_signing_id: &str,
        now: &str,
    ) -> Result<u64, SigningError> {
        let copied = db.exec(
            &format!(
                "INSERT INTO individual_signings_deleted ({COLUMNS}, created_at, deleted_at)
                 SELECT {COLUMNS}, created_at, ?2 FROM individual_signings
                 WHERE corp_signing_id = ?1 AND kind = 'employee'"
            ),
            &[corp_signing_id.into(), now.into()],
        )?;
        let deleted = db.exec(
            "DELETE FROM individual_signings WHERE corp_signing_id = ?1 AND kind = 'employee'",
            &[corp_signing_id.into()],
        )?;
        if copied != deleted {
            return Err(SigningError::Internal(format!(
                "archived {copied} employee signings but deleted {deleted}"
            )));
        }
        Ok(deleted)
    }

    /// Least-disclosure listing of a live link's individual signings.
    pub fn list_individual(
        &self,
        link_id: &str,
        filter: &IndividualFilter,
    ) -> Result<Vec<IndividualSummary>, SigningError> {
        let mut clauses = vec!["link_id = ?1".to_string(), "link_status = 'ready'".to_string()];
        let mut params: Vec<Value> = vec![link_id.into()];
        let mut push = |clause: &str, value: Value| {
            params.push(value);
            clauses.push(format!("{clause} = ?{}", params.len()));
        };
        if let Some(kind) = filter.kind {
            push("kind", kind.as_str().into());
        }
        if let Some(ref language) = filter.cla_language {
            push("cla_language", normalize_language(language)?.into());
        }
        if let Some(enabled) = filter.enabled {
            push("enabled", enabled.into());
        }
        if let Some(ref domain) = filter.email_domain {
            push("corp_id", self.corp_id_of(domain).into());
        }

        let sql = format!(
            "SELECT {COLUMNS} FROM individual_signings WHERE {} ORDER BY created_at, email",
            clauses.join(" AND ")
        );
        self.sql
            .query(&sql, &params)?
            .iter()
            .map(|row| -> Result<IndividualSummary, SigningError> {
                let pii: IndividualPii = self.open_json(row.get_blob("pii").unwrap_or_default())?;
                Ok(IndividualSummary {
                    email: self.open_str(row.get_str("email").unwrap_or_default())?,
                    name: pii.name,
                    date: row.get_str("date").unwrap_or_default().to_string(),
                    kind: parse_kind(row)?,
                    enabled: row.get_bool("enabled").unwrap_or(false),
                    cla_language: row.get_str("cla_language").unwrap_or_default().to_string(),
                })
            })
            .collect()
    }
}

fn parse_kind(row: &Row) -> Result<SigningKind, SigningError> {
    row.get_str("kind")
        .and_then(SigningKind::parse)
        .ok_or_else(|| SigningError::Internal("signing row has invalid kind".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{link_with_bindings, test_service};

    fn input(email: &str) -> IndividualSigningInput {
        let mut info = SigningInfo::new();
        info.insert("address".into(), "1 Main St".into());
        IndividualSigningInput {
            email: email.into(),
            name: "Alice".into(),
            date: "2024-03-01".into(),
            cla_language: "english".into(),
            privacy_version: "v1".into(),
            info,
        }
    }

    fn summary_count(svc: &SigningService, link: &str) -> usize {
        svc.list_individual(link, &IndividualFilter::default()).unwrap().len()
    }

    #[test]
    fn sign_and_get() {
        let h = test_service();
        let link = link_with_bindings(&h.svc, "r");
        h.svc.sign_individual(&link, input("Alice@Corp.com")).unwrap();

        let s = h.svc.get_individual(&link, "alice@corp.com").unwrap();
        assert_eq!(s.email, "alice@corp.com");
        assert_eq!(s.name, "Alice");
        assert_eq!(s.kind, SigningKind::Individual);
        assert!(s.enabled);
        assert_eq!(s.info.get("address").map(String::as_str), Some("1 Main St"));
        assert_eq!(s.cla_hash.len(), 64);
        assert_eq!(s.privacy_version, "v1");
        assert!(h.svc.is_signed(&link, "alice@corp.com", SigningKind::Individual).unwrap());
        assert!(!h.svc.is_signed(&link, "alice@corp.com", SigningKind::Employee).unwrap());
    }

    #[test]
    fn pii_is_not_stored_in_clear() {
        let h = test_service();
        let link = link_with_bindings(&h.svc, "r");
        h.svc.sign_individual(&link, input("alice@corp.com")).unwrap();
        let rows = h.svc.sql.query("SELECT email, corp_id, pii FROM individual_signings", &[]).unwrap();
        let email = rows[0].get_str("email").unwrap();
        let corp_id = rows[0].get_str("corp_id").unwrap();
        let pii = rows[0].get_blob("pii").unwrap();
        assert!(!email.contains("alice"));
        assert!(!corp_id.contains("corp.com"));
        assert!(!String::from_utf8_lossy(pii).contains("Alice"));
    }

    #[test]
    fn second_sign_is_already_signed() {
        let h = test_service();
        let link = link_with_bindings(&h.svc, "r");
        h.svc.sign_individual(&link, input("a@corp.com")).unwrap();
        assert!(matches!(
            h.svc.sign_individual(&link, input("A@corp.com")),
            Err(SigningError::AlreadySigned)
        ));
        assert_eq!(summary_count(&h.svc, &link), 1);
    }

    #[test]
    fn sign_requires_binding_for_language() {
        let h = test_service();
        let link = link_with_bindings(&h.svc, "r");
        let mut i = input("a@corp.com");
        i.cla_language = "chinese".into();
        assert!(matches!(
            h.svc.sign_individual(&link, i),
            Err(SigningError::NotFound(m)) if m.contains("chinese")
        ));
    }

    #[test]
    fn sign_rejects_bad_input() {
        let h = test_service();
        let link = link_with_bindings(&h.svc, "r");
        assert!(matches!(
            h.svc.sign_individual(&link, input("not-an-email")),
            Err(SigningError::Validation(_))
        ));
        let mut i = input("a@corp.com");
        i.name = "  ".into();
        assert!(matches!(h.svc.sign_individual(&link, i), Err(SigningError::Validation(_))));
        let mut i = input("a@corp.com");
        i.privacy_version = " ".into();
        assert!(matches!(
            h.svc.sign_individual(&link, i),
            Err(SigningError::Validation(m)) if m.contains("privacy")
        ));
        assert!(matches!(
            h.svc.sign_individual("missing", input("a@corp.com")),
            Err(SigningError::NotFound(_))
        ));
    }

    #[test]
    fn disable_enable_keeps_one_record() {
        let h = test_service();
        let link = link_with_bindings(&h.svc, "r");
        h.svc.sign_individual(&link, input("a@corp.com")).unwrap();

        h.svc.disable(&link, "a@corp.com").unwrap();
        h.svc.disable(&link, "a@corp.com").unwrap();
        assert!(!h.svc.get_individual(&link, "a@corp.com").unwrap().enabled);
        assert!(h.svc.is_signed(&link, "a@corp.com", SigningKind::Individual).unwrap());

        h.svc.enable(&link, "a@corp.com").unwrap();
        assert!(h.svc.get_individual(&link, "a@corp.com").unwrap().enabled);
        assert_eq!(summary_count(&h.svc, &link), 1);

        assert!(matches!(
            h.svc.disable(&link, "b@corp.com"),
            Err(SigningError::NotFound(_))
        ));
    }

    #[test]
    fn delete_moves_record_to_archive() {
        let h = test_service();
        let link = link_with_bindings(&h.svc, "r");
        h.svc.sign_individual(&link, input("a@corp.com")).unwrap();
        h.svc.delete_individual(&link, "a@corp.com").unwrap();

        assert!(h.svc.get_individual(&link, "a@corp.com").is_err());
        let archived = h
            .svc
            .sql
            .query("SELECT COUNT(*) AS n FROM individual_signings_deleted", &[])
            .unwrap();
        assert_eq!(archived[0].get_i64("n"), Some(1));
        assert!(matches!(
            h.svc.delete_individual(&link, "a@corp.com"),
            Err(SigningError::NotFound(_))
        ));

        // The person may sign again after an admin delete.
        h.svc.sign_individual(&link, input("a@corp.com")).unwrap();
    }

    #[test]
    fn list_filters_and_hides_answers() {
        let h = test_service();
        let link = link_with_bindings(&h.svc, "r");
        h.svc.sign_individual(&link, input("a@corp.com")).unwrap();
        h.svc.sign_individual(&link, input("b@other.org")).unwrap();
        h.svc.disable(&link, "b@other.org").unwrap();

        let all = summary_count(&h.svc, &link);
        assert_eq!(all, 2);

        let corp = h
            .svc
            .list_individual(
                &link,
                &IndividualFilter {
                    email_domain: Some("corp.com".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(corp.len(), 1);
        assert_eq!(corp[0].email, "a@corp.com");

        let disabled = h
            .svc
            .list_individual(
                &link,
                &IndividualFilter {
                    enabled: Some(false),
                    kind: Some(SigningKind::Individual),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(disabled.len(), 1);
        assert_eq!(disabled[0].email, "b@other.org");

        let json = serde_json::to_string(&corp[0]).unwrap();
        assert!(!json.contains("1 Main St"));
    }
}
