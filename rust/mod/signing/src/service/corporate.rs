use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use clasign_core::new_id;
use clasign_sql::{Row, SQLExecutor, Value};

use crate::model::{
    CorpSigning, CorpSigningCreated, CorpSigningInput, CorpSigningSummary, LinkType,
    ManagerSummary, Role, SigningInfo,
};
use crate::service::binding::normalize_language;
use crate::service::individual::require_privacy;
use crate::service::manager::NewManagerEntry;
use crate::service::{conflict_or_storage, EmailAddr, SigningError, SigningService};

/// Encrypted part of a corporate signing row.
#[derive(Serialize, Deserialize)]
struct CorpPii {
    admin_name: String,
    #[serde(default)]
    info: SigningInfo,
}

const COLUMNS: &str = "id, link_id, admin_email, corp_id, primary_domain, corporation_name, \
     cla_language, cla_hash, date, privacy_version, pii, pdf_uploaded";

/// Identity of a live corporate signing, as the roster operations need it.
pub(crate) struct SigningRef {
    pub(crate) id: String,
    pub(crate) link_id: String,
    pub(crate) corp_id: String,
    pub(crate) primary_domain: String,
    /// Deterministic ciphertext of the admin email.
    pub(crate) admin_email: String,
    pub(crate) pdf_uploaded: bool,
}

fn row_to_ref(row: &Row) -> SigningRef {
    let text = |col: &str| row.get_str(col).unwrap_or_default().to_string();
    SigningRef {
        id: text("id"),
        link_id: text("link_id"),
        corp_id: text("corp_id"),
        primary_domain: text("primary_domain"),
        admin_email: text("admin_email"),
        pdf_uploaded: row.get_bool("pdf_uploaded").unwrap_or(false),
    }
}

impl SigningService {
    /// Sign the corporation CLA on behalf of a corporation.
    ///
    /// The signing, its primary email domain and the admin roster entry are
    /// written in one transaction: a signing never exists without its admin.
    pub fn sign_corporate(
        &self,
        link_id: &str,
        input: CorpSigningInput,
    ) -> Result<CorpSigningCreated, SigningError> {
        let admin = EmailAddr::parse(&input.admin_email)?;
        let corporation_name = input.corporation_name.trim().to_string();
        if corporation_name.is_empty() {
            return Err(SigningError::Validation("corporation name is required".into()));
        }
        let language = normalize_language(&input.cla_language)?;
        let privacy_version = require_privacy(&input.privacy_version)?.to_string();
        let entry = self.prepare_manager(None, &input.admin_name, &input.admin_email)?;
        let pii = self.seal_json(&CorpPii {
            admin_name: entry.name.clone(),
            info: input.info,
        })?;
        let signing_id = new_id();
        let now = self.now_rfc3339();

        let tx = self.sql.begin()?;
        let inserted = tx.exec(
            &format!(
                "INSERT INTO corp_signings ({COLUMNS}, link_status, created_at)
                 SELECT ?1, l.id, ?3, ?4, ?5, ?6, b.language, b.cla_hash, ?7, ?11, ?8, 0, 'ready', ?9
                 FROM links l
                 JOIN cla_bindings b ON b.link_id = l.id AND b.apply_to = 'corporation' AND b.language = ?10
                 WHERE l.id = ?2 AND l.status = 'ready'
                   AND NOT EXISTS (
                       SELECT 1 FROM corp_signings c
                       WHERE c.link_id = ?2
                         AND (c.admin_email = ?3 OR (c.corp_id = ?4 AND c.corporation_name = ?6))
                   )"
            ),
            &[
                signing_id.as_str().into(),
                link_id.into(),
                entry.email_ct.as_str().into(),
                entry.corp_id.as_str().into(),
                admin.domain.as_str().into(),
                corporation_name.as_str().into(),
                input.date.as_str().into(),
                pii.into(),
                now.as_str().into(),
                language.as_str().into(),
                privacy_version.into(),
            ],
        );
        match inserted {
            Ok(1) => {}
            Ok(_) => {
                if self.ready_link_type(&*tx, link_id)? == LinkType::Dco {
                    return Err(SigningError::Validation(
                        "dco links accept individual signatures only".into(),
                    ));
                }
                let binding = tx.query(
                    "SELECT 1 AS x FROM cla_bindings
                     WHERE link_id = ?1 AND apply_to = 'corporation' AND language = ?2",
                    &[link_id.into(), language.as_str().into()],
                )?;
                if binding.is_empty() {
                    return Err(SigningError::NotFound(format!(
                        "corporation cla for language {language}"
                    )));
                }
                return Err(SigningError::AlreadySigned);
            }
            Err(e) if e.is_constraint() => return Err(SigningError::AlreadySigned),
            Err(e) => return Err(e.into()),
        }

        tx.exec(
            "INSERT INTO corp_email_domains (signing_id, domain, corp_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            &[
                signing_id.as_str().into(),
                admin.domain.as_str().into(),
                entry.corp_id.as_str().into(),
                now.into(),
            ],
        )?;
        self.insert_manager(&*tx, &signing_id, link_id, &entry, Role::Admin)?;
        tx.commit()?;

        info!(link_id, signing_id = %signing_id, "corporate signing created");
        Ok(CorpSigningCreated {
            signing_id,
            admin_id: entry.id,
            initial_password: entry.password,
        })
    }

    /// Load a live corporate signing by id.
    pub(crate) fn load_signing(
        &self,
        db: &(impl SQLExecutor + ?Sized),
        signing_id: &str,
    ) -> Result<SigningRef, SigningError> {
        let rows = db.query(
            &format!("SELECT {COLUMNS} FROM corp_signings WHERE id = ?1 AND link_status = 'ready'"),
            &[signing_id.into()],
        )?;
        rows.first()
            .map(row_to_ref)
            .ok_or_else(|| SigningError::NotFound(format!("corporate signing {signing_id}")))
    }

    fn find_signing_row(&self, link_id: &str, admin_email: &str) -> Result<Row, SigningError> {
        let admin = EmailAddr::parse(admin_email)?;
        let rows = self.sql.query(
            &format!(
                "SELECT {COLUMNS} FROM corp_signings
                 WHERE link_id = ?1 AND admin_email = ?2 AND link_status = 'ready'"
            ),
            &[link_id.into(), self.seal_email(&admin.addr)?.into()],
        )?;
        rows.into_iter()
            .next()
            .ok_or_else(|| SigningError::NotFound(format!("corporate signing of {}", admin.addr)))
    }

    /// Get the corporate signing whose admin email is `admin_email`, with
    /// its approved domains and admin.
    pub fn get_corp_signing(
        &self,
        link_id: &str,
        admin_email: &str,
    ) -> Result<CorpSigning, SigningError> {
        let row = self.find_signing_row(link_id, admin_email)?;
        let signing = row_to_ref(&row);
        let pii: CorpPii = self.open_json(row.get_blob("pii").unwrap_or_default())?;
        let admin = self
            .list_managers(&signing.id, Some(Role::Admin))?
            .into_iter()
            .next();
        let text = |col: &str| row.get_str(col).unwrap_or_default().to_string();
        Ok(CorpSigning {
            email_domains: self.list_email_domains(&signing.id)?,
            admin_email: self.open_str(&signing.admin_email)?,
            id: signing.id,
            link_id: signing.link_id,
            cla_language: text("cla_language"),
            cla_hash: text("cla_hash"),
            admin_name: pii.admin_name,
            corporation_name: text("corporation_name"),
            date: text("date"),
            privacy_version: text("privacy_version"),
            info: pii.info,
            pdf_uploaded: signing.pdf_uploaded,
            admin,
        })
    }

    /// Least-disclosure listing of a live link's corporate signings.
    pub fn list_corp_signings(&self, link_id: &str) -> Result<Vec<CorpSigningSummary>, SigningError> {
        let rows = self.sql.query(
            "SELECT c.id, c.admin_email, c.corporation_name, c.cla_language, c.date, c.pii, c.pdf_uploaded,
                    EXISTS (
                        SELECT 1 FROM corp_managers m WHERE m.signing_id = c.id AND m.role = 'admin'
                    ) AS admin_added
             FROM corp_signings c
             WHERE c.link_id = ?1 AND c.link_status = 'ready'
             ORDER BY c.created_at, c.id",
            &[link_id.into()],
        )?;
        rows.iter()
            .map(|row| -> Result<CorpSigningSummary, SigningError> {
                let pii: CorpPii = self.open_json(row.get_blob("pii").unwrap_or_default())?;
                let text = |col: &str| row.get_str(col).unwrap_or_default().to_string();
                Ok(CorpSigningSummary {
                    id: text("id"),
                    cla_language: text("cla_language"),
                    admin_email: self.open_str(row.get_str("admin_email").unwrap_or_default())?,
                    admin_name: pii.admin_name,
                    corporation_name: text("corporation_name"),
                    date: text("date"),
                    pdf_uploaded: row.get_bool("pdf_uploaded").unwrap_or(false),
                    admin_added: row.get_bool("admin_added").unwrap_or(false),
                })
            })
            .collect()
    }

    /// Archive a corporate signing together with a snapshot of its roster
    /// and approved domains. Roster, domains and the employee signings made
    /// under it go with it.
    pub fn delete_corp_signing(&self, signing_id: &str) -> Result<(), SigningError> {
        let now = self.now_rfc3339();
        let tx = self.sql.begin()?;
        let signing = self.load_signing(&*tx, signing_id)?;

        // The snapshot keeps emails and names in their stored ciphertext.
        let managers: Vec<_> = tx
            .query(
                "SELECT id, email, role, name, created_at FROM corp_managers
                 WHERE signing_id = ?1 ORDER BY created_at, id",
                &[signing_id.into()],
            )?
            .iter()
            .map(|m| {
                json!({
                    "id": m.get_str("id"),
                    "email": m.get_str("email"),
                    "role": m.get_str("role"),
                    "name": m.get_str("name"),
                    "created_at": m.get_str("created_at"),
                })
            })
            .collect();
        let domains: Vec<String> = tx
            .query(
                "SELECT domain FROM corp_email_domains WHERE signing_id = ?1 ORDER BY domain",
                &[signing_id.into()],
            )?
            .iter()
            .filter_map(|r| r.get_str("domain").map(str::to_string))
            .collect();
        let roster = serde_json::to_string(&json!({ "managers": managers, "domains": domains }))?;

        tx.exec(
            &format!(
                "INSERT INTO corp_signings_deleted ({COLUMNS}, roster, created_at, deleted_at)
                 SELECT {COLUMNS}, ?2, created_at, ?3 FROM corp_signings WHERE id = ?1"
            ),
            &[signing_id.into(), roster.into(), now.as_str().into()],
        )?;
        let employees = self.archive_employees(&*tx, signing_id, &now)?;
        tx.exec("DELETE FROM corp_signings WHERE id = ?1", &[signing_id.into()])?;
        let remaining = tx.query(
            "SELECT 1 AS x FROM corp_signings WHERE id = ?1",
            &[signing_id.into()],
        )?;
        if !remaining.is_empty() {
            return Err(SigningError::Internal("live corporate signing survived delete".into()));
        }
        tx.commit()?;

        if signing.pdf_uploaded {
            let key = self.pdf_key(&signing);
            if let Err(e) = self.blob.delete(&key) {
                warn!(signing_id, "failed to delete corporate signing pdf: {e}");
            }
        }
        info!(link_id = %signing.link_id, signing_id, employees, "corporate signing archived");
        Ok(())
    }

    fn pdf_key(&self, signing: &SigningRef) -> String {
        format!(
            "{}/{}/{}_{}.pdf",
            self.config.pdf_prefix, signing.link_id, signing.corp_id, signing.id
        )
    }

    /// Store the signed PDF of a corporate signing.
    pub fn upload_corp_pdf(
        &self,
        link_id: &str,
        admin_email: &str,
        pdf: &[u8],
    ) -> Result<(), SigningError> {
        if pdf.is_empty() {
            return Err(SigningError::Validation("pdf is empty".into()));
        }
        let signing = row_to_ref(&self.find_signing_row(link_id, admin_email)?);
        self.blob.write(&self.pdf_key(&signing), pdf)?;
        let updated = self.sql.exec(
            "UPDATE corp_signings SET pdf_uploaded = 1 WHERE id = ?1 AND link_status = 'ready'",
            &[signing.id.as_str().into()],
        )?;
        if updated == 0 {
            return Err(SigningError::NotFound(format!("corporate signing {}", signing.id)));
        }
        info!(link_id, signing_id = %signing.id, bytes = pdf.len(), "corporate pdf uploaded");
        Ok(())
    }

    pub fn download_corp_pdf(&self, link_id: &str, admin_email: &str) -> Result<Vec<u8>, SigningError> {
        let signing = row_to_ref(&self.find_signing_row(link_id, admin_email)?);
        if !signing.pdf_uploaded {
            return Err(SigningError::NotFound(format!("pdf of corporate signing {}", signing.id)));
        }
        Ok(self.blob.read(&self.pdf_key(&signing))?)
    }

    /// Insert a roster entry with no further predicate. A taken email or id
    /// surfaces as `AlreadyExists`.
    pub(crate) fn insert_manager(
        &self,
        db: &(impl SQLExecutor + ?Sized),
        signing_id: &str,
        link_id: &str,
        entry: &NewManagerEntry,
        role: Role,
    ) -> Result<(), SigningError> {
        let params: [Value; 9] = [
            signing_id.into(),
            entry.id.as_str().into(),
            link_id.into(),
            entry.email_ct.as_str().into(),
            entry.corp_id.as_str().into(),
            role.as_str().into(),
            entry.name_ct.as_str().into(),
            entry.password_hash.as_str().into(),
            self.now_rfc3339().into(),
        ];
        db.exec(
            "INSERT INTO corp_managers
                (signing_id, id, link_id, email, corp_id, role, name, password_hash, password_changed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
            &params,
        )
        .map_err(|e| {
            conflict_or_storage(e, || {
                SigningError::AlreadyExists(format!("manager {}", entry.email.addr))
            })
        })?;
        Ok(())
    }
}

pub(crate) fn row_to_manager(
    svc: &SigningService,
    row: &Row,
) -> Result<ManagerSummary, SigningError> {
    let role = row
        .get_str("role")
        .and_then(Role::parse)
        .ok_or_else(|| SigningError::Internal("roster row has invalid role".into()))?;
    Ok(ManagerSummary {
        id: row.get_str("id").unwrap_or_default().to_string(),
        name: svc.open_str(row.get_str("name").unwrap_or_default())?,
        email: svc.open_str(row.get_str("email").unwrap_or_default())?,
        role,
    })
}
