use std::collections::HashSet;

use tracing::{info, warn};

use clasign_core::new_id;
use clasign_crypto::random_password;
use clasign_sql::{Row, SQLExecutor};

use crate::model::{
    Credential, ManagerCheck, ManagerCreated, ManagerSummary, NewManager, PasswordChange, Role,
};
use crate::service::corporate::row_to_manager;
use crate::service::{conflict_or_storage, is_valid_domain, EmailAddr, SigningError, SigningService};

const MIN_PASSWORD_LEN: usize = 6;
const MAX_PASSWORD_LEN: usize = 64;
const MAX_MANAGER_ID_LEN: usize = 32;

/// A roster entry ready to insert. Ciphertexts and the password hash are
/// computed before any transaction is opened.
pub(crate) struct NewManagerEntry {
    pub(crate) id: String,
    pub(crate) email: EmailAddr,
    pub(crate) email_ct: String,
    pub(crate) corp_id: String,
    pub(crate) name: String,
    pub(crate) name_ct: String,
    pub(crate) password: String,
    pub(crate) password_hash: String,
}

impl NewManagerEntry {
    fn created(self, role: Role) -> ManagerCreated {
        ManagerCreated {
            id: self.id,
            name: self.name,
            email: self.email.addr,
            role,
            initial_password: self.password,
        }
    }
}

/// How a manager names themselves at login.
enum LoginId {
    Email(EmailAddr),
    /// `"{id}_{domain}"`
    Account { id: String, domain: String },
}

impl LoginId {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.contains('@') {
            return EmailAddr::parse(raw).ok().map(LoginId::Email);
        }
        let (id, domain) = raw.rsplit_once('_')?;
        let domain = domain.to_ascii_lowercase();
        (!id.is_empty() && is_valid_domain(&domain)).then(|| LoginId::Account {
            id: id.to_string(),
            domain,
        })
    }

    fn domain(&self) -> &str {
        match self {
            LoginId::Email(e) => &e.domain,
            LoginId::Account { domain, .. } => domain,
        }
    }

    /// Normalized form the login guard is keyed on.
    fn guard_key(&self) -> String {
        match self {
            LoginId::Email(e) => e.addr.clone(),
            LoginId::Account { id, domain } => format!("{id}_{domain}"),
        }
    }
}

/// Number of trailing labels two domains share.
fn shared_suffix_labels(a: &str, b: &str) -> usize {
    a.rsplit('.')
        .zip(b.rsplit('.'))
        .take_while(|(x, y)| x == y)
        .count()
}

fn validate_manager_id(id: &str) -> Result<(), SigningError> {
    let ok = !id.is_empty()
        && id.len() <= MAX_MANAGER_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_'));
    if !ok {
        return Err(SigningError::Validation(format!("invalid manager id: {id:?}")));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), SigningError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(SigningError::Validation(format!(
            "password must be {MIN_PASSWORD_LEN} to {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn wrong_credential() -> SigningError {
    SigningError::Denied("wrong account or password".into())
}

impl SigningService {
    pub(crate) fn prepare_manager(
        &self,
        id: Option<&str>,
        name: &str,
        email: &str,
    ) -> Result<NewManagerEntry, SigningError> {
        let email = EmailAddr::parse(email)?;
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(SigningError::Validation("manager name is required".into()));
        }
        let id = match id.map(str::trim) {
            Some(id) => {
                validate_manager_id(id)?;
                id.to_string()
            }
            None => new_id()[..8].to_string(),
        };
        let password = random_password(self.config.initial_password_len);
        Ok(NewManagerEntry {
            email_ct: self.seal_email(&email.addr)?,
            corp_id: self.corp_id_of(&email.domain),
            name_ct: self.crypto.encryption.encrypt_str(&name)?,
            password_hash: self.crypto.passwords.hash(&password)?,
            id,
            email,
            name,
            password,
        })
    }

    /// Appoint the administrator of a corporate signing.
    ///
    /// A single conditional insert excludes an existing admin and a taken
    /// id, and requires the email to be in an approved domain. On refusal
    /// the failed predicate picks the error.
    pub fn add_admin(
        &self,
        signing_id: &str,
        manager: NewManager,
    ) -> Result<ManagerCreated, SigningError> {
        let entry = self.prepare_manager(manager.id.as_deref(), &manager.name, &manager.email)?;

        let tx = self.sql.begin()?;
        let inserted = tx.exec(
            "INSERT INTO corp_managers
                (signing_id, id, link_id, email, corp_id, role, name, password_hash, password_changed, created_at)
             SELECT c.id, ?2, c.link_id, ?3, ?4, 'admin', ?5, ?6, 0, ?7
             FROM corp_signings c
             WHERE c.id = ?1 AND c.link_status = 'ready'
               AND NOT EXISTS (SELECT 1 FROM corp_managers m WHERE m.signing_id = ?1 AND m.role = 'admin')
               AND NOT EXISTS (SELECT 1 FROM corp_managers m WHERE m.signing_id = ?1 AND m.id = ?2)
               AND EXISTS (SELECT 1 FROM corp_email_domains d WHERE d.signing_id = ?1 AND d.corp_id = ?4)",
            &[
                signing_id.into(),
                entry.id.as_str().into(),
                entry.email_ct.as_str().into(),
                entry.corp_id.as_str().into(),
                entry.name_ct.as_str().into(),
                entry.password_hash.as_str().into(),
                self.now_rfc3339().into(),
            ],
        );
        match inserted {
            Ok(1) => {}
            Ok(_) => return Err(self.diagnose_roster_insert(&*tx, signing_id, &entry, true)?),
            Err(e) if e.is_constraint() => {
                return Err(self.diagnose_roster_insert(&*tx, signing_id, &entry, true)?);
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit()?;

        info!(signing_id, manager_id = %entry.id, "corporate admin added");
        Ok(entry.created(Role::Admin))
    }

    /// Work out which roster predicate refused `entry`.
    fn diagnose_roster_insert(
        &self,
        db: &(impl SQLExecutor + ?Sized),
        signing_id: &str,
        entry: &NewManagerEntry,
        as_admin: bool,
    ) -> Result<SigningError, SigningError> {
        self.load_signing(db, signing_id)?;
        let exists = |cond: &str, value: &str| -> Result<bool, SigningError> {
            let rows = db.query(
                &format!("SELECT 1 AS x FROM corp_managers WHERE signing_id = ?1 AND {cond}"),
                &[signing_id.into(), value.into()],
            )?;
            Ok(!rows.is_empty())
        };
        if as_admin && exists("role = ?2", "admin")? {
            return Ok(SigningError::DuplicateAdmin);
        }
        if exists("id = ?2", &entry.id)? {
            return Ok(SigningError::DuplicateManagerId(entry.id.clone()));
        }
        if exists("email = ?2", &entry.email_ct)? {
            return Ok(SigningError::AlreadyExists(format!("manager {}", entry.email.addr)));
        }
        let approved = db.query(
            "SELECT 1 AS x FROM corp_email_domains WHERE signing_id = ?1 AND corp_id = ?2",
            &[signing_id.into(), entry.corp_id.as_str().into()],
        )?;
        if approved.is_empty() {
            return Ok(SigningError::Validation(format!(
                "{} is not in an approved email domain",
                entry.email.addr
            )));
        }
        Ok(SigningError::AlreadyExists(format!("manager {}", entry.email.addr)))
    }

    /// Remove the administrator so a new one can be appointed.
    pub fn revoke_admin(&self, signing_id: &str) -> Result<ManagerSummary, SigningError> {
        let rows = self.sql.query(
            "DELETE FROM corp_managers
             WHERE signing_id = ?1 AND role = 'admin'
               AND EXISTS (SELECT 1 FROM corp_signings c WHERE c.id = ?1 AND c.link_status = 'ready')
             RETURNING id, email, role, name",
            &[signing_id.into()],
        )?;
        let row = rows
            .first()
            .ok_or_else(|| SigningError::NotFound(format!("admin of corporate signing {signing_id}")))?;
        info!(signing_id, "corporate admin revoked");
        row_to_manager(self, row)
    }

    /// Add employee managers. All or none are added.
    pub fn add_managers(
        &self,
        signing_id: &str,
        managers: Vec<NewManager>,
    ) -> Result<Vec<ManagerCreated>, SigningError> {
        if managers.is_empty() {
            return Err(SigningError::Validation("no managers given".into()));
        }
        let mut entries = Vec::with_capacity(managers.len());
        let mut seen = HashSet::new();
        for m in managers {
            let entry = self.prepare_manager(m.id.as_deref(), &m.name, &m.email)?;
            if !seen.insert(entry.email.addr.clone()) || !seen.insert(format!("id:{}", entry.id)) {
                return Err(SigningError::Validation(format!(
                    "duplicate manager {} in request",
                    entry.email.addr
                )));
            }
            entries.push(entry);
        }

        let tx = self.sql.begin()?;
        let signing = self.load_signing(&*tx, signing_id)?;

        let current = tx.query(
            "SELECT COUNT(*) AS n FROM corp_managers WHERE signing_id = ?1 AND role = 'manager'",
            &[signing_id.into()],
        )?;
        let current = current.first().and_then(|r| r.get_i64("n")).unwrap_or(0) as usize;
        let limit = self.config.max_employee_managers;
        if current + entries.len() > limit {
            return Err(SigningError::Validation(format!(
                "a corporation may have at most {limit} managers"
            )));
        }

        let approved: HashSet<String> = tx
            .query(
                "SELECT corp_id FROM corp_email_domains WHERE signing_id = ?1",
                &[signing_id.into()],
            )?
            .iter()
            .filter_map(|r| r.get_str("corp_id").map(str::to_string))
            .collect();
        let admin_emails: HashSet<String> = tx
            .query(
                "SELECT email FROM corp_managers WHERE signing_id = ?1 AND role = 'admin'",
                &[signing_id.into()],
            )?
            .iter()
            .filter_map(|r| r.get_str("email").map(str::to_string))
            .chain(std::iter::once(signing.admin_email.clone()))
            .collect();

        for entry in &entries {
            if !approved.contains(&entry.corp_id) {
                return Err(SigningError::Validation(format!(
                    "{} is not in an approved email domain",
                    entry.email.addr
                )));
            }
            if admin_emails.contains(&entry.email_ct) {
                return Err(SigningError::Validation(format!(
                    "{} is the administrator",
                    entry.email.addr
                )));
            }
            if self.is_on_roster(&*tx, signing_id, entry)? {
                return Err(self.diagnose_roster_insert(&*tx, signing_id, entry, false)?);
            }
            self.insert_manager(&*tx, signing_id, &signing.link_id, entry, Role::Manager)?;
        }
        tx.commit()?;

        info!(signing_id, added = entries.len(), "corporate managers added");
        Ok(entries.into_iter().map(|e| e.created(Role::Manager)).collect())
    }

    fn is_on_roster(
        &self,
        db: &(impl SQLExecutor + ?Sized),
        signing_id: &str,
        entry: &NewManagerEntry,
    ) -> Result<bool, SigningError> {
        let rows = db.query(
            "SELECT 1 AS x FROM corp_managers WHERE signing_id = ?1 AND (id = ?2 OR email = ?3)",
            &[
                signing_id.into(),
                entry.id.as_str().into(),
                entry.email_ct.as_str().into(),
            ],
        )?;
        Ok(!rows.is_empty())
    }

    /// Remove employee managers by email. Emails that match no manager are
    /// skipped; the removed entries are returned.
    pub fn remove_managers(
        &self,
        signing_id: &str,
        emails: &[String],
    ) -> Result<Vec<ManagerSummary>, SigningError> {
        let mut targets = Vec::with_capacity(emails.len());
        for email in emails {
            let email = EmailAddr::parse(email)?;
            targets.push((self.seal_email(&email.addr)?, self.corp_id_of(&email.domain)));
        }

        let tx = self.sql.begin()?;
        self.load_signing(&*tx, signing_id)?;
        let mut removed = Vec::new();
        for (email_ct, corp_id) in &targets {
            let rows = tx.query(
                "DELETE FROM corp_managers
                 WHERE signing_id = ?1 AND role = 'manager' AND corp_id = ?2 AND email = ?3
                 RETURNING id, email, role, name",
                &[signing_id.into(), corp_id.as_str().into(), email_ct.as_str().into()],
            )?;
            for row in &rows {
                removed.push(row_to_manager(self, row)?);
            }
        }
        tx.commit()?;

        info!(signing_id, removed = removed.len(), "corporate managers removed");
        Ok(removed)
    }

    /// Roster of a corporate signing, admin first.
    pub fn list_managers(
        &self,
        signing_id: &str,
        role: Option<Role>,
    ) -> Result<Vec<ManagerSummary>, SigningError> {
        self.load_signing(self.sql.as_ref(), signing_id)?;
        let rows = self.sql.query(
            "SELECT id, email, role, name FROM corp_managers
             WHERE signing_id = ?1 AND (?2 IS NULL OR role = ?2)
             ORDER BY role = 'admin' DESC, created_at, id",
            &[signing_id.into(), role.map(|r| r.as_str()).into()],
        )?;
        rows.iter().map(|row| row_to_manager(self, row)).collect()
    }

    /// Approve another email domain of the corporation.
    ///
    /// The domain must have the same registrable domain (public suffix plus
    /// one label) as the primary one and share enough trailing labels with
    /// it. A domain another live signing on the link already approves is
    /// refused by the insert itself.
    pub fn add_email_domain(&self, signing_id: &str, domain: &str) -> Result<(), SigningError> {
        let domain = domain.trim().to_ascii_lowercase();
        if !is_valid_domain(&domain) {
            return Err(SigningError::Validation(format!("invalid email domain: {domain:?}")));
        }
        let signing = self.load_signing(self.sql.as_ref(), signing_id)?;
        let primary = &signing.primary_domain;
        match (psl::domain_str(&domain), psl::domain_str(primary)) {
            (Some(a), Some(b)) if a == b => {}
            _ => {
                return Err(SigningError::Validation(format!(
                    "{domain} does not belong to the organization of {primary}"
                )));
            }
        }
        let required = self.config.min_shared_domain_labels;
        if shared_suffix_labels(&domain, primary) < required {
            return Err(SigningError::Validation(format!(
                "{domain} must share at least {required} labels with {primary}"
            )));
        }

        let corp_id = self.corp_id_of(&domain);
        let taken = || SigningError::AlreadyExists(format!("domain {domain}"));
        let tx = self.sql.begin()?;
        let inserted = tx
            .exec(
                "INSERT INTO corp_email_domains (signing_id, domain, corp_id, created_at)
                 SELECT c.id, ?2, ?3, ?4 FROM corp_signings c
                 WHERE c.id = ?1 AND c.link_status = 'ready'
                   AND NOT EXISTS (
                       SELECT 1 FROM corp_email_domains d
                       JOIN corp_signings o ON o.id = d.signing_id
                       WHERE o.link_id = c.link_id AND o.link_status = 'ready'
                         AND o.id != ?1 AND d.corp_id = ?3
                   )",
                &[
                    signing_id.into(),
                    domain.as_str().into(),
                    corp_id.as_str().into(),
                    self.now_rfc3339().into(),
                ],
            )
            .map_err(|e| conflict_or_storage(e, taken))?;
        if inserted == 0 {
            self.load_signing(&*tx, signing_id)?;
            return Err(SigningError::AlreadyExists(format!(
                "domain {domain} is approved for another corporation"
            )));
        }
        tx.commit()?;
        info!(signing_id, "email domain approved");
        Ok(())
    }

    /// Approved domains, primary first.
    pub fn list_email_domains(&self, signing_id: &str) -> Result<Vec<String>, SigningError> {
        let rows = self.sql.query(
            "SELECT d.domain FROM corp_email_domains d
             JOIN corp_signings c ON c.id = d.signing_id
             WHERE d.signing_id = ?1
             ORDER BY d.domain = c.primary_domain DESC, d.created_at, d.domain",
            &[signing_id.into()],
        )?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get_str("domain").map(str::to_string))
            .collect())
    }

    /// Check a manager's credential under a link.
    ///
    /// Locked accounts are refused before any hash is verified. Every
    /// failure counts toward the lockout; success clears it.
    pub fn authenticate(
        &self,
        link_id: &str,
        credential: &Credential,
    ) -> Result<ManagerCheck, SigningError> {
        let login = LoginId::parse(&credential.identifier).ok_or_else(wrong_credential)?;
        let account = self.seal_email(&login.guard_key())?;
        if let Some(until) = self.is_locked(link_id, &account)? {
            return Err(SigningError::Locked { until });
        }

        let (by, key) = match &login {
            LoginId::Email(e) => ("m.email", self.seal_email(&e.addr)?),
            LoginId::Account { id, .. } => ("m.id", id.clone()),
        };
        let candidates = self.sql.query(
            &format!(
                "SELECT m.signing_id, m.id, m.role, m.name, m.email, m.corp_id, m.password_hash,
                        m.password_changed, c.corporation_name
                 FROM corp_managers m
                 JOIN corp_signings c ON c.id = m.signing_id
                 WHERE m.link_id = ?1 AND c.link_status = 'ready' AND {by} = ?2
                   AND EXISTS (
                       SELECT 1 FROM corp_email_domains d
                       WHERE d.signing_id = m.signing_id AND d.corp_id = ?3
                   )
                 ORDER BY m.created_at"
            ),
            &[
                link_id.into(),
                key.into(),
                self.corp_id_of(login.domain()).into(),
            ],
        )?;

        let hit = candidates.iter().find(|row| {
            self.crypto.passwords.verify(
                &credential.password,
                row.get_str("password_hash").unwrap_or_default(),
            )
        });
        let Some(row) = hit else {
            if candidates.is_empty() {
                self.crypto.passwords.verify(&credential.password, &self.decoy_hash);
            }
            let miss = self.record_failure(link_id, &account)?;
            return Err(match miss.lock_until {
                Some(until) if until > self.now() => {
                    warn!(link_id, "manager account locked");
                    SigningError::Locked { until }
                }
                _ => wrong_credential(),
            });
        };
        self.reset(link_id, &account)?;

        let role = row
            .get_str("role")
            .and_then(Role::parse)
            .ok_or_else(|| SigningError::Internal("roster row has invalid role".into()))?;
        let text = |col: &str| row.get_str(col).unwrap_or_default().to_string();
        Ok(ManagerCheck {
            link_id: link_id.to_string(),
            signing_id: text("signing_id"),
            manager_id: text("id"),
            role,
            name: self.open_str(row.get_str("name").unwrap_or_default())?,
            email: self.open_str(row.get_str("email").unwrap_or_default())?,
            corp_id: text("corp_id"),
            corporation_name: text("corporation_name"),
            password_changed: row.get_bool("password_changed").unwrap_or(false),
        })
    }

    /// Replace a manager's password.
    ///
    /// The update only applies if the stored hash is still the one that was
    /// checked, so a concurrent change makes this call fail instead of
    /// silently overwriting it.
    pub fn reset_password(
        &self,
        link_id: &str,
        email: &str,
        change: PasswordChange,
        new_password: &str,
    ) -> Result<(), SigningError> {
        validate_password(new_password)?;
        let email = EmailAddr::parse(email)?;
        let rows = self.sql.query(
            "SELECT m.signing_id, m.id, m.password_hash
             FROM corp_managers m
             JOIN corp_signings c ON c.id = m.signing_id
             WHERE m.link_id = ?1 AND m.email = ?2 AND c.link_status = 'ready'
             ORDER BY m.created_at",
            &[link_id.into(), self.seal_email(&email.addr)?.into()],
        )?;
        let hash_of = |row: &Row| row.get_str("password_hash").unwrap_or_default().to_string();

        let row = match &change {
            PasswordChange::Verified { old } => {
                if old == new_password {
                    return Err(SigningError::Validation(
                        "new password must differ from the old one".into(),
                    ));
                }
                rows.iter()
                    .find(|row| self.crypto.passwords.verify(old, &hash_of(row)))
                    .ok_or_else(wrong_credential)?
            }
            PasswordChange::Override { signing_id } => {
                let mut matching = rows.iter().filter(|row| {
                    signing_id
                        .as_deref()
                        .is_none_or(|id| row.get_str("signing_id") == Some(id))
                });
                let row = matching
                    .next()
                    .ok_or_else(|| SigningError::NotFound(format!("manager {}", email.addr)))?;
                if matching.next().is_some() {
                    return Err(SigningError::Validation(format!(
                        "{} manages more than one corporation, name the signing",
                        email.addr
                    )));
                }
                row
            }
        };

        let new_hash = self.crypto.passwords.hash(new_password)?;
        let updated = self.sql.exec(
            "UPDATE corp_managers SET password_hash = ?4, password_changed = 1
             WHERE signing_id = ?1 AND id = ?2 AND password_hash = ?3",
            &[
                row.get_str("signing_id").unwrap_or_default().into(),
                row.get_str("id").unwrap_or_default().into(),
                hash_of(row).into(),
                new_hash.into(),
            ],
        )?;
        if updated == 0 {
            return Err(SigningError::Denied("password was changed concurrently".into()));
        }
        info!(link_id, "manager password reset");
        Ok(())
    }
}
