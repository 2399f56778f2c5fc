use clasign_core::new_id;
use clasign_sql::{Row, SQLExecutor, Value};
use tracing::info;

use crate::model::{ApplyTo, CreateLink, LinkInfo, LinkStatus, LinkType, OrgRepo};
use crate::service::{conflict_or_storage, SigningError, SigningService};

const LINK_COLUMNS: &str =
    "id, platform, org_id, repo_id, link_type, org_alias, org_email, submitter, status, created_at";

fn row_to_link(row: &Row) -> Result<LinkInfo, SigningError> {
    let text = |col: &str| row.get_str(col).unwrap_or_default().to_string();
    let status = row
        .get_str("status")
        .and_then(LinkStatus::parse)
        .ok_or_else(|| SigningError::Internal("link row has invalid status".into()))?;
    let link_type = row
        .get_str("link_type")
        .and_then(LinkType::parse)
        .ok_or_else(|| SigningError::Internal("link row has invalid type".into()))?;
    Ok(LinkInfo {
        link_id: text("id"),
        org_repo: OrgRepo {
            platform: text("platform"),
            org_id: text("org_id"),
            repo_id: text("repo_id"),
        },
        link_type,
        org_alias: text("org_alias"),
        org_email: text("org_email"),
        submitter: text("submitter"),
        status,
        created_at: text("created_at"),
    })
}

impl SigningService {
    /// Create a link for `org_repo` unless a ready one already exists.
    ///
    /// The existence check and the insert are one statement, so two
    /// concurrent requests for the same repository cannot both succeed.
    /// Initial bindings are written in the same transaction.
    pub fn create_link(&self, input: CreateLink) -> Result<String, SigningError> {
        let OrgRepo {
            platform,
            org_id,
            repo_id,
        } = &input.org_repo;
        if platform.is_empty() || org_id.is_empty() {
            return Err(SigningError::Validation("platform and org are required".into()));
        }
        if input.submitter.is_empty() {
            return Err(SigningError::Validation("submitter is required".into()));
        }
        if input.link_type == LinkType::Dco && input.corp_cla.is_some() {
            return Err(SigningError::Validation("a dco link has no corporation document".into()));
        }

        let link_id = new_id();
        let now = self.now_rfc3339();
        let exists = || SigningError::AlreadyExists(format!("link for {}", input.org_repo));

        let tx = self.sql.begin()?;
        let inserted = tx
            .exec(
                "INSERT INTO links (id, platform, org_id, repo_id, org_alias, org_email, submitter, status, created_at, link_type)
                 SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, 'ready', ?8, ?9
                 WHERE NOT EXISTS (
                     SELECT 1 FROM links
                     WHERE platform = ?2 AND org_id = ?3 AND repo_id = ?4 AND status = 'ready'
                 )",
                &[
                    link_id.clone().into(),
                    platform.as_str().into(),
                    org_id.as_str().into(),
                    repo_id.as_str().into(),
                    input.org_alias.as_str().into(),
                    input.org_email.as_str().into(),
                    input.submitter.as_str().into(),
                    now.into(),
                    input.link_type.as_str().into(),
                ],
            )
            .map_err(|e| conflict_or_storage(e, exists))?;
        if inserted == 0 {
            return Err(exists());
        }

        for (apply_to, binding) in [
            (ApplyTo::Individual, &input.individual_cla),
            (ApplyTo::Corporation, &input.corp_cla),
        ] {
            if let Some(binding) = binding {
                self.insert_binding(&*tx, &link_id, apply_to, binding)?;
            }
        }
        tx.commit()?;

        info!(
            link_id = %link_id,
            org_repo = %input.org_repo,
            link_type = input.link_type.as_str(),
            "link created"
        );
        Ok(link_id)
    }

    /// Resolve a ready link for `org_repo`.
    pub fn resolve_link(&self, org_repo: &OrgRepo) -> Result<String, SigningError> {
        let rows = self.sql.query(
            "SELECT id FROM links
             WHERE platform = ?1 AND org_id = ?2 AND repo_id = ?3 AND status = 'ready'",
            &[
                org_repo.platform.as_str().into(),
                org_repo.org_id.as_str().into(),
                org_repo.repo_id.as_str().into(),
            ],
        )?;
        rows.first()
            .and_then(|r| r.get_str("id"))
            .map(str::to_string)
            .ok_or_else(|| SigningError::NotFound(format!("link for {org_repo}")))
    }

    /// Get a link by id, ready or deleted.
    pub fn get_link(&self, link_id: &str) -> Result<LinkInfo, SigningError> {
        self.get_link_in(self.sql.as_ref(), link_id)
    }

    fn get_link_in(
        &self,
        db: &(impl SQLExecutor + ?Sized),
        link_id: &str,
    ) -> Result<LinkInfo, SigningError> {
        let rows = db.query(
            &format!("SELECT {LINK_COLUMNS} FROM links WHERE id = ?1"),
            &[link_id.into()],
        )?;
        let row = rows
            .first()
            .ok_or_else(|| SigningError::NotFound(format!("link {link_id}")))?;
        row_to_link(row)
    }

    /// Ready links of `platform` belonging to any of `orgs`.
    pub fn list_links(&self, platform: &str, orgs: &[String]) -> Result<Vec<LinkInfo>, SigningError> {
        if orgs.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders: Vec<String> = (0..orgs.len()).map(|i| format!("?{}", i + 2)).collect();
        let mut params: Vec<Value> = vec![platform.into()];
        params.extend(orgs.iter().map(|o| Value::from(o.as_str())));

        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM links
             WHERE platform = ?1 AND status = 'ready' AND org_id IN ({})
             ORDER BY org_id, repo_id",
            placeholders.join(", ")
        );
        self.sql.query(&sql, &params)?.iter().map(row_to_link).collect()
    }

    /// Every link, ready or deleted. Operator view.
    pub fn list_all_links(&self) -> Result<Vec<LinkInfo>, SigningError> {
        self.sql
            .query(
                &format!("SELECT {LINK_COLUMNS} FROM links ORDER BY created_at, id"),
                &[],
            )?
            .iter()
            .map(row_to_link)
            .collect()
    }

    /// Mark a link deleted and cascade the status to its signings.
    /// Unlinking an already-deleted link is a no-op. A DCO link cannot be
    /// removed once anyone has signed it.
    pub fn unlink(&self, link_id: &str) -> Result<(), SigningError> {
        let now = self.now_rfc3339();
        let tx = self.sql.begin()?;
        let changed = tx.exec(
            "UPDATE links SET status = 'deleted', deleted_at = ?2
             WHERE id = ?1 AND status = 'ready'
               AND NOT (
                   link_type = 'dco'
                   AND EXISTS (SELECT 1 FROM individual_signings WHERE link_id = ?1)
               )",
            &[link_id.into(), now.into()],
        )?;
        if changed == 0 {
            let link = self.get_link_in(&*tx, link_id)?;
            return match link.status {
                LinkStatus::Deleted => Ok(()),
                LinkStatus::Ready => Err(SigningError::Validation(format!(
                    "dco link {link_id} has signers and cannot be removed"
                ))),
            };
        }
        let individuals = tx.exec(
            "UPDATE individual_signings SET link_status = 'deleted' WHERE link_id = ?1",
            &[link_id.into()],
        )?;
        let corps = tx.exec(
            "UPDATE corp_signings SET link_status = 'deleted' WHERE link_id = ?1",
            &[link_id.into()],
        )?;
        tx.commit()?;

        info!(link_id, individuals, corps, "link unlinked");
        Ok(())
    }

    /// Type of a ready link; NotFound otherwise.
    pub(crate) fn ready_link_type(
        &self,
        db: &(impl SQLExecutor + ?Sized),
        link_id: &str,
    ) -> Result<LinkType, SigningError> {
        let link = self.get_link_in(db, link_id)?;
        if link.status != LinkStatus::Ready {
            return Err(SigningError::NotFound(format!("link {link_id}")));
        }
        Ok(link.link_type)
    }

    /// Fails with NotFound unless `link_id` is a ready link.
    pub(crate) fn ensure_ready_link(
        &self,
        db: &(impl SQLExecutor + ?Sized),
        link_id: &str,
    ) -> Result<(), SigningError> {
        let rows = db.query(
            "SELECT 1 AS x FROM links WHERE id = ?1 AND status = 'ready'",
            &[link_id.into()],
        )?;
        if rows.is_empty() {
            return Err(SigningError::NotFound(format!("link {link_id}")));
        }
        Ok(())
    }
}
