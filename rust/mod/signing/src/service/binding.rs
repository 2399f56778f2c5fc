use sha2::{Digest, Sha256};
use tracing::info;

use clasign_core::new_id;
use clasign_sql::{Row, SQLExecutor, Value};

use crate::model::{
    ApplyTo, ClaBinding, ClaTemplate, CreateTemplate, Field, LinkType, NewBinding,
};
use crate::service::{conflict_or_storage, SigningError, SigningService};

pub(crate) fn normalize_language(language: &str) -> Result<String, SigningError> {
    let language = language.trim().to_ascii_lowercase();
    if language.is_empty() {
        return Err(SigningError::Validation("cla language is required".into()));
    }
    Ok(language)
}

fn row_to_template(row: &Row) -> ClaTemplate {
    let text = |col: &str| row.get_str(col).unwrap_or_default().to_string();
    ClaTemplate {
        id: text("id"),
        title: text("title"),
        url: text("url"),
        content_hash: text("content_hash"),
        created_at: text("created_at"),
    }
}

fn row_to_binding(row: &Row) -> Result<ClaBinding, SigningError> {
    let text = |col: &str| row.get_str(col).unwrap_or_default().to_string();
    let apply_to = row
        .get_str("apply_to")
        .and_then(ApplyTo::parse)
        .ok_or_else(|| SigningError::Internal("binding row has invalid apply_to".into()))?;
    let fields: Vec<Field> = serde_json::from_str(row.get_str("fields").unwrap_or("[]"))?;
    Ok(ClaBinding {
        link_id: text("link_id"),
        apply_to,
        language: text("language"),
        template_id: text("template_id"),
        cla_hash: text("cla_hash"),
        fields,
        org_signature: row.get_blob("org_signature").map(<[u8]>::to_vec),
    })
}

impl SigningService {
    /// Register a CLA document. Its content hash is what signings record.
    pub fn create_template(&self, input: CreateTemplate) -> Result<ClaTemplate, SigningError> {
        if input.content.is_empty() {
            return Err(SigningError::Validation("cla content is empty".into()));
        }
        let template = ClaTemplate {
            id: new_id(),
            title: input.title,
            url: input.url,
            content_hash: hex::encode(Sha256::digest(&input.content)),
            created_at: self.now_rfc3339(),
        };
        self.sql.exec(
            "INSERT INTO cla_templates (id, title, url, content_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            &[
                template.id.as_str().into(),
                template.title.as_str().into(),
                template.url.as_str().into(),
                template.content_hash.as_str().into(),
                template.created_at.as_str().into(),
            ],
        )?;
        Ok(template)
    }

    pub fn get_template(&self, template_id: &str) -> Result<ClaTemplate, SigningError> {
        let rows = self.sql.query(
            "SELECT id, title, url, content_hash, created_at FROM cla_templates WHERE id = ?1",
            &[template_id.into()],
        )?;
        rows.first()
            .map(row_to_template)
            .ok_or_else(|| SigningError::NotFound(format!("cla template {template_id}")))
    }

    /// Delete a template that no binding references.
    ///
    /// The reference check is part of the DELETE itself, inside a write
    /// transaction, so a concurrent bind cannot attach mid-deletion.
    pub fn delete_template(&self, template_id: &str) -> Result<(), SigningError> {
        let tx = self.sql.begin()?;
        let deleted = tx.exec(
            "DELETE FROM cla_templates
             WHERE id = ?1
               AND NOT EXISTS (SELECT 1 FROM cla_bindings WHERE template_id = ?1)",
            &[template_id.into()],
        )?;
        if deleted == 0 {
            let exists = !tx
                .query("SELECT 1 AS x FROM cla_templates WHERE id = ?1", &[template_id.into()])?
                .is_empty();
            return Err(if exists {
                SigningError::Validation(format!("cla template {template_id} is in use"))
            } else {
                SigningError::NotFound(format!("cla template {template_id}"))
            });
        }
        tx.commit()?;
        info!(template_id, "cla template deleted");
        Ok(())
    }

    pub fn has_binding(
        &self,
        link_id: &str,
        apply_to: ApplyTo,
        language: &str,
    ) -> Result<bool, SigningError> {
        let language = normalize_language(language)?;
        let rows = self.sql.query(
            "SELECT 1 AS x FROM cla_bindings WHERE link_id = ?1 AND apply_to = ?2 AND language = ?3",
            &[link_id.into(), apply_to.as_str().into(), language.into()],
        )?;
        Ok(!rows.is_empty())
    }

    /// Attach a template to a ready link for (apply_to, language).
    pub fn add_binding(
        &self,
        link_id: &str,
        apply_to: ApplyTo,
        binding: &NewBinding,
    ) -> Result<(), SigningError> {
        self.insert_binding(self.sql.as_ref(), link_id, apply_to, binding)
    }

    /// Insert-if-absent for one binding. The single statement requires a
    /// ready link that accepts `apply_to`, an existing template and no
    /// binding for the language.
    pub(crate) fn insert_binding(
        &self,
        db: &(impl SQLExecutor + ?Sized),
        link_id: &str,
        apply_to: ApplyTo,
        binding: &NewBinding,
    ) -> Result<(), SigningError> {
        let language = normalize_language(&binding.language)?;
        let fields = serde_json::to_string(&binding.fields)?;
        let exists = || {
            SigningError::AlreadyExists(format!("{} cla for language {}", apply_to.as_str(), language))
        };

        let inserted = db
            .exec(
                "INSERT INTO cla_bindings (link_id, apply_to, language, template_id, cla_hash, fields, org_signature, created_at)
                 SELECT l.id, ?2, ?3, t.id, t.content_hash, ?5, ?6, ?7
                 FROM links l JOIN cla_templates t ON t.id = ?4
                 WHERE l.id = ?1 AND l.status = 'ready'
                   AND (?2 = 'individual' OR l.link_type = 'cla')
                   AND NOT EXISTS (
                       SELECT 1 FROM cla_bindings
                       WHERE link_id = ?1 AND apply_to = ?2 AND language = ?3
                   )",
                &[
                    link_id.into(),
                    apply_to.as_str().into(),
                    language.as_str().into(),
                    binding.template_id.as_str().into(),
                    fields.into(),
                    Value::from(binding.org_signature.clone()),
                    self.now_rfc3339().into(),
                ],
            )
            .map_err(|e| conflict_or_storage(e, exists))?;
        if inserted == 1 {
            return Ok(());
        }

        if self.ready_link_type(db, link_id)? == LinkType::Dco && apply_to == ApplyTo::Corporation {
            return Err(SigningError::Validation(
                "a dco link has no corporation document".into(),
            ));
        }
        let template = db.query(
            "SELECT 1 AS x FROM cla_templates WHERE id = ?1",
            &[binding.template_id.as_str().into()],
        )?;
        if template.is_empty() {
            return Err(SigningError::NotFound(format!(
                "cla template {}",
                binding.template_id
            )));
        }
        Err(exists())
    }

    /// Detach a binding. Signing history is keyed by cla_hash and stays.
    ///
    /// A DCO document stays attached while anyone has signed it.
    pub fn remove_binding(
        &self,
        link_id: &str,
        apply_to: ApplyTo,
        language: &str,
    ) -> Result<(), SigningError> {
        let language = normalize_language(language)?;
        let tx = self.sql.begin()?;
        let removed = tx.exec(
            "DELETE FROM cla_bindings
             WHERE link_id = ?1 AND apply_to = ?2 AND language = ?3
               AND NOT (
                   EXISTS (SELECT 1 FROM links l WHERE l.id = ?1 AND l.link_type = 'dco')
                   AND EXISTS (
                       SELECT 1 FROM individual_signings s
                       WHERE s.link_id = ?1 AND s.cla_language = ?3
                         AND s.cla_hash = cla_bindings.cla_hash
                   )
               )",
            &[link_id.into(), apply_to.as_str().into(), language.as_str().into()],
        )?;
        if removed == 0 {
            let bound = tx.query(
                "SELECT 1 AS x FROM cla_bindings WHERE link_id = ?1 AND apply_to = ?2 AND language = ?3",
                &[link_id.into(), apply_to.as_str().into(), language.as_str().into()],
            )?;
            return Err(if bound.is_empty() {
                SigningError::NotFound(format!("{} cla for language {language}", apply_to.as_str()))
            } else {
                SigningError::Validation(format!(
                    "dco for language {language} has signers and cannot be removed"
                ))
            });
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_bindings(&self, link_id: &str) -> Result<Vec<ClaBinding>, SigningError> {
        self.sql
            .query(
                "SELECT link_id, apply_to, language, template_id, cla_hash, fields, org_signature
                 FROM cla_bindings WHERE link_id = ?1 ORDER BY apply_to, language",
                &[link_id.into()],
            )?
            .iter()
            .map(row_to_binding)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::*;
    use crate::model::{CreateLink, OrgRepo};
    use crate::service::testing::test_service;

    fn template(svc: &SigningService) -> ClaTemplate {
        svc.create_template(CreateTemplate {
            title: "CLA".into(),
            url: "https://example.com/cla.pdf".into(),
            content: b"cla body".to_vec(),
        })
        .unwrap()
    }

    fn bare_link(svc: &SigningService) -> String {
        svc.create_link(CreateLink {
            org_repo: OrgRepo::new("github", "org", "repo"),
            org_alias: String::new(),
            org_email: String::new(),
            submitter: "owner".into(),
            individual_cla: None,
            corp_cla: None,
            link_type: LinkType::Cla,
        })
        .unwrap()
    }

    fn binding(template_id: &str, language: &str) -> NewBinding {
        NewBinding {
            template_id: template_id.into(),
            language: language.into(),
            fields: vec![Field {
                id: "1".into(),
                title: "Address".into(),
                kind: "text".into(),
                description: String::new(),
                required: true,
            }],
            org_signature: Some(b"sig".to_vec()),
        }
    }

    #[test]
    fn template_hash_is_sha256_of_content() {
        let h = test_service();
        let t = template(&h.svc);
        assert_eq!(t.content_hash, hex::encode(Sha256::digest(b"cla body")));
        assert_eq!(h.svc.get_template(&t.id).unwrap(), t);
    }

    #[test]
    fn add_has_list_remove() {
        let h = test_service();
        let t = template(&h.svc);
        let link = bare_link(&h.svc);

        h.svc.add_binding(&link, ApplyTo::Individual, &binding(&t.id, "English")).unwrap();
        assert!(h.svc.has_binding(&link, ApplyTo::Individual, "english").unwrap());
        assert!(!h.svc.has_binding(&link, ApplyTo::Corporation, "english").unwrap());

        let listed = h.svc.list_bindings(&link).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].cla_hash, t.content_hash);
        assert_eq!(listed[0].fields[0].kind, "text");
        assert_eq!(listed[0].org_signature.as_deref(), Some(&b"sig"[..]));

        h.svc.remove_binding(&link, ApplyTo::Individual, "english").unwrap();
        assert!(!h.svc.has_binding(&link, ApplyTo::Individual, "english").unwrap());
        assert!(matches!(
            h.svc.remove_binding(&link, ApplyTo::Individual, "english"),
            Err(SigningError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_language_rejected() {
        let h = test_service();
        let t = template(&h.svc);
        let link = bare_link(&h.svc);
        h.svc.add_binding(&link, ApplyTo::Corporation, &binding(&t.id, "english")).unwrap();
        assert!(matches!(
            h.svc.add_binding(&link, ApplyTo::Corporation, &binding(&t.id, "english")),
            Err(SigningError::AlreadyExists(_))
        ));
        h.svc.add_binding(&link, ApplyTo::Corporation, &binding(&t.id, "chinese")).unwrap();
    }

    #[test]
    fn concurrent_add_binding_inserts_once() {
        let h = test_service();
        let t = template(&h.svc);
        let link = bare_link(&h.svc);
        let n = 6;
        let barrier = Arc::new(Barrier::new(n));
        let handles: Vec<_> = (0..n)
            .map(|_| {
                let svc = Arc::clone(&h.svc);
                let barrier = Arc::clone(&barrier);
                let b = binding(&t.id, "english");
                let link = link.clone();
                thread::spawn(move || {
                    barrier.wait();
                    svc.add_binding(&link, ApplyTo::Individual, &b)
                })
            })
            .collect();
        let ok = handles
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(ok, 1);
        assert_eq!(h.svc.list_bindings(&link).unwrap().len(), 1);
    }

    #[test]
    fn add_binding_requires_ready_link_and_template() {
        let h = test_service();
        let t = template(&h.svc);
        let link = bare_link(&h.svc);
        assert!(matches!(
            h.svc.add_binding(&link, ApplyTo::Individual, &binding("missing", "english")),
            Err(SigningError::NotFound(m)) if m.contains("template")
        ));
        h.svc.unlink(&link).unwrap();
        assert!(matches!(
            h.svc.add_binding(&link, ApplyTo::Individual, &binding(&t.id, "english")),
            Err(SigningError::NotFound(m)) if m.contains("link")
        ));
    }

    #[test]
    fn delete_template_only_when_unreferenced() {
        let h = test_service();
        let t = template(&h.svc);
        let link = bare_link(&h.svc);
        h.svc.add_binding(&link, ApplyTo::Individual, &binding(&t.id, "english")).unwrap();

        assert!(matches!(h.svc.delete_template(&t.id), Err(SigningError::Validation(_))));

        h.svc.remove_binding(&link, ApplyTo::Individual, "english").unwrap();
        h.svc.delete_template(&t.id).unwrap();
        assert!(matches!(h.svc.delete_template(&t.id), Err(SigningError::NotFound(_))));
        assert!(h.svc.get_template(&t.id).is_err());
    }
}
