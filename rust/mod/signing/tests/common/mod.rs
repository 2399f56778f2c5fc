//! Service wiring shared by the integration tests: a file-backed SQLite
//! database, redb and a filesystem object store under one temp dir.
//! `workers` opens several services over the same files.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clasign_blob::FileStore;
use clasign_crypto::{AesGcmEncryption, Argon2Hasher, DigitCode, HmacCorpId};
use clasign_kv::RedbStore;
use clasign_sql::SqliteStore;
use signing::model::{
    CorpSigningInput, CreateLink, CreateTemplate, IndividualSigningInput, LinkType, NewBinding,
    OrgRepo,
};
use signing::{CryptoSuite, ManualClock, SigningConfig, SigningService};

pub const START: i64 = 1_700_000_000;

pub struct Env {
    pub svc: Arc<SigningService>,
    pub clock: Arc<ManualClock>,
    _dir: tempfile::TempDir,
}

fn crypto() -> CryptoSuite {
    CryptoSuite {
        encryption: Arc::new(AesGcmEncryption::new(&[7u8; 32]).unwrap()),
        corp_id: Arc::new(HmacCorpId::new(&[9u8; 32]).unwrap()),
        passwords: Arc::new(Argon2Hasher::with_cost(64, 1).unwrap()),
        codes: Arc::new(DigitCode::default()),
    }
}

pub fn env_with(config: SigningConfig) -> Env {
    let dir = tempfile::tempdir().unwrap();
    let sql = Arc::new(SqliteStore::open(&dir.path().join("signing.db")).unwrap());
    let kv = Arc::new(RedbStore::open(&dir.path().join("kv.redb")).unwrap());
    let blob = Arc::new(FileStore::open(&dir.path().join("objects")).unwrap());
    let clock = Arc::new(ManualClock::new(START));
    let svc = SigningService::with_clock(sql, kv, blob, crypto(), config, clock.clone()).unwrap();
    Env {
        svc,
        clock,
        _dir: dir,
    }
}

/// Independent service instances over one database file, each with its own
/// SQLite connection. They share the KV and object stores, as separate
/// processes sharing those backends would.
pub struct Workers {
    pub svcs: Vec<Arc<SigningService>>,
    pub clock: Arc<ManualClock>,
    pub db_path: PathBuf,
    _dir: tempfile::TempDir,
}

pub fn workers(n: usize, config: SigningConfig) -> Workers {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("signing.db");
    let kv: Arc<RedbStore> = Arc::new(RedbStore::open(&dir.path().join("kv.redb")).unwrap());
    let blob: Arc<FileStore> = Arc::new(FileStore::open(&dir.path().join("objects")).unwrap());
    let clock = Arc::new(ManualClock::new(START));
    let svcs = (0..n)
        .map(|_| {
            let sql = Arc::new(SqliteStore::open(&db_path).unwrap());
            SigningService::with_clock(
                sql,
                kv.clone(),
                blob.clone(),
                crypto(),
                config.clone(),
                clock.clone(),
            )
            .unwrap()
        })
        .collect();
    Workers {
        svcs,
        clock,
        db_path,
        _dir: dir,
    }
}

pub fn env() -> Env {
    env_with(SigningConfig::default())
}

pub fn link_input(org: &str, repo: &str, template_id: Option<&str>) -> CreateLink {
    let binding = |id: &str| NewBinding {
        template_id: id.to_string(),
        language: "english".into(),
        fields: vec![],
        org_signature: None,
    };
    CreateLink {
        org_repo: OrgRepo::new("github", org, repo),
        org_alias: org.into(),
        org_email: "cla@org.io".into(),
        submitter: "owner".into(),
        individual_cla: template_id.map(binding),
        corp_cla: template_id.map(binding),
        link_type: LinkType::Cla,
    }
}

/// A ready link with English individual and corporation CLAs.
pub fn ready_link(svc: &SigningService) -> String {
    let template = svc
        .create_template(CreateTemplate {
            title: "CLA".into(),
            url: "https://example.com/cla.pdf".into(),
            content: b"contributor license agreement".to_vec(),
        })
        .unwrap();
    svc.create_link(link_input("orgX", "repoY", Some(&template.id)))
        .unwrap()
}

pub fn individual(email: &str) -> IndividualSigningInput {
    IndividualSigningInput {
        email: email.into(),
        name: "Signer".into(),
        date: "2024-05-01".into(),
        cla_language: "english".into(),
        privacy_version: "2024-01".into(),
        info: Default::default(),
    }
}

pub fn corporate(admin: &str, corporation: &str) -> CorpSigningInput {
    CorpSigningInput {
        cla_language: "english".into(),
        admin_email: admin.into(),
        admin_name: "Admin".into(),
        corporation_name: corporation.into(),
        date: "2024-05-01".into(),
        privacy_version: "2024-01".into(),
        info: Default::default(),
    }
}
