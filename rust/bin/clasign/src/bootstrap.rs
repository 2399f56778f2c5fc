//! Bootstrap: config checks and store wiring.
//!
//! Every command:
//! 1. Verifies the config: data dir set, both keys decode to 32 bytes.
//! 2. Opens SQLite, redb and the blob directory under the data dir.
//! 3. Builds the signing service, which initializes its schema.

use std::path::PathBuf;
use std::sync::Arc;

use clasign_core::ServiceConfig;
use clasign_crypto::{decode_key, random_bytes, KEY_LEN};
use signing::{CryptoSuite, SigningService};
use tracing::info;

use crate::config::{CryptoConfig, ServerConfig, SigningSection, StorageConfig};

/// Verify the configuration before any store is touched.
pub fn verify_config(config: &ServerConfig) -> anyhow::Result<()> {
    if config.storage.data_dir.is_empty() {
        anyhow::bail!("Storage data_dir is empty in configuration.");
    }
    decode_key(&config.crypto.encryption_key)
        .map_err(|e| anyhow::anyhow!("crypto.encryption_key: {}", e))?;
    decode_key(&config.crypto.corp_id_key)
        .map_err(|e| anyhow::anyhow!("crypto.corp_id_key: {}", e))?;
    if config.crypto.encryption_key.trim() == config.crypto.corp_id_key.trim() {
        anyhow::bail!("crypto.encryption_key and crypto.corp_id_key must differ.");
    }
    let signing = config.signing_config();
    if signing.code_ttl == 0 {
        anyhow::bail!("signing.code_ttl must be positive.");
    }
    if signing.max_login_failures < 1 {
        anyhow::bail!("signing.max_login_failures must be at least 1.");
    }
    Ok(())
}

/// A fresh config with newly generated keys.
pub fn generate_config(data_dir: &str) -> ServerConfig {
    ServerConfig {
        storage: StorageConfig {
            data_dir: data_dir.to_string(),
        },
        crypto: CryptoConfig {
            encryption_key: hex::encode(random_bytes(KEY_LEN)),
            corp_id_key: hex::encode(random_bytes(KEY_LEN)),
        },
        signing: SigningSection::default(),
    }
}

/// Open the stores and build the signing service.
pub fn open_service(config: &ServerConfig) -> anyhow::Result<Arc<SigningService>> {
    let data_dir = PathBuf::from(&config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;
    let paths = ServiceConfig {
        data_dir: Some(data_dir),
        ..Default::default()
    };

    let sql: Arc<dyn clasign_sql::SQLStore> = Arc::new(
        clasign_sql::SqliteStore::open(&paths.resolve_sqlite_path())
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );
    let kv: Arc<dyn clasign_kv::KVStore> = Arc::new(
        clasign_kv::RedbStore::open(&paths.resolve_db_path())
            .map_err(|e| anyhow::anyhow!("failed to open KV store: {}", e))?,
    );
    let blob: Arc<dyn clasign_blob::BlobStore> = Arc::new(
        clasign_blob::FileStore::open(&paths.resolve_blob_dir())
            .map_err(|e| anyhow::anyhow!("failed to open blob store: {}", e))?,
    );

    let crypto = CryptoSuite::from_keys(
        &decode_key(&config.crypto.encryption_key)?,
        &decode_key(&config.crypto.corp_id_key)?,
    )?;
    let svc = SigningService::new(sql, kv, blob, crypto, config.signing_config())?;
    info!("Signing service ready at {}", config.storage.data_dir);
    Ok(svc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_config_verifies() {
        let config = generate_config("/tmp/clasign");
        verify_config(&config).unwrap();
        assert_ne!(config.crypto.encryption_key, config.crypto.corp_id_key);
    }

    #[test]
    fn verify_config_rejects_bad_keys() {
        let mut config = generate_config("/tmp/clasign");
        config.crypto.corp_id_key = "abcd".into();
        assert!(verify_config(&config).is_err());

        let mut config = generate_config("/tmp/clasign");
        config.crypto.corp_id_key = config.crypto.encryption_key.clone();
        assert!(verify_config(&config).is_err());
    }

    #[test]
    fn verify_config_empty_data_dir() {
        let config = generate_config("");
        assert!(verify_config(&config).is_err());
    }

    #[test]
    fn open_service_creates_stores() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let config = generate_config(data.to_str().unwrap());
        let svc = open_service(&config).unwrap();
        assert!(svc.list_all_links().unwrap().is_empty());
        assert!(data.join("signing.sqlite").exists());
        assert!(data.join("limiter.redb").exists());
    }
}
