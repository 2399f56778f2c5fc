use clasign_sql::SQLStore;

use crate::service::SigningError;

/// Initialize the SQLite schema for all signing resources.
///
/// Emails, names and answers are stored encrypted. Email columns hold the
/// deterministic ciphertext (hex) so they can be matched; `corp_id` columns
/// hold the keyed digest of the email domain.
pub fn init_schema(sql: &dyn SQLStore) -> Result<(), SigningError> {
    let statements = [
        // Links: at most one ready link per (platform, org, repo).
        "CREATE TABLE IF NOT EXISTS links (
            id TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            org_id TEXT NOT NULL,
            repo_id TEXT NOT NULL DEFAULT '',
            link_type TEXT NOT NULL DEFAULT 'cla',
            org_alias TEXT NOT NULL DEFAULT '',
            org_email TEXT NOT NULL DEFAULT '',
            submitter TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'ready',
            created_at TEXT NOT NULL,
            deleted_at TEXT
        )",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_links_ready
            ON links(platform, org_id, repo_id) WHERE status = 'ready'",

        // CLA documents
        "CREATE TABLE IF NOT EXISTS cla_templates (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            url TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",

        // Bindings: one per (link, apply_to, language)
        "CREATE TABLE IF NOT EXISTS cla_bindings (
            link_id TEXT NOT NULL,
            apply_to TEXT NOT NULL,
            language TEXT NOT NULL,
            template_id TEXT NOT NULL,
            cla_hash TEXT NOT NULL,
            fields TEXT NOT NULL,
            org_signature BLOB,
            created_at TEXT NOT NULL,
            PRIMARY KEY (link_id, apply_to, language),
            FOREIGN KEY (link_id) REFERENCES links(id),
            FOREIGN KEY (template_id) REFERENCES cla_templates(id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_cla_bindings_template ON cla_bindings(template_id)",

        // Individual and employee signings: one per (link, email)
        "CREATE TABLE IF NOT EXISTS individual_signings (
            link_id TEXT NOT NULL,
            email TEXT NOT NULL,
            corp_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            enabled INTEGER NOT NULL,
            cla_language TEXT NOT NULL,
            cla_hash TEXT NOT NULL,
            date TEXT NOT NULL,
            corp_signing_id TEXT,
            pii BLOB NOT NULL,
            privacy_version TEXT NOT NULL,
            link_status TEXT NOT NULL DEFAULT 'ready',
            created_at TEXT NOT NULL,
            PRIMARY KEY (link_id, email)
        )",
        "CREATE INDEX IF NOT EXISTS idx_individual_signings_corp
            ON individual_signings(link_id, corp_id)",
        "CREATE TABLE IF NOT EXISTS individual_signings_deleted (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            link_id TEXT NOT NULL,
            email TEXT NOT NULL,
            corp_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            enabled INTEGER NOT NULL,
            cla_language TEXT NOT NULL,
            cla_hash TEXT NOT NULL,
            date TEXT NOT NULL,
            corp_signing_id TEXT,
            pii BLOB NOT NULL,
            privacy_version TEXT NOT NULL,
            created_at TEXT NOT NULL,
            deleted_at TEXT NOT NULL
        )",

        // Corporate signings: one per (link, admin email)
        "CREATE TABLE IF NOT EXISTS corp_signings (
            id TEXT PRIMARY KEY,
            link_id TEXT NOT NULL,
            admin_email TEXT NOT NULL,
            corp_id TEXT NOT NULL,
            primary_domain TEXT NOT NULL,
            corporation_name TEXT NOT NULL,
            cla_language TEXT NOT NULL,
            cla_hash TEXT NOT NULL,
            date TEXT NOT NULL,
            pii BLOB NOT NULL,
            pdf_uploaded INTEGER NOT NULL DEFAULT 0,
            privacy_version TEXT NOT NULL,
            link_status TEXT NOT NULL DEFAULT 'ready',
            created_at TEXT NOT NULL,
            UNIQUE (link_id, admin_email)
        )",
        "CREATE INDEX IF NOT EXISTS idx_corp_signings_corp ON corp_signings(link_id, corp_id)",
        "CREATE TABLE IF NOT EXISTS corp_signings_deleted (
            id TEXT PRIMARY KEY,
            link_id TEXT NOT NULL,
            admin_email TEXT NOT NULL,
            corp_id TEXT NOT NULL,
            primary_domain TEXT NOT NULL,
            corporation_name TEXT NOT NULL,
            cla_language TEXT NOT NULL,
            cla_hash TEXT NOT NULL,
            date TEXT NOT NULL,
            pii BLOB NOT NULL,
            pdf_uploaded INTEGER NOT NULL,
            privacy_version TEXT NOT NULL,
            roster TEXT NOT NULL,
            created_at TEXT NOT NULL,
            deleted_at TEXT NOT NULL
        )",

        // Approved email domains of a corporate signing
        "CREATE TABLE IF NOT EXISTS corp_email_domains (
            signing_id TEXT NOT NULL,
            domain TEXT NOT NULL,
            corp_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (signing_id, domain),
            FOREIGN KEY (signing_id) REFERENCES corp_signings(id) ON DELETE CASCADE
        )",
        "CREATE INDEX IF NOT EXISTS idx_corp_email_domains_corp ON corp_email_domains(corp_id)",

        // Manager roster: exactly one admin per corporate signing
        "CREATE TABLE IF NOT EXISTS corp_managers (
            signing_id TEXT NOT NULL,
            id TEXT NOT NULL,
            link_id TEXT NOT NULL,
            email TEXT NOT NULL,
            corp_id TEXT NOT NULL,
            role TEXT NOT NULL,
            name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            password_changed INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            PRIMARY KEY (signing_id, id),
            UNIQUE (signing_id, email),
            FOREIGN KEY (signing_id) REFERENCES corp_signings(id) ON DELETE CASCADE
        )",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_corp_managers_admin
            ON corp_managers(signing_id) WHERE role = 'admin'",
        "CREATE INDEX IF NOT EXISTS idx_corp_managers_link_email ON corp_managers(link_id, email)",

        // Verification codes: one live code per (email, purpose)
        "CREATE TABLE IF NOT EXISTS verification_codes (
            email TEXT NOT NULL,
            purpose TEXT NOT NULL,
            code TEXT NOT NULL,
            expiry INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (email, purpose)
        )",
        "CREATE INDEX IF NOT EXISTS idx_verification_codes_expiry ON verification_codes(expiry)",

        // Login misses: one per (link, account)
        "CREATE TABLE IF NOT EXISTS login_misses (
            link_id TEXT NOT NULL,
            account TEXT NOT NULL,
            miss_count INTEGER NOT NULL,
            lock_until INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (link_id, account)
        )",

        // Latest privacy statement each platform account agreed to
        "CREATE TABLE IF NOT EXISTS privacy_consents (
            account TEXT NOT NULL,
            platform TEXT NOT NULL,
            version TEXT NOT NULL,
            consented_at TEXT NOT NULL,
            PRIMARY KEY (account, platform)
        )",

        // Authorized organization emails
        "CREATE TABLE IF NOT EXISTS org_emails (
            email TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            token BLOB NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ];

    for stmt in &statements {
        sql.exec(stmt, &[])?;
    }

    Ok(())
}
