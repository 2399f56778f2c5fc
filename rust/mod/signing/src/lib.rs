//! Signing module: the consistency and identity-record core of CLA signing.
//!
//! # Resources
//!
//! - **Link** - (platform, org, repo) binding; root scope of all signing data
//! - **CLA template / binding** - documents attached to a link per (apply_to, language)
//! - **Individual signing** - one per (link, email); individuals and employees
//! - **Corporate signing** - one per (link, admin email) with approved email domains
//! - **Corporate manager** - roster of one admin and N managers per corporate signing
//! - **Verification code** - one live code per (email, purpose)
//! - **Login miss** - failed-login counter and lockout window per (link, account)
//!
//! PII (emails, names, answers, tokens) is encrypted before it reaches the
//! store. Emails use deterministic encryption so they stay matchable; email
//! domains are grouped by their keyed corpID tag.
//!
//! # Usage
//!
//! ```ignore
//! use signing::service::{CryptoSuite, SigningConfig, SigningService};
//!
//! let crypto = CryptoSuite::from_keys(&enc_key, &corp_key)?;
//! let svc = SigningService::new(sql, kv, blob, crypto, SigningConfig::default())?;
//! let link_id = svc.create_link(input)?;
//! ```

pub mod clock;
pub mod model;
pub mod notify;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use service::{CryptoSuite, SigningConfig, SigningError, SigningService};
