use tracing::{debug, info, warn};

use crate::model::LoginMiss;
use crate::service::{SigningError, SigningService};

impl SigningService {
    /// Count a failed login for `account` under the link.
    ///
    /// A single upsert increments the count and, when it reaches the
    /// configured threshold, sets the lockout. A failure after an expired
    /// lockout, or more than one penalty window after the previous failure,
    /// starts a new count.
    pub fn record_failure(&self, link_id: &str, account: &str) -> Result<LoginMiss, SigningError> {
        let now = self.now();
        let rows = self.sql.query(
            "INSERT INTO login_misses (link_id, account, miss_count, lock_until, updated_at)
             VALUES (?1, ?2, 1, CASE WHEN 1 >= ?4 THEN ?3 + ?5 ELSE 0 END, ?3)
             ON CONFLICT (link_id, account) DO UPDATE SET
                 miss_count = CASE
                     WHEN lock_until > ?3 THEN miss_count + 1
                     WHEN lock_until != 0 OR updated_at + ?5 <= ?3 THEN 1
                     ELSE miss_count + 1
                 END,
                 lock_until = CASE
                     WHEN lock_until > ?3 THEN lock_until
                     WHEN lock_until != 0 OR updated_at + ?5 <= ?3 THEN
                         CASE WHEN 1 >= ?4 THEN ?3 + ?5 ELSE 0 END
                     WHEN miss_count + 1 >= ?4 THEN ?3 + ?5
                     ELSE 0
                 END,
                 updated_at = ?3
             RETURNING miss_count, lock_until",
            &[
                link_id.into(),
                account.into(),
                now.into(),
                self.config.max_login_failures.into(),
                (self.config.lockout_penalty as i64).into(),
            ],
        )?;
        let row = rows
            .first()
            .ok_or_else(|| SigningError::Internal("login miss upsert returned no row".into()))?;
        let miss = LoginMiss {
            miss_count: row.get_i64("miss_count").unwrap_or(0),
            lock_until: row.get_i64("lock_until").filter(|&until| until > now),
        };
        match miss.lock_until {
            Some(until) => warn!(link_id, miss_count = miss.miss_count, until, "login locked"),
            None => debug!(link_id, miss_count = miss.miss_count, "login failure recorded"),
        }
        Ok(miss)
    }

    /// Unlock time when `account` is locked out right now.
    pub fn is_locked(&self, link_id: &str, account: &str) -> Result<Option<i64>, SigningError> {
        let rows = self.sql.query(
            "SELECT lock_until FROM login_misses WHERE link_id = ?1 AND account = ?2",
            &[link_id.into(), account.into()],
        )?;
        let now = self.now();
        Ok(rows
            .first()
            .and_then(|r| r.get_i64("lock_until"))
            .filter(|&until| until > now))
    }

    /// Forget the failures of `account`, typically after a successful login.
    pub fn reset(&self, link_id: &str, account: &str) -> Result<(), SigningError> {
        self.sql.exec(
            "DELETE FROM login_misses WHERE link_id = ?1 AND account = ?2",
            &[link_id.into(), account.into()],
        )?;
        Ok(())
    }

    /// Delete records that no longer affect anything: the lock, if any, has
    /// expired and the last failure is older than one penalty window.
    pub fn purge_login_misses(&self) -> Result<u64, SigningError> {
        let purged = self.sql.exec(
            "DELETE FROM login_misses WHERE lock_until <= ?1 AND updated_at + ?2 <= ?1",
            &[self.now().into(), (self.config.lockout_penalty as i64).into()],
        )?;
        if purged > 0 {
            info!(purged, "stale login misses purged");
        }
        Ok(purged)
    }
}
