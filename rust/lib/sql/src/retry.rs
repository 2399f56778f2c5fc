use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::SQLError;

/// Attempts made for a statement that keeps failing with `SQLError::Busy`.
pub(crate) const MAX_ATTEMPTS: u32 = 3;

/// Delay before the second attempt; doubled for each further attempt.
pub(crate) const BASE_DELAY: Duration = Duration::from_millis(20);

/// Run `op`, retrying only transient busy/locked failures with bounded
/// exponential backoff. Every other error is returned immediately.
pub(crate) fn with_backoff<T, F>(what: &str, mut op: F) -> Result<T, SQLError>
where
    F: FnMut() -> Result<T, SQLError>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Err(SQLError::Busy(msg)) if attempt < MAX_ATTEMPTS => {
                let delay = BASE_DELAY * 2u32.pow(attempt - 1);
                debug!("{what}: database busy ({msg}), retry {attempt} in {delay:?}");
                thread::sleep(delay);
                attempt += 1;
            }
            other => return other,
        }
    }
}
