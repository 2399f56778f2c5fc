use serde::{Deserialize, Serialize};

/// Failed-login state for one (link, account).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginMiss {
    pub miss_count: i64,
    /// Unix seconds the lockout ends; `None` while not locked.
    pub lock_until: Option<i64>,
}
