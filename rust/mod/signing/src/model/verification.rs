use serde::{Deserialize, Serialize};

/// A freshly issued verification code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedCode {
    pub code: String,
    /// Unix seconds; the code is invalid from this instant on.
    pub expiry: i64,
}
