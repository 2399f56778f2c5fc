pub mod error;
mod retry;
pub mod sqlite;
pub mod traits;

pub use error::SQLError;
pub use sqlite::SqliteStore;
pub use traits::{Row, SQLExecutor, SQLStore, SQLTransaction, Value};
