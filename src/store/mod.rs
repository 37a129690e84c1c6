mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::RateWindow;

/// Store defines the durable control-plane interface: permission sets and
/// rate windows. It is re-read on every check; there is no in-memory
/// singleton in front of it.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Permission operations. A permission set springs into existence with its
    // first grant and disappears when the last row is revoked.
    fn grant_permission(&self, identity_id: i64, permission: &str) -> Result<()>;
    fn revoke_permission(&self, identity_id: i64, permission: &str) -> Result<bool>;
    fn list_permissions(&self, identity_id: i64) -> Result<Vec<String>>;
    fn has_permission(&self, identity_id: i64, permission: &str) -> Result<bool>;

    // Rate window operations
    fn get_rate_window(&self, client_key: &str) -> Result<Option<RateWindow>>;
    /// Inserts the window, replacing any previous row for the same key.
    fn put_rate_window(&self, window: &RateWindow) -> Result<()>;
    /// Increments the count in place, leaving `reset_at` untouched.
    fn increment_rate_window(&self, client_key: &str) -> Result<()>;
    fn delete_rate_window(&self, client_key: &str) -> Result<bool>;
    fn delete_expired_rate_windows(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}
