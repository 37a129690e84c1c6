use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::RateWindow;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Permission operations

    fn grant_permission(&self, identity_id: i64, permission: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO identity_permissions (identity_id, permission) VALUES (?1, ?2)",
            params![identity_id, permission],
        )?;
        Ok(())
    }

    fn revoke_permission(&self, identity_id: i64, permission: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM identity_permissions WHERE identity_id = ?1 AND permission = ?2",
            params![identity_id, permission],
        )?;
        Ok(affected > 0)
    }

    fn list_permissions(&self, identity_id: i64) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT permission FROM identity_permissions WHERE identity_id = ?1 ORDER BY permission",
        )?;
        let rows = stmt.query_map(params![identity_id], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<String>, _>>()
            .map_err(Error::from)
    }

    fn has_permission(&self, identity_id: i64, permission: &str) -> Result<bool> {
        let conn = self.conn();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM identity_permissions WHERE identity_id = ?1 AND permission = ?2",
                params![identity_id, permission],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // Rate window operations

    fn get_rate_window(&self, client_key: &str) -> Result<Option<RateWindow>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT client_key, count, reset_at FROM rate_windows WHERE client_key = ?1",
            params![client_key],
            |row| {
                Ok(RateWindow {
                    client_key: row.get(0)?,
                    count: row.get(1)?,
                    reset_at: parse_datetime(&row.get::<_, String>(2)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn put_rate_window(&self, window: &RateWindow) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO rate_windows (client_key, count, reset_at) VALUES (?1, ?2, ?3)",
            params![
                window.client_key,
                window.count,
                format_datetime(&window.reset_at),
            ],
        )?;
        Ok(())
    }

    fn increment_rate_window(&self, client_key: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE rate_windows SET count = count + 1 WHERE client_key = ?1",
            params![client_key],
        )?;
        Ok(())
    }

    fn delete_rate_window(&self, client_key: &str) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM rate_windows WHERE client_key = ?1",
            params![client_key],
        )?;
        Ok(affected > 0)
    }

    fn delete_expired_rate_windows(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM rate_windows WHERE reset_at <= ?1",
            params![format_datetime(&cutoff)],
        )?;
        Ok(affected)
    }
}
