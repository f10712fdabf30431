//! Persistent menu cache backed by SQLite.
//!
//! One table keyed by vendor code holding the serialized normalized menu
//! and its creation timestamp. Expiration is lazy: staleness is evaluated
//! at read time against the TTL and an expired row is simply a miss — it
//! stays on disk until the next successful fetch for the same code
//! overwrites it. Writes are unconditional full-row upserts, so concurrent
//! duplicate writes for one code are benign (last write wins).

use crate::error::ScrapeError;
use crate::model::VendorMenu;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// TTL-expiring vendor menu store.
pub struct MenuCache {
    conn: Mutex<Connection>,
    ttl: chrono::Duration,
}

impl MenuCache {
    /// Open or create the cache at `path`.
    pub fn open(path: &Path, ttl: Duration) -> Result<Self, ScrapeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?, ttl)
    }

    /// In-memory cache, used by tests and ephemeral deployments.
    pub fn in_memory(ttl: Duration) -> Result<Self, ScrapeError> {
        Self::from_connection(Connection::open_in_memory()?, ttl)
    }

    fn from_connection(conn: Connection, ttl: Duration) -> Result<Self, ScrapeError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS vendor_menus (
                vendor_code TEXT PRIMARY KEY,
                menu_json   TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(24)),
        })
    }

    /// Look up a fresh cached menu. An expired row is a miss, not an error.
    pub fn get(&self, code: &str) -> Result<Option<VendorMenu>, ScrapeError> {
        let conn = self.conn.lock().expect("cache lock poisoned");
        let mut stmt =
            conn.prepare("SELECT menu_json, created_at FROM vendor_menus WHERE vendor_code = ?1")?;

        let row = stmt.query_row(rusqlite::params![code], |row| {
            let menu_json: String = row.get(0)?;
            let created_at: String = row.get(1)?;
            Ok((menu_json, created_at))
        });

        let (menu_json, created_at) = match row {
            Ok(pair) => pair,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            // An unparseable timestamp is treated as stale.
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        if Utc::now() - created_at >= self.ttl {
            tracing::debug!(vendor = code, "cache entry expired");
            return Ok(None);
        }

        let menu: VendorMenu = serde_json::from_str(&menu_json)?;
        Ok(Some(menu))
    }

    /// Upsert the menu for `code`, replacing any prior row and resetting
    /// its creation timestamp to now.
    pub fn set(&self, code: &str, menu: &VendorMenu) -> Result<(), ScrapeError> {
        let menu_json = serde_json::to_string(menu)?;
        let conn = self.conn.lock().expect("cache lock poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO vendor_menus (vendor_code, menu_json, created_at)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![code, menu_json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Cheap availability probe: fails if the store is unusable.
    pub fn ping(&self) -> Result<(), ScrapeError> {
        let conn = self.conn.lock().expect("cache lock poisoned");
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    /// Number of rows on disk, including expired ones.
    pub fn len(&self) -> Result<usize, ScrapeError> {
        let conn = self.conn.lock().expect("cache lock poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM vendor_menus", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, ScrapeError> {
        Ok(self.len()? == 0)
    }

    /// Rewrite a row's creation timestamp. Test hook for expiry scenarios.
    #[cfg(test)]
    pub(crate) fn backdate(&self, code: &str, created_at: DateTime<Utc>) {
        let conn = self.conn.lock().expect("cache lock poisoned");
        conn.execute(
            "UPDATE vendor_menus SET created_at = ?2 WHERE vendor_code = ?1",
            rusqlite::params![code, created_at.to_rfc3339()],
        )
        .expect("backdate failed");
    }
}
