use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use crate::errors::LanternError;

pub struct Database {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn new(path: &str) -> Result<Self, LanternError> {
        // Ensure parent directory exists
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| LanternError::Storage(format!("Failed to open database: {}", e)))?;

        // WAL lets readers (exports, log queries) proceed while a job finalizes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
            .map_err(|e| LanternError::Storage(format!("Failed to set pragmas: {}", e)))?;

        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.initialize()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self, LanternError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| LanternError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        let db = Self { conn: Arc::new(Mutex::new(conn)) };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> Result<(), LanternError> {
        let conn = self.lock()?;
        conn.execute_batch(super::schema::CREATE_TABLES)
            .map_err(|e| LanternError::Storage(format!("Failed to create tables: {}", e)))?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, LanternError> {
        self.conn
            .lock()
            .map_err(|_| LanternError::Storage("database connection lock poisoned".into()))
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self { conn: self.conn.clone() }
    }
}

/// Timestamps are stored as RFC 3339 text.
pub(crate) fn parse_ts(value: &str) -> Result<chrono::DateTime<chrono::Utc>, LanternError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| LanternError::Storage(format!("Bad timestamp '{}': {}", value, e)))
}

pub(crate) fn parse_opt_ts(
    value: Option<String>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, LanternError> {
    value.as_deref().map(parse_ts).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_database_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/lantern.db");
        let db = Database::new(path.to_str().unwrap()).unwrap();
        assert!(path.exists());
        let count: i64 = db
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_parse_ts_roundtrip() {
        let now = chrono::Utc::now();
        let parsed = parse_ts(&now.to_rfc3339()).unwrap();
        assert_eq!(parsed, now);
        assert!(parse_ts("yesterday").is_err());
    }
}
