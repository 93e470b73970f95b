use chrono::{DateTime, Utc};
use crate::errors::LanternError;
use crate::models::{NewScanDefinition, ScanDefinition};
use super::connection::{parse_opt_ts, parse_ts};
use super::Database;

type DefinitionRow = (i64, String, String, String, Option<String>, String, Option<String>);

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<DefinitionRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?))
}

fn decode(row: DefinitionRow) -> Result<ScanDefinition, LanternError> {
    let (id, name, policy, targets, cron, created_at, last_fired_at) = row;
    Ok(ScanDefinition {
        id,
        name,
        policy: serde_json::from_str(&policy)?,
        targets: serde_json::from_str(&targets)?,
        cron,
        created_at: parse_ts(&created_at)?,
        last_fired_at: parse_opt_ts(last_fired_at)?,
    })
}

impl Database {
    pub fn create_definition(&self, def: &NewScanDefinition) -> Result<ScanDefinition, LanternError> {
        let created_at = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO scan_definitions (name, policy, targets, cron, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                def.name,
                serde_json::to_string(&def.policy)?,
                serde_json::to_string(&def.targets)?,
                def.cron,
                created_at.to_rfc3339(),
            ],
        ).map_err(|e| LanternError::Storage(format!("Failed to create definition: {}", e)))?;
        Ok(ScanDefinition {
            id: conn.last_insert_rowid(),
            name: def.name.clone(),
            policy: def.policy.clone(),
            targets: def.targets.clone(),
            cron: def.cron.clone(),
            created_at,
            last_fired_at: None,
        })
    }

    pub fn get_definition(&self, id: i64) -> Result<Option<ScanDefinition>, LanternError> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT id, name, policy, targets, cron, created_at, last_fired_at FROM scan_definitions WHERE id = ?1",
            rusqlite::params![id],
            read_row,
        );
        match result {
            Ok(row) => Ok(Some(decode(row)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(LanternError::Storage(format!("Query error: {}", e))),
        }
    }

    pub fn list_definitions(&self) -> Result<Vec<ScanDefinition>, LanternError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, policy, targets, cron, created_at, last_fired_at FROM scan_definitions ORDER BY id"
        ).map_err(|e| LanternError::Storage(format!("Query failed: {}", e)))?;
        let rows = stmt.query_map([], read_row)
            .map_err(|e| LanternError::Storage(format!("Query error: {}", e)))?;
        let mut defs = Vec::new();
        for row in rows {
            let row = row.map_err(|e| LanternError::Storage(format!("Row error: {}", e)))?;
            defs.push(decode(row)?);
        }
        Ok(defs)
    }

    /// Record the due instant a definition last fired for. Never moves backwards.
    pub fn set_definition_fired(&self, id: i64, at: DateTime<Utc>) -> Result<(), LanternError> {
        let conn = self.lock()?;
        let current: Option<String> = conn
            .query_row(
                "SELECT last_fired_at FROM scan_definitions WHERE id = ?1",
                rusqlite::params![id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => LanternError::NotFound(format!("definition {}", id)),
                e => LanternError::Storage(format!("Query error: {}", e)),
            })?;
        if let Some(previous) = parse_opt_ts(current)? {
            if previous >= at {
                return Ok(());
            }
        }
        conn.execute(
            "UPDATE scan_definitions SET last_fired_at = ?2 WHERE id = ?1",
            rusqlite::params![id, at.to_rfc3339()],
        ).map_err(|e| LanternError::Storage(format!("Update failed: {}", e)))?;
        Ok(())
    }
}
