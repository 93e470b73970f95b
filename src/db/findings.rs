use rusqlite::Connection;
use crate::errors::LanternError;
use crate::models::{Finding, Severity, ToolKind};
use super::connection::parse_ts;
use super::Database;

/// Insert a job's findings in discovery order. Runs on the caller's
/// connection so it can join the finalization transaction.
pub(crate) fn insert_findings(conn: &Connection, job_id: &str, findings: &[Finding]) -> Result<(), LanternError> {
    conn.execute("DELETE FROM findings WHERE job_id = ?1", rusqlite::params![job_id])
        .map_err(|e| LanternError::Storage(format!("Failed to clear findings: {}", e)))?;
    let mut stmt = conn.prepare(
        "INSERT INTO findings (job_id, position, tool, severity, target, title, description, raw, discovered_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
    ).map_err(|e| LanternError::Storage(format!("Failed to prepare finding insert: {}", e)))?;
    for (position, finding) in findings.iter().enumerate() {
        stmt.execute(rusqlite::params![
            job_id,
            position as i64,
            finding.tool.as_str(),
            finding.severity.as_str(),
            finding.target,
            finding.title,
            finding.description,
            finding.raw.to_string(),
            finding.discovered_at.to_rfc3339(),
        ]).map_err(|e| LanternError::Storage(format!("Failed to insert finding: {}", e)))?;
    }
    Ok(())
}

impl Database {
    pub fn get_findings(&self, job_id: &str) -> Result<Vec<Finding>, LanternError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT tool, severity, target, title, description, raw, discovered_at FROM findings WHERE job_id = ?1 ORDER BY position"
        ).map_err(|e| LanternError::Storage(format!("Query failed: {}", e)))?;

        let rows = stmt.query_map(rusqlite::params![job_id], |row: &rusqlite::Row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        }).map_err(|e| LanternError::Storage(format!("Query error: {}", e)))?;

        let mut findings = Vec::new();
        for row in rows {
            let (tool, severity, target, title, description, raw, discovered_at) =
                row.map_err(|e| LanternError::Storage(format!("Row error: {}", e)))?;
            let tool = ToolKind::parse(&tool)
                .ok_or_else(|| LanternError::Storage(format!("Unknown tool '{}' in findings", tool)))?;
            findings.push(Finding {
                tool,
                severity: Severity::from_label(&severity).unwrap_or(Severity::Info),
                target,
                title,
                description: description.unwrap_or_default(),
                raw: serde_json::from_str(&raw).unwrap_or(serde_json::Value::Null),
                discovered_at: parse_ts(&discovered_at)?,
            });
        }
        Ok(findings)
    }
}
