use rusqlite::Connection;
use crate::errors::LanternError;
use crate::models::{LogLine, LogStream};
use super::connection::parse_ts;
use super::Database;

/// Lines already flushed keep their first copy; `seq` makes the write idempotent.
pub(crate) fn insert_log_lines(conn: &Connection, job_id: &str, lines: &[LogLine]) -> Result<(), LanternError> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO job_logs (job_id, seq, ts, tool, stream, text) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
    ).map_err(|e| LanternError::Storage(format!("Failed to prepare log insert: {}", e)))?;
    for line in lines {
        stmt.execute(rusqlite::params![
            job_id,
            line.seq as i64,
            line.ts.to_rfc3339(),
            line.tool,
            line.stream.as_str(),
            line.text,
        ]).map_err(|e| LanternError::Storage(format!("Failed to insert log line: {}", e)))?;
    }
    Ok(())
}

impl Database {
    pub fn append_log(&self, job_id: &str, lines: &[LogLine]) -> Result<(), LanternError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        insert_log_lines(&tx, job_id, lines)?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_log(&self, job_id: &str) -> Result<Vec<LogLine>, LanternError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT seq, ts, tool, stream, text FROM job_logs WHERE job_id = ?1 ORDER BY seq"
        ).map_err(|e| LanternError::Storage(format!("Query failed: {}", e)))?;

        let rows = stmt.query_map(rusqlite::params![job_id], |row: &rusqlite::Row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        }).map_err(|e| LanternError::Storage(format!("Query error: {}", e)))?;

        let mut lines = Vec::new();
        for row in rows {
            let (seq, ts, tool, stream, text) =
                row.map_err(|e| LanternError::Storage(format!("Row error: {}", e)))?;
            lines.push(LogLine {
                seq: seq as u64,
                ts: parse_ts(&ts)?,
                tool,
                stream: LogStream::parse(&stream),
                text,
            });
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn line(seq: u64, text: &str) -> LogLine {
        LogLine { seq, ts: Utc::now(), tool: "nmap".into(), stream: LogStream::Stdout, text: text.into() }
    }

    #[test]
    fn test_incremental_flush_is_idempotent() {
        let db = Database::in_memory().unwrap();
        db.append_log("job-1", &[line(0, "a"), line(1, "b")]).unwrap();
        db.append_log("job-1", &[line(1, "b"), line(2, "c")]).unwrap();
        db.append_log("job-2", &[line(0, "other")]).unwrap();

        let lines = db.get_log("job-1").unwrap();
        let texts: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
        assert_eq!(lines[2].seq, 2);
        assert!(db.get_log("missing").unwrap().is_empty());
    }
}
