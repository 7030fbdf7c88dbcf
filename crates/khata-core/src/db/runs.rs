//! Ingestion run summary operations

use rusqlite::{params, OptionalExtension, Row};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::{NewRunSummary, RunStatus, RunSummary};

impl Database {
    /// Persist a run summary
    ///
    /// Callers treat failure here as best-effort: it is logged, never
    /// surfaced, and never changes an already-computed ingest response.
    pub fn insert_run(&self, run: &NewRunSummary) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO ingestion_runs
                (user_id, total, inserted, skipped, errors, status, duration_ms, input, outcomes)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                run.user_id,
                run.total,
                run.inserted,
                run.skipped,
                run.errors,
                run.status.as_str(),
                run.duration_ms,
                run.input,
                run.outcomes,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get a single run summary by ID
    pub fn get_run(&self, id: i64) -> Result<Option<RunSummary>> {
        let conn = self.conn()?;
        let result = conn
            .query_row(
                &format!("{} WHERE id = ?", SELECT_RUN),
                params![id],
                map_run_row,
            )
            .optional()?;
        Ok(result)
    }

    /// List a user's run summaries, newest first
    pub fn list_runs(&self, user_id: i64, limit: i64) -> Result<Vec<RunSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE user_id = ? ORDER BY id DESC LIMIT ?",
            SELECT_RUN
        ))?;

        let runs = stmt
            .query_map(params![user_id, limit], map_run_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(runs)
    }
}

const SELECT_RUN: &str = r#"
    SELECT id, user_id, total, inserted, skipped, errors, status,
           duration_ms, input, outcomes, created_at
    FROM ingestion_runs
"#;

fn map_run_row(row: &Row<'_>) -> rusqlite::Result<RunSummary> {
    let status_str: String = row.get(6)?;
    let created_at_str: String = row.get(10)?;

    Ok(RunSummary {
        id: row.get(0)?,
        user_id: row.get(1)?,
        total: row.get(2)?,
        inserted: row.get(3)?,
        skipped: row.get(4)?,
        errors: row.get(5)?,
        status: status_str.parse().unwrap_or(RunStatus::Failed),
        duration_ms: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        input: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        outcomes: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
        created_at: parse_datetime(&created_at_str),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_run(user_id: i64) -> NewRunSummary {
        NewRunSummary {
            user_id,
            total: 3,
            inserted: 2,
            skipped: 1,
            errors: 0,
            status: RunStatus::Success,
            duration_ms: 742,
            input: r#"[{"id":1}]"#.to_string(),
            outcomes: r#"[{"sms_id":1,"outcome":"inserted"}]"#.to_string(),
        }
    }

    #[test]
    fn test_insert_and_get_run() {
        let db = Database::in_memory().unwrap();
        let user = db.create_user("k", None).unwrap();

        let id = db.insert_run(&sample_run(user)).unwrap();
        let run = db.get_run(id).unwrap().unwrap();

        assert_eq!(run.total, 3);
        assert_eq!(run.inserted, 2);
        assert_eq!(run.skipped, 1);
        assert_eq!(run.status, RunStatus::Success);
        assert!(run.input.contains("\"id\":1"));
    }

    #[test]
    fn test_list_runs_newest_first() {
        let db = Database::in_memory().unwrap();
        let user = db.create_user("k", None).unwrap();

        let first = db.insert_run(&sample_run(user)).unwrap();
        let second = db.insert_run(&sample_run(user)).unwrap();

        let runs = db.list_runs(user, 10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second);
        assert_eq!(runs[1].id, first);
    }
}
