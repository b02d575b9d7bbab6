//! SQLite persistence of finished runs.
//!
//! RULE: Only store.rs talks to the database.
//! The simulation never reads from it; runs are written once, after they end.

use rusqlite::{Connection, OptionalExtension, params};
use crate::{
    config::LabConfig,
    error::SimResult,
    event::{EventLogEntry, OutcomeRecord},
    stats::RunRecorder,
    types::SimTime,
};

pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    /// Open (or create) the results database at `path`.
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_results.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(
        &self,
        run_id: &str,
        seed: u64,
        version: &str,
        duration: SimTime,
        config: &LabConfig,
    ) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, seed, version, duration, config_json, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                seed as i64,
                version,
                duration,
                serde_json::to_string(config)?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn run_seed(&self, run_id: &str) -> SimResult<Option<u64>> {
        let seed = self
            .conn
            .query_row("SELECT seed FROM run WHERE run_id = ?1", params![run_id], |row| {
                row.get::<_, i64>(0)
            })
            .optional()?;
        Ok(seed.map(|s| s as u64))
    }

    // ── Results ────────────────────────────────────────────────

    /// Write everything a recorder collected, in one transaction.
    pub fn save_recorder(&self, run_id: &str, recorder: &RunRecorder) -> SimResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        for outcome in recorder.outcomes() {
            tx.execute(
                "INSERT INTO sample_outcome
                 (run_id, sample_id, mode, is_rerun, queue_time, analysis_start, analysis_end, outcome, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    run_id,
                    outcome.sample_id,
                    outcome.mode.as_str(),
                    outcome.is_rerun,
                    outcome.queue_time,
                    outcome.analysis_start,
                    outcome.analysis_end,
                    outcome.outcome.as_str(),
                    serde_json::to_string(outcome)?,
                ],
            )?;
        }
        for (metric, values) in recorder.metrics() {
            for value in values {
                tx.execute(
                    "INSERT INTO metric_value (run_id, metric, value) VALUES (?1, ?2, ?3)",
                    params![run_id, metric, value],
                )?;
            }
        }
        for event in recorder.events() {
            tx.execute(
                "INSERT INTO event_log (run_id, time, event_type, payload) VALUES (?1, ?2, ?3, ?4)",
                params![run_id, event.time(), event.event_type_name(), serde_json::to_string(event)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn outcome_count(&self, run_id: &str, outcome: &str) -> SimResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sample_outcome WHERE run_id = ?1 AND outcome = ?2",
            params![run_id, outcome],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn outcomes_for_run(&self, run_id: &str) -> SimResult<Vec<OutcomeRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM sample_outcome WHERE run_id = ?1 ORDER BY id ASC"
        )?;
        let payloads = stmt
            .query_map(params![run_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut outcomes = Vec::with_capacity(payloads.len());
        for payload in payloads {
            outcomes.push(serde_json::from_str(&payload)?);
        }
        Ok(outcomes)
    }

    pub fn events_for_run(&self, run_id: &str) -> SimResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, time, event_type, payload
             FROM event_log WHERE run_id = ?1
             ORDER BY id ASC"
        )?;
        let entries = stmt.query_map(params![run_id], |row| {
            Ok(EventLogEntry {
                id:         Some(row.get(0)?),
                run_id:     row.get(1)?,
                time:       row.get(2)?,
                event_type: row.get(3)?,
                payload:    row.get(4)?,
            })
        })?.collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn metric_values(&self, run_id: &str, metric: &str) -> SimResult<Vec<f64>> {
        let mut stmt = self.conn.prepare(
            "SELECT value FROM metric_value WHERE run_id = ?1 AND metric = ?2 ORDER BY id ASC"
        )?;
        let values = stmt
            .query_map(params![run_id, metric], |row| row.get(0))?
            .collect::<Result<Vec<f64>, _>>()?;
        Ok(values)
    }
}
