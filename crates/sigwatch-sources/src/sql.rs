//! SQL poll driver — watches a query result set for new rows.
//!
//! The configured query binds the checkpoint timestamp as its single
//! parameter and must return two columns: row timestamp and message text.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use sigwatch_core::{Result, SigwatchError};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parameters from the listener definition's JSON blob.
#[derive(Debug, Clone, Deserialize)]
pub struct SqlParams {
    /// Database path (or `:memory:`).
    pub connection: String,
    /// Query with one positional parameter receiving the checkpoint
    /// timestamp, e.g.
    /// `SELECT ts, note FROM events WHERE ts > ?1 ORDER BY ts`.
    pub query: String,
    /// Ledger-style source: advance the checkpoint to the maximum row
    /// timestamp observed instead of wall-clock time, so rows arriving
    /// between polls are never skipped.
    #[serde(default)]
    pub continual: bool,
}

/// Polls a SQL query for rows newer than the checkpoint.
pub struct SqlSource {
    query: String,
    continual: bool,
    conn: Option<rusqlite::Connection>,
    checkpoint: DateTime<Utc>,
}

impl SqlSource {
    pub fn new(params: SqlParams) -> Result<Self> {
        let conn = rusqlite::Connection::open(&params.connection).map_err(|e| {
            SigwatchError::Listener(format!("Cannot open '{}': {e}", params.connection))
        })?;
        Ok(Self {
            query: params.query,
            continual: params.continual,
            conn: Some(conn),
            checkpoint: Utc::now(),
        })
    }

    /// Transplant the checkpoint from a prior instance.
    pub fn inherit(&mut self, other: &SqlSource) {
        self.checkpoint = other.checkpoint;
    }

    pub fn check(&mut self) -> Result<Vec<String>> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| SigwatchError::Listener("Connection already closed".into()))?;
        let observed = Utc::now();

        let mut stmt = conn
            .prepare(&self.query)
            .map_err(|e| SigwatchError::Listener(format!("Query prepare failed: {e}")))?;
        let rows = stmt
            .query_map([self.checkpoint.format(TS_FORMAT).to_string()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| SigwatchError::Listener(format!("Query failed: {e}")))?;

        let mut messages = Vec::new();
        let mut max_ts: Option<DateTime<Utc>> = None;
        for row in rows {
            let (ts, text) =
                row.map_err(|e| SigwatchError::Listener(format!("Row read failed: {e}")))?;
            let stamp = parse_ts(&ts)?;
            max_ts = Some(max_ts.map_or(stamp, |m| m.max(stamp)));
            messages.push(format!("[{}] {}", stamp.format(TS_FORMAT), text));
        }
        drop(stmt);

        // Checkpoint policy: continual sources follow the data, everything
        // else resynchronizes to the observation time.
        self.checkpoint = if self.continual {
            max_ts.unwrap_or(self.checkpoint)
        } else {
            observed
        };
        Ok(messages)
    }

    /// Release the connection. Idempotent; failures are logged, not raised.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take()
            && let Err((_, e)) = conn.close()
        {
            tracing::warn!("⚠️ Closing SQL connection failed: {e}");
        }
    }

    pub fn checkpoint(&self) -> DateTime<Utc> {
        self.checkpoint
    }
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, TS_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| SigwatchError::Listener(format!("Bad row timestamp '{value}': {e}")))
}
