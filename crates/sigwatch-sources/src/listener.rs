//! The runtime listener: a named, scheduled source driver.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sigwatch_core::Result;

use crate::schedule::CronSchedule;
use crate::source::Source;

/// One live instance exists per active definition; it is created and
/// replaced only by the actualizer, and mutated otherwise only through its
/// own `check()`.
pub struct Listener {
    pub id: i64,
    pub name: String,
    schedule: CronSchedule,
    source: Source,
}

impl Listener {
    /// Build a listener from a persisted definition's fields.
    pub fn from_definition(
        id: i64,
        name: &str,
        kind: &str,
        parameters: &str,
        cron: &str,
        tz: Tz,
    ) -> Result<Self> {
        Ok(Self {
            id,
            name: name.to_string(),
            schedule: CronSchedule::new(cron, tz)?,
            source: Source::from_definition(kind, parameters)?,
        })
    }

    /// Next due time, advancing past an elapsed occurrence. `None` when the
    /// schedule has no future occurrence.
    pub fn next_due(&mut self) -> Option<DateTime<Utc>> {
        self.schedule.next_t().map(|(_, when)| when)
    }

    pub fn check(&mut self) -> Result<Vec<String>> {
        self.source.check()
    }

    pub fn close(&mut self) {
        self.source.close();
    }

    /// Transfer checkpoint state from the previous instance when the driver
    /// kinds match. Returns whether anything was inherited.
    pub fn inherit(&mut self, previous: &Listener) -> bool {
        self.source.inherit(&previous.source)
    }

    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }

    pub fn checkpoint(&self) -> DateTime<Utc> {
        self.source.checkpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_definition() {
        let mut listener = Listener::from_definition(
            7,
            "tmp watch",
            "files",
            "{\"paths\": []}",
            "*/5 * * * *",
            Tz::UTC,
        )
        .unwrap();
        assert_eq!(listener.id, 7);
        assert_eq!(listener.kind(), "files");
        assert!(listener.next_due().unwrap() > Utc::now());
    }

    #[test]
    fn test_bad_cron_fails_construction() {
        let result =
            Listener::from_definition(1, "x", "files", "{\"paths\": []}", "nope", Tz::UTC);
        assert!(result.is_err());
    }
}
