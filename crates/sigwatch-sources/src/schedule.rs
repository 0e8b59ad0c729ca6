//! Cron schedule bound to a timezone.
//!
//! Wraps the `cron` crate: expressions are evaluated in the configured
//! timezone and the computed occurrence is cached until it elapses.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use sigwatch_core::{Result, SigwatchError};

/// Resolve an IANA timezone name, falling back to UTC with one warning.
/// Validation happens here, at configuration load, so an invalid name can
/// never surface as a runtime failure mid-schedule.
pub fn resolve_timezone(name: &str) -> Tz {
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!("⚠️ Unknown timezone '{}', falling back to UTC", name);
            Tz::UTC
        }
    }
}

/// A cron expression plus the timezone it is evaluated in.
///
/// Holds the next computed occurrence; [`CronSchedule::next_t`] reports
/// whether that occurrence has elapsed and advances past it when it has.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    schedule: Schedule,
    tz: Tz,
    next: Option<DateTime<Utc>>,
}

impl CronSchedule {
    pub fn new(expression: &str, tz: Tz) -> Result<Self> {
        let schedule = Schedule::from_str(&normalize(expression)).map_err(|e| {
            SigwatchError::Listener(format!("Invalid cron expression '{expression}': {e}"))
        })?;
        let mut this = Self {
            schedule,
            tz,
            next: None,
        };
        this.next = this.upcoming(Utc::now());
        Ok(this)
    }

    /// Report the pending occurrence.
    ///
    /// Returns `(expired, when)`: `expired` is true when the previously
    /// computed occurrence is already in the past, in which case the
    /// schedule advances to the next occurrence strictly after now. The
    /// returned time is never in the past. `None` means the expression has
    /// no future occurrence.
    pub fn next_t(&mut self) -> Option<(bool, DateTime<Utc>)> {
        let now = Utc::now();
        match self.next {
            Some(t) if t > now => Some((false, t)),
            _ => {
                let next = self.upcoming(now)?;
                self.next = Some(next);
                Some((true, next))
            }
        }
    }

    /// The timezone this schedule is evaluated in.
    pub fn timezone(&self) -> Tz {
        self.tz
    }

    fn upcoming(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&after.with_timezone(&self.tz))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// The `cron` crate wants a seconds field; classic 5-field expressions get
/// one prepended so both forms are accepted.
fn normalize(expression: &str) -> String {
    match expression.split_whitespace().count() {
        5 => format!("0 {expression}"),
        _ => expression.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_is_in_future() {
        let mut schedule = CronSchedule::new("*/5 * * * *", Tz::UTC).unwrap();
        let (expired, when) = schedule.next_t().unwrap();
        assert!(!expired);
        assert!(when > Utc::now());
    }

    #[test]
    fn test_expired_occurrence_advances() {
        let mut schedule = CronSchedule::new("* * * * *", Tz::UTC).unwrap();
        // Force the held occurrence into the past.
        schedule.next = Some(Utc::now() - chrono::Duration::minutes(5));
        let (expired, when) = schedule.next_t().unwrap();
        assert!(expired);
        assert!(when > Utc::now() - chrono::Duration::seconds(1));
    }

    #[test]
    fn test_pending_occurrence_is_stable() {
        let mut schedule = CronSchedule::new("0 0 1 1 *", Tz::UTC).unwrap();
        let (_, first) = schedule.next_t().unwrap();
        let (expired, second) = schedule.next_t().unwrap();
        assert!(!expired);
        assert_eq!(first, second);
    }

    #[test]
    fn test_five_field_expression_accepted() {
        assert!(CronSchedule::new("0 8 * * *", Tz::UTC).is_ok());
        assert!(CronSchedule::new("0 0 8 * * *", Tz::UTC).is_ok());
    }

    #[test]
    fn test_invalid_expression() {
        assert!(CronSchedule::new("not a cron", Tz::UTC).is_err());
    }

    #[test]
    fn test_timezone_fallback() {
        assert_eq!(resolve_timezone("Mars/Olympus_Mons"), Tz::UTC);
        assert_eq!(resolve_timezone("Europe/Berlin"), chrono_tz::Europe::Berlin);
    }
}
