//! # sigwatch-sources
//!
//! Source drivers and their scheduling contract.
//!
//! A [`Listener`] pairs a [`Source`] driver with a [`CronSchedule`]. Each
//! driver owns an incremental checkpoint: `check()` reports what changed
//! since the checkpoint and advances it on success only, so a failing check
//! re-observes the same window on the next attempt.
//!
//! ```text
//! Listener
//!   ├── CronSchedule: "0 8 * * *" @ Europe/Berlin → next due time
//!   └── Source (closed set of driver kinds)
//!         ├── Files:   per-file mtime watch, optional glob masks
//!         ├── Folders: recursive member-set diff per root
//!         └── Sql:     checkpoint-parameterized query poll
//! ```

pub mod files;
pub mod folders;
pub mod listener;
pub mod schedule;
pub mod source;
pub mod sql;

pub use files::FilesSource;
pub use folders::FoldersSource;
pub use listener::Listener;
pub use schedule::{CronSchedule, resolve_timezone};
pub use source::Source;
pub use sql::SqlSource;
