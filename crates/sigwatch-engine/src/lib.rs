//! # sigwatch-engine
//!
//! The listener scheduling and delivery engine.
//!
//! ```text
//! Engine (1s tick)
//!   ├── JobQueue: pending one-shots (actualizer / listener / checker)
//!   ├── Actualizer: reconciles live listeners against stored definitions,
//!   │     preserving each driver's checkpoint across redefinition
//!   ├── Dispatcher: runs a due listener's check, resolves subscribers,
//!   │     reschedules in finally-semantics, escalates failures
//!   └── Delivery: 4096-char segments, per-segment retry budget,
//!         concurrent fan-out bounded by an overall timeout
//! ```

pub mod actualizer;
pub mod delivery;
pub mod dispatcher;
pub mod engine;
pub mod jobs;
pub mod transport;

pub use engine::{Engine, JobState};
pub use jobs::{Job, JobKind, JobQueue};
pub use transport::{TelegramTransport, Transport};
