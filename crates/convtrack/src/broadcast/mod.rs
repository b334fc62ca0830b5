//! Event fan-out for job state changes.
//!
//! Per-job listeners are registered on the [`NotificationHub`]; every event
//! is also mirrored to an engine-wide feed for consumers that stream all jobs.

pub mod hub;
pub mod job_event;

pub use hub::{NotificationHub, Subscription};
pub use job_event::{JobEvent, JobEventBroadcaster, JobEventKind};
