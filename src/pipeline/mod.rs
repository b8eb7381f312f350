//! Scheduled pipeline: retry backoff, per-business locking and the scheduler.

pub mod backoff;
mod locks;
mod scheduler;

pub use locks::{BusinessGuard, BusinessLocks};
pub use scheduler::{Eligibility, PassOutcome, PassReport, PipelineScheduler, TickStats};
