//! Comparison workers.
//!
//! - [`executor`]: claim, run and persist one delivered comparison.
//! - [`pool`]: worker slots draining the task queue.
//! - [`retry`]: backoff for Job Store writes during outages.
//! - [`config`]: environment configuration.

pub mod config;
pub mod executor;
pub mod pool;
pub mod retry;

#[cfg(test)]
pub(crate) mod fakes;
