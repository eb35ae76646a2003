//! The comparison pipeline between the REST surface and the workers.
//!
//! - [`plugin`]: comparator capability traits and the kind registry.
//! - [`rpmdiff`]: the RPM comparator.
//! - [`dispatcher`]: enqueueing and the redispatch sweep.
//! - [`service`]: the submission and polling façade.

pub mod dispatcher;
pub mod plugin;
pub mod process;
pub mod rpmdiff;
pub mod service;
