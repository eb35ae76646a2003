//! Domain types shared by every Archdiffer crate.
//!
//! Nothing in here performs I/O: the lifecycle state machine, the
//! comparison/artifact data model and the row grouping engine are pure and
//! are exercised directly by unit tests.

pub mod comparison;
pub mod error;
pub mod grouping;
pub mod status;
pub mod types;
