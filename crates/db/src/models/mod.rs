//! Row structs and lookup tables.
//!
//! Row structs derive `FromRow` and convert into the domain types of
//! `archdiffer_core::comparison`.

pub mod comparison;
pub mod comparison_type;
