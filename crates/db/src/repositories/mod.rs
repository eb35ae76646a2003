//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod comparison_repo;
pub mod comparison_type_repo;
pub mod queue_repo;

pub use comparison_repo::ComparisonRepo;
pub use comparison_type_repo::ComparisonTypeRepo;
pub use queue_repo::QueueRepo;
