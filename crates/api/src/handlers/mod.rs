pub mod comparison;
pub mod comparison_type;
