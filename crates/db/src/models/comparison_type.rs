//! Comparison-type lookup table.
//!
//! Loaded once at startup (see [`crate::repositories::ComparisonTypeRepo`])
//! and shared by `Arc` between the store and the services.

use std::collections::BTreeMap;

use archdiffer_core::comparison::ComparisonType;

/// Bidirectional name <-> id map over `comparison_types`.
#[derive(Debug, Clone, Default)]
pub struct ComparisonTypeTable {
    by_id: BTreeMap<i16, String>,
    by_name: BTreeMap<String, i16>,
}

impl ComparisonTypeTable {
    pub fn new(types: impl IntoIterator<Item = ComparisonType>) -> Self {
        let mut table = Self::default();
        for ty in types {
            table.by_name.insert(ty.name.clone(), ty.id);
            table.by_id.insert(ty.id, ty.name);
        }
        table
    }

    pub fn id_of(&self, name: &str) -> Option<i16> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: i16) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All types ordered by id.
    pub fn types(&self) -> Vec<ComparisonType> {
        self.by_id
            .iter()
            .map(|(id, name)| ComparisonType {
                id: *id,
                name: name.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
