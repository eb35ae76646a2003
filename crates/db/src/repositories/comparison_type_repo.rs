//! Repository for the `comparison_types` lookup table.

use archdiffer_core::comparison::ComparisonType;
use sqlx::PgPool;

use crate::models::comparison_type::ComparisonTypeTable;

#[derive(sqlx::FromRow)]
struct TypeRow {
    id: i16,
    name: String,
}

impl From<TypeRow> for ComparisonType {
    fn from(row: TypeRow) -> Self {
        ComparisonType {
            id: row.id,
            name: row.name,
        }
    }
}

pub struct ComparisonTypeRepo;

impl ComparisonTypeRepo {
    /// All comparison types ordered by id.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<ComparisonType>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TypeRow>("SELECT id, name FROM comparison_types ORDER BY id")
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(ComparisonType::from).collect())
    }

    /// Insert `name` if missing and return its row either way.
    pub async fn ensure(pool: &PgPool, name: &str) -> Result<ComparisonType, sqlx::Error> {
        let row = sqlx::query_as::<_, TypeRow>(
            "INSERT INTO comparison_types (name) VALUES ($1) \
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name \
             RETURNING id, name",
        )
        .bind(name)
        .fetch_one(pool)
        .await?;
        Ok(row.into())
    }

    /// Build the in-memory lookup table from the current rows.
    pub async fn load_table(pool: &PgPool) -> Result<ComparisonTypeTable, sqlx::Error> {
        Ok(ComparisonTypeTable::new(Self::list_all(pool).await?))
    }
}
