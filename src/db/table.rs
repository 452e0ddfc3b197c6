//! Table reflection: the bulk insert engine learns a table's column set
//! from the database itself. Mirrors the original's `PostgreSQL._get_table`
//! lazy cache, backed by `information_schema.columns` instead of
//! SQLAlchemy's `MetaData.reflect`.

use crate::error::{AppError, AppResult};
use sqlx::{PgPool, Row};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

/// The set of columns a table actually has, as reported by Postgres.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: BTreeSet<String>,
}

impl TableDescriptor {
    async fn reflect(pool: &PgPool, name: &str) -> AppResult<Self> {
        let rows = sqlx::query(
            r#"
            SELECT column_name
            FROM information_schema.columns
            WHERE table_schema = 'public' AND table_name = $1
            "#,
        )
        .bind(name)
        .fetch_all(pool)
        .await?;

        if rows.is_empty() {
            return Err(AppError::UnknownTable(name.to_string()));
        }

        let columns = rows
            .into_iter()
            .map(|row| row.try_get::<String, _>("column_name"))
            .collect::<Result<BTreeSet<String>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            columns,
        })
    }
}

/// Per-table descriptor cache shared across the process. A table is
/// reflected at most once, the first time a batch destined for it is
/// inserted.
#[derive(Default)]
pub struct TableRegistry {
    tables: RwLock<HashMap<String, TableDescriptor>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, pool: &PgPool, name: &str) -> AppResult<TableDescriptor> {
        if let Some(descriptor) = self.tables.read().await.get(name) {
            return Ok(descriptor.clone());
        }

        let descriptor = TableDescriptor::reflect(pool, name).await?;
        self.tables
            .write()
            .await
            .insert(name.to_string(), descriptor.clone());
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_starts_empty() {
        let registry = TableRegistry::new();
        assert!(registry.tables.try_read().unwrap().is_empty());
    }
}
