use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{CollectionSchema, IndexSpec, SettingsDocument, REQUIRED_COLLECTIONS};

/// Create a collection's backing table. Idempotent.
pub(crate) async fn ensure_collection(pool: &SqlitePool, name: &str) -> Result<()> {
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{name}" (
            _id TEXT PRIMARY KEY,
            doc TEXT NOT NULL,
            inserted_at INTEGER NOT NULL
        )
        "#
    );
    sqlx::query(&ddl)
        .execute(pool)
        .await
        .map_err(|e| Error::store(name, e))?;
    Ok(())
}

pub(crate) async fn collection_exists(pool: &SqlitePool, name: &str) -> Result<bool> {
    sqlx::query_scalar("SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?")
        .bind(name)
        .fetch_one(pool)
        .await
        .map_err(|e| Error::store(name, e))
}

fn index_ddl(schema: &CollectionSchema) -> String {
    let name = schema.name;
    match schema.index {
        IndexSpec::Descending(field) => format!(
            r#"CREATE INDEX IF NOT EXISTS "idx_{name}_{field}" ON "{name}" (json_extract(doc, '$.{field}') DESC)"#
        ),
        // Missing and null keys index as one value, so only one document may lack the field.
        IndexSpec::Unique(field) => format!(
            r#"CREATE UNIQUE INDEX IF NOT EXISTS "idx_{name}_{field}" ON "{name}" (IFNULL(json_type(doc, '$.{field}'), 'null'), IFNULL(json_extract(doc, '$.{field}'), ''))"#
        ),
    }
}

/// Provision the required collections and their indexes. Safe to re-run.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for schema in REQUIRED_COLLECTIONS.iter() {
        ensure_collection(pool, schema.name).await?;
        sqlx::query(&index_ddl(schema))
            .execute(pool)
            .await
            .map_err(|e| Error::store(schema.name, e))?;
        debug!(collection = schema.name, "collection provisioned");
    }

    info!("store collections initialized");
    Ok(())
}

/// Insert the settings singleton if and only if `settings` is empty.
///
/// Returns whether a document was written.
pub async fn seed_settings(pool: &SqlitePool, settings: &SettingsDocument) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
        .fetch_one(pool)
        .await
        .map_err(|e| Error::store("settings", e))?;

    if count > 0 {
        return Ok(false);
    }

    let mut doc = serde_json::to_value(settings)
        .map_err(|e| Error::InvalidDocument(e.to_string()))?;
    let id = uuid::Uuid::new_v4().to_string();
    doc["_id"] = serde_json::Value::String(id.clone());

    sqlx::query("INSERT INTO settings (_id, doc, inserted_at) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(doc.to_string())
        .bind(chrono::Utc::now().timestamp())
        .execute(pool)
        .await
        .map_err(|e| Error::store("settings", e))?;

    info!(id = %settings.id, "default settings created");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn memory_pool() -> SqlitePool {
        db::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let indexes: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(indexes, 3);

        for schema in REQUIRED_COLLECTIONS.iter() {
            assert!(collection_exists(&pool, schema.name).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_unique_index_rejects_duplicate_ids() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        let insert = "INSERT INTO agents (_id, doc, inserted_at) VALUES (?, ?, 0)";
        sqlx::query(insert)
            .bind("a")
            .bind(r#"{"id":"coder"}"#)
            .execute(&pool)
            .await
            .unwrap();
        let dup = sqlx::query(insert)
            .bind("b")
            .bind(r#"{"id":"coder"}"#)
            .execute(&pool)
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_unique_index_treats_missing_ids_as_equal() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        let insert = "INSERT INTO agents (_id, doc, inserted_at) VALUES (?, ?, 0)";
        sqlx::query(insert)
            .bind("a")
            .bind(r#"{"name":"x"}"#)
            .execute(&pool)
            .await
            .unwrap();
        let second = sqlx::query(insert)
            .bind("b")
            .bind(r#"{"name":"y","id":null}"#)
            .execute(&pool)
            .await;
        assert!(second.is_err());

        // An empty-string id is a distinct value from a missing one.
        sqlx::query(insert)
            .bind("c")
            .bind(r#"{"name":"z","id":""}"#)
            .execute(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_seed_settings_only_once() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        assert!(seed_settings(&pool, &SettingsDocument::default()).await.unwrap());
        assert!(!seed_settings(&pool, &SettingsDocument::default()).await.unwrap());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
