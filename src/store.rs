//! Document store.
//!
//! Collections are SQLite tables holding one JSON document per row. The
//! store provisions the required collections on [`DocumentStore::initialize`]
//! and exposes a small query/insert surface over them:
//!
//! | Operation | Input | Output |
//! |-----------|-------|--------|
//! | [`query`](DocumentStore::query) | collection, JSON filter, [`QueryOptions`] | [`QueryResult`] |
//! | [`insert`](DocumentStore::insert) | collection, object or array of objects | [`Inserted`] |
//!
//! Filters match top-level fields by equality. Dotted keys (`"meta.lang"`)
//! reach into nested objects and `null` matches missing or null fields.
//! Booleans only match JSON booleans and numbers only match JSON numbers. A negative limit caps the result at
//! its absolute value and a zero limit means no limit.
//!
//! Once [`close`](DocumentStore::close) has run, every operation fails with
//! [`Error::StoreNotConnected`]; the store never reconnects on its own.

use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteArguments;
use sqlx::{Arguments, Row, SqlitePool};
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::{self, ConfigResolver};
use crate::db;
use crate::error::{Error, Result};
use crate::migrate;
use crate::models::SettingsDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn sql(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

impl From<i64> for SortDirection {
    /// Mongo-style: negative means descending.
    fn from(n: i64) -> Self {
        if n < 0 {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub find_one: bool,
    pub limit: Option<i64>,
    pub sort: Vec<(String, SortDirection)>,
}

impl QueryOptions {
    pub fn find_one() -> Self {
        Self {
            find_one: true,
            ..Default::default()
        }
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push((field.into(), direction));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    One(Option<Value>),
    Many(Vec<Value>),
}

impl QueryResult {
    pub fn into_vec(self) -> Vec<Value> {
        match self {
            QueryResult::One(doc) => doc.into_iter().collect(),
            QueryResult::Many(docs) => docs,
        }
    }
}

/// Assigned identifiers, in the same single/multi shape as the inserted input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Inserted {
    One(String),
    Many(Vec<String>),
}

pub struct DocumentStore {
    target: String,
    data_path: PathBuf,
    settings: SettingsDocument,
    pool: RwLock<Option<SqlitePool>>,
}

impl DocumentStore {
    pub fn new(config: &ConfigResolver) -> Self {
        let data_path = PathBuf::from(
            config
                .get_string(config::STORE_DATA_PATH)
                .unwrap_or_else(|| "data/store".to_string()),
        );
        let uri = config
            .get_string(config::STORE_URI)
            .unwrap_or_else(|| "sqlite://".to_string());
        let db_name = config
            .get_string(config::STORE_DB_NAME)
            .unwrap_or_else(|| "studio".to_string());

        let defaults = SettingsDocument::default();
        let settings = SettingsDocument {
            theme: config.get_string(config::THEME).unwrap_or(defaults.theme),
            language: config.get_string(config::LANGUAGE).unwrap_or(defaults.language),
            default_model: config
                .get_string(config::DEFAULT_MODEL)
                .unwrap_or(defaults.default_model),
            ..SettingsDocument::default()
        };

        Self {
            target: db::resolve_target(&uri, &db_name, &data_path),
            data_path,
            settings,
            pool: RwLock::new(None),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_connected(&self) -> bool {
        self.pool.read().map(|p| p.is_some()).unwrap_or(false)
    }

    /// Create the data directory, connect, provision collections, and seed
    /// the settings singleton.
    pub async fn initialize(&self) -> Result<()> {
        info!("initializing document store");

        if !self.data_path.exists() {
            std::fs::create_dir_all(&self.data_path).map_err(|e| Error::io(&self.data_path, e))?;
            info!(path = %self.data_path.display(), "created store data directory");
        }

        let pool = db::connect(&self.target)
            .await
            .map_err(|source| Error::StoreConnection {
                target: self.target.clone(),
                source,
            })?;
        info!(store = %self.target, "connected to document store");

        if let Err(e) = self.provision(&pool).await {
            pool.close().await;
            return Err(e);
        }

        *self.pool.write().map_err(|_| Error::StoreNotConnected)? = Some(pool);
        info!("document store initialized");
        Ok(())
    }

    async fn provision(&self, pool: &SqlitePool) -> Result<()> {
        migrate::run_migrations(pool).await?;
        migrate::seed_settings(pool, &self.settings).await?;
        Ok(())
    }

    fn pool(&self) -> Result<SqlitePool> {
        self.pool
            .read()
            .ok()
            .and_then(|p| p.clone())
            .ok_or(Error::StoreNotConnected)
    }

    /// Filtered read. See the module docs for filter semantics.
    pub async fn query(
        &self,
        collection: &str,
        filter: &Value,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let pool = self.pool()?;
        validate_collection_name(collection)?;

        let result = self.run_query(&pool, collection, filter, options).await;
        if let Err(ref e) = result {
            error!(collection, error = %e, "query failed");
        }
        result
    }

    async fn run_query(
        &self,
        pool: &SqlitePool,
        collection: &str,
        filter: &Value,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        if !migrate::collection_exists(pool, collection).await? {
            return Ok(empty_result(options));
        }

        let (sql, args) = build_select(collection, filter, options)?;
        debug!(collection, sql = %sql, "running query");

        let rows = sqlx::query_with(&sql, args)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::store(collection, e))?;

        let docs = rows
            .iter()
            .map(|row| {
                let raw: String = row.get("doc");
                serde_json::from_str(&raw).map_err(|e| Error::InvalidDocument(e.to_string()))
            })
            .collect::<Result<Vec<Value>>>()?;

        Ok(if options.find_one {
            QueryResult::One(docs.into_iter().next())
        } else {
            QueryResult::Many(docs)
        })
    }

    /// Insert one document (an object) or many (an array of objects).
    pub async fn insert(&self, collection: &str, documents: Value) -> Result<Inserted> {
        let pool = self.pool()?;
        validate_collection_name(collection)?;

        let result = match documents {
            Value::Array(docs) => self
                .insert_many(&pool, collection, docs)
                .await
                .map(Inserted::Many),
            doc => self.insert_one(&pool, collection, doc).await.map(Inserted::One),
        };
        if let Err(ref e) = result {
            error!(collection, error = %e, "insert failed");
        }
        result
    }

    async fn insert_one(&self, pool: &SqlitePool, collection: &str, doc: Value) -> Result<String> {
        let (id, body) = prepare_document(doc)?;
        migrate::ensure_collection(pool, collection).await?;

        sqlx::query(&insert_sql(collection))
            .bind(&id)
            .bind(body)
            .bind(chrono::Utc::now().timestamp())
            .execute(pool)
            .await
            .map_err(|e| Error::store(collection, e))?;

        debug!(collection, id = %id, "document inserted");
        Ok(id)
    }

    async fn insert_many(
        &self,
        pool: &SqlitePool,
        collection: &str,
        docs: Vec<Value>,
    ) -> Result<Vec<String>> {
        let prepared = docs
            .into_iter()
            .map(prepare_document)
            .collect::<Result<Vec<_>>>()?;
        migrate::ensure_collection(pool, collection).await?;

        let mut tx = pool.begin().await.map_err(|e| Error::store(collection, e))?;
        let now = chrono::Utc::now().timestamp();
        let sql = insert_sql(collection);
        let mut ids = Vec::with_capacity(prepared.len());

        for (id, body) in prepared {
            sqlx::query(&sql)
                .bind(&id)
                .bind(body)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::store(collection, e))?;
            ids.push(id);
        }

        tx.commit().await.map_err(|e| Error::store(collection, e))?;
        debug!(collection, count = ids.len(), "documents inserted");
        Ok(ids)
    }

    /// Release the connection. Later calls are no-ops.
    pub async fn close(&self) {
        let pool = match self.pool.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(pool) = pool {
            pool.close().await;
            info!("closed document store connection");
        }
    }
}

fn empty_result(options: &QueryOptions) -> QueryResult {
    if options.find_one {
        QueryResult::One(None)
    } else {
        QueryResult::Many(Vec::new())
    }
}

fn insert_sql(collection: &str) -> String {
    format!(
        r#"INSERT INTO "{}" (_id, doc, inserted_at) VALUES (?, ?, ?)"#,
        collection
    )
}

fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidDocument(format!(
            "invalid collection name: {:?}",
            name
        )))
    }
}

/// Convert a dotted field name into a SQLite JSON path.
fn json_path(field: &str) -> Result<String> {
    if field.is_empty() || field.contains('"') {
        return Err(Error::InvalidDocument(format!("invalid field name: {:?}", field)));
    }
    let mut path = String::from("$");
    for part in field.split('.') {
        path.push_str(&format!(".\"{}\"", part));
    }
    Ok(path)
}

/// Assign an `_id` if the document lacks one and serialize it.
fn prepare_document(doc: Value) -> Result<(String, String)> {
    let mut object: Map<String, Value> = match doc {
        Value::Object(map) => map,
        other => {
            return Err(Error::InvalidDocument(format!(
                "expected a JSON object, got {}",
                other
            )))
        }
    };

    let id = match object.get("_id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => {
            return Err(Error::InvalidDocument(format!(
                "_id must be a string, got {}",
                other
            )))
        }
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            object.insert("_id".to_string(), Value::String(id.clone()));
            id
        }
    };

    Ok((id, Value::Object(object).to_string()))
}

fn build_select<'q>(
    collection: &str,
    filter: &Value,
    options: &QueryOptions,
) -> Result<(String, SqliteArguments<'q>)> {
    let mut sql = format!(r#"SELECT doc FROM "{}""#, collection);
    let mut args = SqliteArguments::default();
    let mut clauses = Vec::new();

    let conditions = match filter {
        Value::Null => None,
        Value::Object(map) => Some(map),
        other => {
            return Err(Error::InvalidDocument(format!(
                "filter must be a JSON object, got {}",
                other
            )))
        }
    };

    for (field, expected) in conditions.into_iter().flatten() {
        let path = json_path(field)?;
        let clause = match expected {
            Value::Null => "json_extract(doc, ?) IS NULL",
            Value::Bool(_) => "json_type(doc, ?) = ?",
            Value::Number(_) => {
                "(json_extract(doc, ?) = ? AND json_type(doc, ?) IN ('integer', 'real'))"
            }
            Value::String(_) => "json_extract(doc, ?) = ?",
            Value::Array(_) | Value::Object(_) => "json_extract(doc, ?) = json(?)",
        };
        add_arg(&mut args, path.clone())?;
        match expected {
            Value::Null => {}
            Value::Bool(b) => add_arg(&mut args, if *b { "true" } else { "false" })?,
            Value::Number(n) => match n.as_i64() {
                Some(i) => add_arg(&mut args, i)?,
                None => add_arg(&mut args, n.as_f64().unwrap_or(f64::NAN))?,
            },
            Value::String(s) => add_arg(&mut args, s.clone())?,
            nested => add_arg(&mut args, nested.to_string())?,
        }
        if expected.is_number() {
            add_arg(&mut args, path)?;
        }
        clauses.push(clause);
    }

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    let mut order = Vec::new();
    for (field, direction) in &options.sort {
        add_arg(&mut args, json_path(field)?)?;
        order.push(format!("json_extract(doc, ?) {}", direction.sql()));
    }
    order.push("rowid ASC".to_string());
    sql.push_str(" ORDER BY ");
    sql.push_str(&order.join(", "));

    let limit = if options.find_one {
        Some(1)
    } else {
        options.limit.filter(|l| *l != 0).map(i64::saturating_abs)
    };
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        add_arg(&mut args, limit)?;
    }

    Ok((sql, args))
}

fn add_arg<'q, T>(args: &mut SqliteArguments<'q>, value: T) -> Result<()>
where
    T: 'q + sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    args.add(value)
        .map_err(|e| Error::InvalidDocument(e.to_string()))
}
