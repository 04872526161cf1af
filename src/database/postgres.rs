// docbackup/src/database/postgres.rs
//! Document store kept in PostgreSQL.
//!
//! Each collection is a table `(seq BIGSERIAL, doc JSON)`. The `json` type
//! keeps the document text verbatim, so key order survives a round trip, and
//! `seq` gives the natural storage order. Index records written to
//! `system.indexes` are stored there and, when they describe a collection of
//! this database, materialized as expression indexes over `doc`.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

use super::DocumentDatabase;
use crate::errors::{AppError, Result};
use crate::snapshot::{
    document_from_json, document_to_json, Document, Value, SYSTEM_INDEXES, SYSTEM_PREFIX,
};
use crate::utils::redact_url;

/// PostgreSQL's `NAMEDATALEN - 1`.
const MAX_IDENTIFIER_LEN: usize = 63;
const INDEX_DIGEST_LEN: usize = 16;

pub struct PgDocumentStore {
    pool: PgPool,
    name: String,
}

impl PgDocumentStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| {
                AppError::Connection(format!(
                    "Failed to connect to document store at {}: {}",
                    redact_url(url),
                    e
                ))
            })?;

        let name: String = sqlx::query_scalar("SELECT current_database()::text")
            .fetch_one(&pool)
            .await
            .map_err(|e| connection_error("read the current database name", e))?;

        info!("✅ Connected to document store database '{}'", name);
        Ok(Self { pool, name })
    }

    async fn ensure_index_catalog(&self) -> Result<()> {
        let table = quote_ident(SYSTEM_INDEXES);
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {} (seq BIGSERIAL PRIMARY KEY, doc JSON NOT NULL)",
            table
        );
        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| connection_error("create the index catalog", e))?;

        let create_unique = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ((doc->>'ns'), (doc->>'name'))",
            quote_ident("system.indexes_ns_name"),
            table
        );
        sqlx::query(&create_unique)
            .execute(&self.pool)
            .await
            .map_err(|e| connection_error("create the index catalog key", e))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentDatabase for PgDocumentStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT t.table_name::text
             FROM information_schema.tables t
             JOIN information_schema.columns c
               ON c.table_schema = t.table_schema
              AND c.table_name = t.table_name
              AND c.column_name = 'doc'
             WHERE t.table_schema = current_schema()
               AND t.table_type = 'BASE TABLE'
             ORDER BY t.table_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| connection_error("list collections", e))
    }

    async fn find_all(&self, collection: &str) -> Result<Vec<Document>> {
        let sql = format!("SELECT doc::text FROM {} ORDER BY seq", table_ident(collection)?);
        let rows: Vec<String> = sqlx::query_scalar(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| connection_error(&format!("read collection '{}'", collection), e))?;

        rows.iter()
            .map(|raw| parse_document(collection, raw))
            .collect()
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table_ident(collection)?);
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| connection_error(&format!("count collection '{}'", collection), e))?;
        Ok(count.max(0) as u64)
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", table_ident(collection)?);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| connection_error(&format!("drop collection '{}'", collection), e))?;
        Ok(())
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        let sql = format!(
            "CREATE TABLE {} (seq BIGSERIAL PRIMARY KEY, doc JSON NOT NULL)",
            table_ident(collection)?
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| connection_error(&format!("create collection '{}'", collection), e))?;
        Ok(())
    }

    async fn insert(&self, collection: &str, document: &Document) -> Result<()> {
        let body = serde_json::to_string(&document_to_json(document)).map_err(|e| {
            AppError::Connection(format!(
                "Failed to encode document for collection '{}': {}",
                collection, e
            ))
        })?;

        if collection != SYSTEM_INDEXES {
            let sql = format!("INSERT INTO {} (doc) VALUES ($1::json)", table_ident(collection)?);
            sqlx::query(&sql)
                .bind(body)
                .execute(&self.pool)
                .await
                .map_err(|e| connection_error(&format!("insert into '{}'", collection), e))?;
            return Ok(());
        }

        self.ensure_index_catalog().await?;
        let sql = format!(
            "INSERT INTO {} (doc) VALUES ($1::json) ON CONFLICT DO NOTHING",
            quote_ident(SYSTEM_INDEXES)
        );
        sqlx::query(&sql)
            .bind(body)
            .execute(&self.pool)
            .await
            .map_err(|e| connection_error("record index metadata", e))?;

        if let Some(ddl) = index_ddl(document, &self.name) {
            debug!("Materializing index: {}", ddl);
            sqlx::query(&ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| connection_error("build index", e))?;
        }
        Ok(())
    }
}

fn connection_error(action: &str, err: sqlx::Error) -> AppError {
    AppError::Connection(format!("Failed to {}: {}", action, err))
}

fn parse_document(collection: &str, raw: &str) -> Result<Document> {
    let json: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
        AppError::Connection(format!(
            "Collection '{}' holds a row that is not valid JSON: {}",
            collection, e
        ))
    })?;
    document_from_json(json).ok_or_else(|| {
        AppError::Connection(format!(
            "Collection '{}' holds a row that is not a JSON object",
            collection
        ))
    })
}

/// Quotes a collection name for use as a PostgreSQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quoted table name of a collection. PostgreSQL would silently truncate a
/// longer name, so two collections could end up sharing one table.
pub(crate) fn table_ident(collection: &str) -> Result<String> {
    if collection.len() > MAX_IDENTIFIER_LEN {
        return Err(AppError::Connection(format!(
            "Collection name '{}' is longer than {} bytes",
            collection, MAX_IDENTIFIER_LEN
        )));
    }
    Ok(quote_ident(collection))
}

/// Name of the PostgreSQL index built for index `name` on `collection`.
///
/// Names over the identifier limit are cut and suffixed with a digest of the
/// full name so distinct indexes keep distinct names.
pub(crate) fn index_name(collection: &str, name: &str) -> String {
    let full = format!("{}_{}", collection, name);
    if full.len() <= MAX_IDENTIFIER_LEN {
        return full;
    }
    let digest = hex::encode(Sha256::digest(full.as_bytes()));
    let suffix = &digest[..INDEX_DIGEST_LEN];
    let mut cut = MAX_IDENTIFIER_LEN - INDEX_DIGEST_LEN - 1;
    while !full.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}_{}", &full[..cut], suffix)
}

/// Builds the `CREATE INDEX` statement for an index record, if it describes a
/// secondary index on a collection of `database`.
pub(crate) fn index_ddl(record: &Document, database: &str) -> Option<String> {
    let name = record.get("name")?.as_str()?;
    if name == "_id_" {
        return None;
    }
    let (db, collection) = record.get("ns")?.as_str()?.split_once('.')?;
    if db != database
        || collection.starts_with(SYSTEM_PREFIX)
        || collection.len() > MAX_IDENTIFIER_LEN
    {
        return None;
    }
    let key = record.get("key")?.as_document()?;
    if key.is_empty() {
        return None;
    }

    let columns: Vec<String> = key
        .iter()
        .map(|(field, direction)| {
            let path = field
                .split('.')
                .map(|part| format!("\"{}\"", part.replace('\\', "\\\\").replace('"', "\\\"")))
                .collect::<Vec<_>>()
                .join(",");
            let descending = match direction {
                Value::Int(i) => *i < 0,
                Value::Float(f) => *f < 0.0,
                _ => false,
            };
            format!(
                "(doc #>> '{{{}}}'){}",
                path.replace('\'', "''"),
                if descending { " DESC" } else { "" }
            )
        })
        .collect();

    let unique = matches!(record.get("unique"), Some(Value::Bool(true)));
    Some(format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if unique { "UNIQUE " } else { "" },
        quote_ident(&index_name(collection, name)),
        quote_ident(collection),
        columns.join(", ")
    ))
}
