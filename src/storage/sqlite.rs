//! sqlite-vec backed memory store
//!
//! Dual storage approach borrowed from the system's other deployments:
//! - a scalar row table holding record fields and extra metadata
//! - a separate vec0 virtual table for embeddings, keyed by record id
//! - connection pooling for concurrent access (deadpool-sqlite)
//!
//! Embedding happens here at the store boundary; the pipeline only ever
//! supplies query text and metadata filters.

use crate::error::{PaideiaError, Result};
use crate::services::EmbeddingService;
use crate::storage::{FilterOp, MemoryStore, RecordFilter};
use crate::types::{MemoryRecord, MemoryType, MetadataValue, RecordId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_sqlite::{Config, Pool, Runtime};
use rusqlite::types::Value as SqlValue;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// vec0 KNN runs before the metadata predicates apply, so the nearest-
/// neighbor pass over-fetches by this factor and the predicates cut the
/// pool down afterwards
const KNN_OVERFETCH: usize = 4;

/// Memory store over sqlite-vec with connection pooling
pub struct SqliteMemoryStore {
    pool: Pool,
    embedder: Arc<dyn EmbeddingService>,
    dimensions: usize,
}

impl SqliteMemoryStore {
    /// Create a new store instance
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `embedder` - Embedding service used at the store boundary
    pub fn new<P: AsRef<Path>>(db_path: P, embedder: Arc<dyn EmbeddingService>) -> Result<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();
        let dimensions = embedder.dimensions();
        info!(path = %path_str, dimensions, "Creating memory store pool");

        // Load sqlite-vec as an auto-extension so it's available to every
        // connection in the pool.
        unsafe {
            use rusqlite::ffi::sqlite3_auto_extension;

            #[allow(clippy::missing_transmute_annotations)]
            sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }

        let config = Config::new(path_str);
        let pool = config.create_pool(Runtime::Tokio1).map_err(|e| {
            PaideiaError::StoreQuery(format!("Failed to create connection pool: {}", e))
        })?;

        Ok(Self {
            pool,
            embedder,
            dimensions,
        })
    }

    /// Create the record table and the vec0 virtual table
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<()> {
        let dimensions = self.dimensions;
        let conn = self.pool.get().await.map_err(|e| {
            PaideiaError::StoreWrite(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.interact(move |conn| -> Result<()> {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS memory_records (
                    record_id TEXT PRIMARY KEY,
                    student_id TEXT NOT NULL,
                    subject TEXT NOT NULL,
                    topic TEXT NOT NULL,
                    difficulty_level INTEGER NOT NULL,
                    learning_style TEXT NOT NULL,
                    memory_type TEXT NOT NULL,
                    timestamp TEXT,
                    content TEXT NOT NULL,
                    document_title TEXT,
                    extra TEXT NOT NULL DEFAULT '{}'
                )",
                [],
            )
            .map_err(|e| PaideiaError::StoreWrite(format!("Failed to create record table: {}", e)))?;

            conn.execute(
                &format!(
                    "CREATE VIRTUAL TABLE IF NOT EXISTS record_vectors USING vec0(
                        record_id TEXT PRIMARY KEY,
                        embedding FLOAT[{}] distance_metric=cosine
                    )",
                    dimensions
                ),
                [],
            )
            .map_err(|e| PaideiaError::StoreWrite(format!("Failed to create vec0 table: {}", e)))?;

            Ok(())
        })
        .await
        .map_err(|e| PaideiaError::StoreWrite(format!("Pool interaction failed: {}", e)))??;

        info!("Memory store schema ready");
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn insert(&self, record: &MemoryRecord) -> Result<RecordId> {
        record.validate()?;
        let id = record.record_id()?;

        let embedding = self.embedder.embed(&record.content).await?;
        if embedding.len() != self.dimensions {
            return Err(PaideiaError::Embedding(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimensions,
                embedding.len()
            )));
        }
        let embedding_json = serde_json::to_string(&embedding)?;
        let extra_json = serde_json::to_string(&record.extra)?;

        debug!(record_id = %id, "Inserting memory record");

        let conn = self.pool.get().await.map_err(|e| {
            PaideiaError::StoreWrite(format!("Failed to get connection from pool: {}", e))
        })?;

        let row = record.clone();
        let id_str = id.0.clone();
        conn.interact(move |conn| -> Result<()> {
            let tx = conn
                .transaction()
                .map_err(|e| PaideiaError::StoreWrite(format!("Failed to open transaction: {}", e)))?;

            // Records are append-only; a colliding identity key is a
            // caller error, not something to overwrite.
            tx.execute(
                "INSERT INTO memory_records
                    (record_id, student_id, subject, topic, difficulty_level,
                     learning_style, memory_type, timestamp, content, document_title, extra)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    &id_str,
                    &row.student_id,
                    &row.subject,
                    &row.topic,
                    row.difficulty_level as i64,
                    &row.learning_style,
                    row.memory_type.as_str(),
                    row.timestamp.map(|ts| ts.to_rfc3339()),
                    &row.content,
                    &row.document_title,
                    &extra_json,
                ],
            )
            .map_err(|e| PaideiaError::StoreWrite(format!("Failed to insert record: {}", e)))?;

            tx.execute(
                "INSERT INTO record_vectors (record_id, embedding) VALUES (?1, vec_f32(?2))",
                rusqlite::params![&id_str, &embedding_json],
            )
            .map_err(|e| PaideiaError::StoreWrite(format!("Failed to insert vector: {}", e)))?;

            tx.commit()
                .map_err(|e| PaideiaError::StoreWrite(format!("Failed to commit insert: {}", e)))
        })
        .await
        .map_err(|e| PaideiaError::StoreWrite(format!("Pool interaction failed: {}", e)))??;

        Ok(id)
    }

    async fn query(
        &self,
        filters: &[RecordFilter],
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<(MemoryRecord, f32)>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query_text).await?;
        let embedding_json = serde_json::to_string(&embedding)?;

        let (where_clause, filter_params) = compile_filters(filters);
        let knn_k = top_k * KNN_OVERFETCH;

        let sql = format!(
            "WITH nearest AS (
                SELECT record_id, distance
                FROM record_vectors
                WHERE embedding MATCH vec_f32(?1) AND k = ?2
            )
            SELECT r.student_id, r.subject, r.topic, r.difficulty_level,
                   r.learning_style, r.memory_type, r.timestamp, r.content,
                   r.document_title, r.extra, n.distance
            FROM nearest n
            JOIN memory_records r ON r.record_id = n.record_id
            {}
            ORDER BY n.distance
            LIMIT ?3",
            where_clause
        );

        debug!(top_k, filters = filters.len(), "Querying memory store");

        let conn = self.pool.get().await.map_err(|e| {
            PaideiaError::StoreQuery(format!("Failed to get connection from pool: {}", e))
        })?;

        let rows = conn
            .interact(move |conn| -> Result<Vec<(MemoryRecord, f32)>> {
                let mut stmt = conn
                    .prepare(&sql)
                    .map_err(|e| PaideiaError::StoreQuery(format!("Failed to prepare query: {}", e)))?;

                let mut params: Vec<SqlValue> = vec![
                    SqlValue::Text(embedding_json),
                    SqlValue::Integer(knn_k as i64),
                    SqlValue::Integer(top_k as i64),
                ];
                params.extend(filter_params);

                let mapped = stmt
                    .query_map(rusqlite::params_from_iter(params), row_to_record)
                    .map_err(|e| PaideiaError::StoreQuery(format!("Query failed: {}", e)))?;

                let mut results = Vec::new();
                for row in mapped {
                    let row =
                        row.map_err(|e| PaideiaError::StoreQuery(format!("Row read failed: {}", e)))?;
                    results.push(row?);
                }
                Ok(results)
            })
            .await
            .map_err(|e| PaideiaError::StoreQuery(format!("Pool interaction failed: {}", e)))??;

        Ok(rows)
    }
}

/// Compile metadata filters to a WHERE clause with positional parameters
///
/// The first three positions are taken by the embedding, KNN k, and the
/// result limit, so filter parameters start at ?4.
fn compile_filters(filters: &[RecordFilter]) -> (String, Vec<SqlValue>) {
    if filters.is_empty() {
        return (String::new(), Vec::new());
    }

    let mut clauses = Vec::new();
    let mut params = Vec::new();
    let mut position = 4;

    for filter in filters {
        let column = filter.field.column();
        match &filter.op {
            FilterOp::Eq(value) => {
                clauses.push(format!("r.{} = ?{}", column, position));
                params.push(to_sql_value(value));
                position += 1;
            }
            FilterOp::Ne(value) => {
                clauses.push(format!("r.{} != ?{}", column, position));
                params.push(to_sql_value(value));
                position += 1;
            }
            FilterOp::In(values) => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|_| {
                        let p = format!("?{}", position);
                        position += 1;
                        p
                    })
                    .collect();
                clauses.push(format!("r.{} IN ({})", column, placeholders.join(", ")));
                params.extend(values.iter().map(to_sql_value));
            }
        }
    }

    (format!("WHERE {}", clauses.join(" AND ")), params)
}

fn to_sql_value(value: &MetadataValue) -> SqlValue {
    match value {
        MetadataValue::Str(s) => SqlValue::Text(s.clone()),
        MetadataValue::Int(i) => SqlValue::Integer(*i),
        MetadataValue::Float(f) => SqlValue::Real(*f),
        MetadataValue::Bool(b) => SqlValue::Integer(*b as i64),
    }
}

/// Map a joined row back into a record with its similarity score
///
/// vec0 reports cosine distance in [0, 2]; similarity is 1 - distance/2
/// so the pipeline sees a [0, 1] score.
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<(MemoryRecord, f32)>> {
    let memory_type_str: String = row.get(5)?;
    let timestamp_str: Option<String> = row.get(6)?;
    let extra_json: String = row.get(9)?;
    let distance: f64 = row.get(10)?;

    let memory_type = match MemoryType::parse(&memory_type_str) {
        Ok(ty) => ty,
        Err(e) => return Ok(Err(e)),
    };

    let timestamp: Option<DateTime<Utc>> = timestamp_str
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let extra: BTreeMap<String, MetadataValue> = match serde_json::from_str(&extra_json) {
        Ok(extra) => extra,
        Err(e) => return Ok(Err(PaideiaError::Serialization(e))),
    };

    let record = MemoryRecord {
        student_id: row.get(0)?,
        subject: row.get(1)?,
        topic: row.get(2)?,
        difficulty_level: row.get::<_, i64>(3)? as u8,
        learning_style: row.get(4)?,
        memory_type,
        timestamp,
        content: row.get(7)?,
        document_title: row.get(8)?,
        extra,
    };

    let similarity = (1.0 - distance / 2.0) as f32;
    Ok(Ok((record, similarity)))
}
