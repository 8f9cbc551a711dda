//! The document-database persistence layer's thin client.
//!
//! The spec treats the document store as an external collaborator; this
//! module is the core's half of that contract. It is deliberately small:
//! one SQLite connection per call (mirroring the teacher's
//! `db::get_connection()`), four tables (artifacts, gateway cache, embedding
//! cache, gateway settings), and no cross-job transactions — the
//! concurrency model assumes single-writer-per-job semantics, so there is
//! nothing here to coordinate beyond SQLite's own locking.

use crate::errors::StorageError;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

pub fn get_app_data_dir() -> PathBuf {
    let dir = std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".tailoring-core");
    std::fs::create_dir_all(&dir).expect("failed to create app data directory");
    dir
}

pub fn get_db_path() -> PathBuf {
    get_app_data_dir().join("tailoring-core.db")
}

pub fn get_connection() -> Result<Connection, StorageError> {
    Connection::open(get_db_path()).map_err(|e| e.into())
}

pub fn init_database() -> Result<(), StorageError> {
    let conn = get_connection()?;
    run_migrations(&conn)
}

/// Runs every migration against an arbitrary connection. Exposed so tests
/// can stand up an in-memory database without touching the on-disk app
/// data directory.
pub fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;

    run_migration(conn, "001_artifacts", migration_001_artifacts)?;
    run_migration(conn, "002_gateway_cache", migration_002_gateway_cache)?;
    run_migration(conn, "003_embedding_cache", migration_003_embedding_cache)?;
    run_migration(conn, "004_gateway_settings", migration_004_gateway_settings)?;

    Ok(())
}

#[cfg(test)]
pub fn run_migrations_for_test(conn: &Connection) -> Result<(), StorageError> {
    run_migrations(conn)
}

fn run_migration(
    conn: &Connection,
    name: &str,
    f: impl FnOnce(&Connection) -> rusqlite::Result<()>,
) -> Result<(), StorageError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM migrations WHERE name = ?",
        [name],
        |row| row.get(0),
    )?;
    if count == 0 {
        f(conn)?;
        conn.execute(
            "INSERT INTO migrations (name, applied_at) VALUES (?, datetime('now'))",
            [name],
        )?;
    }
    Ok(())
}

fn migration_001_artifacts(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS artifacts (
            job_id TEXT PRIMARY KEY,
            artifact_json TEXT NOT NULL,
            partial INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn migration_002_gateway_cache(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS gateway_cache (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            purpose TEXT NOT NULL,
            input_hash TEXT NOT NULL,
            model_name TEXT NOT NULL,
            request_payload TEXT NOT NULL,
            response_payload TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT,
            UNIQUE(purpose, input_hash)
        )",
        [],
    )?;
    Ok(())
}

fn migration_003_embedding_cache(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS embedding_cache (
            source_hash TEXT PRIMARY KEY,
            embedding_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn migration_004_gateway_settings(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS gateway_settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            mode TEXT NOT NULL DEFAULT 'cloud',
            model_name TEXT,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

pub fn compute_input_hash(payload: &Value) -> Result<String, StorageError> {
    let serialized = serde_json::to_string(payload)
        .map_err(|e| StorageError::InvalidData(format!("failed to serialize cache payload: {}", e)))?;
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub model_name: String,
    pub response_payload: Value,
}

/// Look up a prior gateway response by purpose + input hash. Returns
/// `None` on a miss or on expiry, so the JD Structurer / bullet generator
/// can treat both identically: call the gateway again.
pub fn cache_get(conn: &Connection, purpose: &str, input_hash: &str) -> Result<Option<CacheEntry>, StorageError> {
    let now = Utc::now().to_rfc3339();
    let row: Option<(String, String, Option<String>)> = conn
        .query_row(
            "SELECT model_name, response_payload, expires_at FROM gateway_cache
             WHERE purpose = ?1 AND input_hash = ?2",
            [purpose, input_hash],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let Some((model_name, response_payload, expires_at)) = row else {
        return Ok(None);
    };
    if let Some(expires_at) = &expires_at {
        if expires_at.as_str() < now.as_str() {
            return Ok(None);
        }
    }
    let response_payload = serde_json::from_str(&response_payload)
        .map_err(|e| StorageError::InvalidData(format!("corrupt cache entry: {}", e)))?;
    Ok(Some(CacheEntry { model_name, response_payload }))
}

pub fn cache_put(
    conn: &Connection,
    purpose: &str,
    input_hash: &str,
    model_name: &str,
    request_payload: &Value,
    response_payload: &Value,
    ttl_days: Option<i64>,
) -> Result<(), StorageError> {
    let now = Utc::now();
    let expires_at = ttl_days.map(|days| (now + chrono::Duration::days(days)).to_rfc3339());

    conn.execute(
        "INSERT INTO gateway_cache (purpose, input_hash, model_name, request_payload, response_payload, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(purpose, input_hash) DO UPDATE SET
            model_name = excluded.model_name,
            request_payload = excluded.request_payload,
            response_payload = excluded.response_payload,
            created_at = excluded.created_at,
            expires_at = excluded.expires_at",
        rusqlite::params![
            purpose,
            input_hash,
            model_name,
            serde_json::to_string(request_payload).unwrap_or_default(),
            serde_json::to_string(response_payload).unwrap_or_default(),
            now.to_rfc3339(),
            expires_at,
        ],
    )?;
    Ok(())
}

pub fn embedding_cache_get(conn: &Connection, source_hash: &str) -> Result<Option<Vec<f32>>, StorageError> {
    let row: Option<String> = conn
        .query_row(
            "SELECT embedding_json FROM embedding_cache WHERE source_hash = ?",
            [source_hash],
            |row| row.get(0),
        )
        .optional()?;
    match row {
        Some(json) => Ok(Some(serde_json::from_str(&json)
            .map_err(|e| StorageError::InvalidData(format!("corrupt embedding cache entry: {}", e)))?)),
        None => Ok(None),
    }
}

pub fn embedding_cache_put(conn: &Connection, source_hash: &str, embedding: &[f32]) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO embedding_cache (source_hash, embedding_json, created_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(source_hash) DO UPDATE SET embedding_json = excluded.embedding_json",
        rusqlite::params![source_hash, serde_json::to_string(embedding).unwrap_or_default(), Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Persists the terminal aggregate keyed by job id. `partial` mirrors the
/// cancellation/budget-exhaustion contract: a job that was cut short still
/// writes what it has, flagged so a caller knows not to trust it as final.
pub fn save_artifact(conn: &Connection, job_id: &str, artifact_json: &Value, partial: bool) -> Result<(), StorageError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO artifacts (job_id, artifact_json, partial, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(job_id) DO UPDATE SET
            artifact_json = excluded.artifact_json,
            partial = excluded.partial,
            updated_at = excluded.updated_at",
        rusqlite::params![job_id, serde_json::to_string(artifact_json).unwrap_or_default(), partial as i64, now],
    )?;
    Ok(())
}

pub fn load_artifact(conn: &Connection, job_id: &str) -> Result<Option<(Value, bool)>, StorageError> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT artifact_json, partial FROM artifacts WHERE job_id = ?",
            [job_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    match row {
        Some((json, partial)) => Ok(Some((
            serde_json::from_str(&json)
                .map_err(|e| StorageError::InvalidData(format!("corrupt artifact: {}", e)))?,
            partial != 0,
        ))),
        None => Ok(None),
    }
}
