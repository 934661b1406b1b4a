use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::warn;

use super::layout::{KvLayout, is_plain_name};
use crate::model::{Entry, Namespace, Value};

pub(super) struct Row {
    pub(super) key: String,
    pub(super) blob_id: String,
    pub(super) expiration: Option<i64>,
    pub(super) metadata: Option<String>,
}

pub(super) fn load_rows(db: &Path) -> Result<Vec<Row>> {
    let conn = Connection::open(db).with_context(|| format!("open {}", db.display()))?;
    let mut stmt = conn
        .prepare("SELECT key, blob_id, expiration, metadata FROM _mf_entries ORDER BY key")
        .context("prepare entry query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Row {
                key: row.get(0)?,
                blob_id: row.get(1)?,
                expiration: row.get(2)?,
                metadata: row.get(3)?,
            })
        })
        .context("query entries")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("read entries from {}", db.display()))
}

/// Rows of every readable database, paired with the database they came from.
pub(super) fn load_tables(layout: &KvLayout) -> Result<Vec<(PathBuf, Vec<Row>)>> {
    let mut tables = Vec::new();
    for db in layout.databases()? {
        match load_rows(&db) {
            Ok(rows) => tables.push((db, rows)),
            Err(err) => warn!(db = %db.display(), "skipping database: {:#}", err),
        }
    }
    Ok(tables)
}

/// A row belongs to a namespace when its blob lives in that namespace.
pub(super) fn owns(layout: &KvLayout, namespace_id: &str, row: &Row) -> bool {
    is_plain_name(&row.blob_id) && layout.blob_path(namespace_id, &row.blob_id).is_file()
}

pub(super) fn read_namespaces(layout: &KvLayout, folder_id: &str) -> Result<Vec<Namespace>> {
    let tables = load_tables(layout)?;

    let mut out = Vec::new();
    for namespace_id in layout.namespace_ids()? {
        let mut entries = Vec::new();
        for row in tables.iter().flat_map(|(_, rows)| rows) {
            if !owns(layout, &namespace_id, row) {
                continue;
            }
            let blob = layout.blob_path(&namespace_id, &row.blob_id);
            entries.push(Entry {
                key: row.key.clone(),
                value: read_blob(&blob),
                // Miniflare stores milliseconds.
                expiration: row.expiration.map(|ms| ms / 1000),
                metadata: row.metadata.clone(),
            });
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        out.push(super::namespace(folder_id, namespace_id, entries));
    }
    Ok(out)
}

fn read_blob(path: &Path) -> Option<Value> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(blob = %path.display(), "unreadable blob: {}", err);
            return None;
        }
    };
    Some(parse_blob(&String::from_utf8_lossy(&bytes)))
}

/// JSON when possible, JSON embedded after a leading prefix next, raw text last.
pub(super) fn parse_blob(text: &str) -> Value {
    if let Ok(value) = serde_json::from_str(text) {
        return value;
    }
    if let Some(start) = text.find(['{', '['])
        && let Ok(value) = serde_json::from_str(&text[start..])
    {
        return value;
    }
    Value::String(text.to_string())
}
