use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;

use super::catalog::write_atomic;
use super::layout::{KvLayout, is_plain_name};
use super::read::{load_tables, owns};
use crate::model::{Value, encode_value};

fn check_namespace(layout: &KvLayout, namespace_id: &str) -> Result<()> {
    if !is_plain_name(namespace_id) || !layout.kv_dir().join(namespace_id).is_dir() {
        anyhow::bail!("namespace not found: {}", namespace_id);
    }
    Ok(())
}

pub(super) fn update_value(
    layout: &KvLayout,
    namespace_id: &str,
    key: &str,
    value: &Value,
) -> Result<()> {
    check_namespace(layout, namespace_id)?;

    let tables = load_tables(layout)?;
    let row = tables
        .iter()
        .flat_map(|(_, rows)| rows)
        .find(|row| row.key == key && owns(layout, namespace_id, row))
        .ok_or_else(|| anyhow!("Key not found: {}", key))?;

    let blob = layout.blob_path(namespace_id, &row.blob_id);
    write_atomic(&blob, &encode_value(value).context("serialize value")?)
        .with_context(|| format!("write value for key {}", key))
}

/// Deletes rows and blobs for `keys`. Every key must exist; otherwise
/// nothing is deleted.
pub(super) fn delete_keys(layout: &KvLayout, namespace_id: &str, keys: &[String]) -> Result<()> {
    check_namespace(layout, namespace_id)?;

    let tables = load_tables(layout)?;
    let mut by_db: BTreeMap<PathBuf, Vec<(String, PathBuf)>> = BTreeMap::new();
    for key in keys {
        let (db, row) = tables
            .iter()
            .flat_map(|(db, rows)| rows.iter().map(move |row| (db, row)))
            .find(|(_, row)| &row.key == key && owns(layout, namespace_id, row))
            .ok_or_else(|| anyhow!("Key not found: {}", key))?;
        by_db
            .entry(db.clone())
            .or_default()
            .push((key.clone(), layout.blob_path(namespace_id, &row.blob_id)));
    }

    let mut blobs = Vec::new();
    for (db, rows) in by_db {
        let mut conn =
            Connection::open(&db).with_context(|| format!("open {}", db.display()))?;
        let tx = conn.transaction().context("begin transaction")?;
        for (key, blob) in rows {
            tx.execute("DELETE FROM _mf_entries WHERE key = ?1", [&key])
                .with_context(|| format!("Failed to delete key: {}", key))?;
            blobs.push(blob);
        }
        tx.commit().context("commit transaction")?;
    }

    for blob in blobs {
        if blob.exists() {
            fs::remove_file(&blob).with_context(|| format!("remove blob {}", blob.display()))?;
        }
    }
    Ok(())
}
