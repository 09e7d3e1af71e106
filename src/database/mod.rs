use anyhow::{Context, Result};
use log::info;
use redb::{Database, TableDefinition};
use std::{fs, path::Path, sync::Arc};

/// Asset records keyed by id, `bitcode`-encoded.
pub const ASSET_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("asset");

/// Queued messages keyed by `(queue name, sequence)`.
pub const MESSAGE_TABLE: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("message");

pub const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence");

/// Open (or create) the database file and make sure every table exists.
pub fn open_database(path: &Path) -> Result<Arc<Database>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .context(format!("failed to create database directory {:?}", parent))?;
    }
    let database =
        Database::create(path).context(format!("failed to open database {:?}", path))?;

    let txn = database.begin_write()?;
    {
        let _ = txn.open_table(ASSET_TABLE)?;
        let _ = txn.open_table(MESSAGE_TABLE)?;
        let _ = txn.open_table(SEQUENCE_TABLE)?;
    }
    txn.commit()?;
    info!("Database tables initialized at {:?}", path);

    Ok(Arc::new(database))
}
