use anyhow::{Context, Result};
use redb::{Database, ReadableTable};
use std::sync::Arc;

use super::AssetRepository;
use crate::database::ASSET_TABLE;
use crate::models::asset::{Asset, AssetId, AssetState};

pub struct RedbRepository {
    database: Arc<Database>,
}

impl RedbRepository {
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }
}

impl AssetRepository for RedbRepository {
    fn load(&self, id: &AssetId) -> Result<Option<Asset>> {
        let txn = self.database.begin_read()?;
        let table = txn.open_table(ASSET_TABLE)?;
        let Some(bytes) = table.get(id.as_str())? else {
            return Ok(None);
        };
        let asset = bitcode::decode(bytes.value())
            .context(format!("failed to decode asset record {}", id))?;
        Ok(Some(asset))
    }

    fn store(&self, asset: &Asset) -> Result<()> {
        let txn = self.database.begin_write()?;
        {
            let mut table = txn.open_table(ASSET_TABLE)?;
            table.insert(asset.id.as_str(), bitcode::encode(asset).as_slice())?;
        }
        txn.commit()
            .context(format!("failed to commit asset record {}", asset.id))?;
        Ok(())
    }

    fn remove(&self, id: &AssetId) -> Result<()> {
        let txn = self.database.begin_write()?;
        {
            let mut table = txn.open_table(ASSET_TABLE)?;
            table.remove(id.as_str())?;
        }
        txn.commit()
            .context(format!("failed to commit removal of {}", id))?;
        Ok(())
    }

    fn in_state(&self, kind: &str, state: AssetState) -> Result<Vec<Asset>> {
        let txn = self.database.begin_read()?;
        let table = txn.open_table(ASSET_TABLE)?;
        let mut found = Vec::new();
        for item in table.iter()? {
            let (_, value) = item?;
            let asset: Asset =
                bitcode::decode(value.value()).context("failed to decode asset record")?;
            if asset.kind == kind && asset.state == state {
                found.push(asset);
            }
        }
        found.sort_by_key(|asset| asset.created_at);
        Ok(found)
    }
}
