use anyhow::Result;
use dashmap::DashMap;

use super::AssetRepository;
use crate::models::asset::{Asset, AssetId, AssetState};

#[derive(Debug, Default)]
pub struct MemoryRepository {
    assets: DashMap<AssetId, Asset>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &AssetId) -> Option<Asset> {
        self.assets.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl AssetRepository for MemoryRepository {
    fn load(&self, id: &AssetId) -> Result<Option<Asset>> {
        Ok(self.get(id))
    }

    fn store(&self, asset: &Asset) -> Result<()> {
        self.assets.insert(asset.id, asset.clone());
        Ok(())
    }

    fn remove(&self, id: &AssetId) -> Result<()> {
        self.assets.remove(id);
        Ok(())
    }

    fn in_state(&self, kind: &str, state: AssetState) -> Result<Vec<Asset>> {
        let mut found: Vec<Asset> = self
            .assets
            .iter()
            .filter(|entry| entry.kind == kind && entry.state == state)
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|asset| asset.created_at);
        Ok(found)
    }
}
