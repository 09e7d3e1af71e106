pub mod memory;
pub mod redb;

use anyhow::Result;

use crate::models::asset::{Asset, AssetId, AssetState};

/// Loads and stores asset records by id. Writes are unconditional; the
/// lifecycle decides when a record may be written.
pub trait AssetRepository: Send + Sync {
    fn load(&self, id: &AssetId) -> Result<Option<Asset>>;

    fn store(&self, asset: &Asset) -> Result<()>;

    fn remove(&self, id: &AssetId) -> Result<()>;

    fn in_state(&self, kind: &str, state: AssetState) -> Result<Vec<Asset>>;
}
