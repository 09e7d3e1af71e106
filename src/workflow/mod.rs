//! Workflow module - the asset lifecycle
//!
//! Structure:
//! - `types`: Transition results and the in-process guard
//! - `processors`: Transform pipeline and image codecs
//! - `transitions`: move / upload / upload_unprocessed / process
//! - `derivatives`: the `original` copy and named versions
//! - `worker`: one-message-at-a-time queue consumer

pub mod derivatives;
pub mod processors;
pub mod transitions;
pub mod types;
pub mod worker;

use log::{info, warn};
use std::sync::Arc;

use crate::common::errors::{AssetError, AssetResult};
use crate::config::kinds::{AssetKindConfig, KindRegistry};
use crate::models::asset::{Asset, AssetId, AssetState};
use crate::models::input::AssetInput;
use crate::queue::JobQueue;
use crate::repository::AssetRepository;
use crate::storage::ObjectStore;
use crate::storage::staging::Staging;

pub use types::{Mode, Transition};

/// The transition engine. Owns no state of its own beyond the registered
/// kinds and the three collaborators every transition talks to.
#[derive(Clone)]
pub struct Lifecycle {
    kinds: Arc<KindRegistry>,
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn JobQueue>,
    repository: Arc<dyn AssetRepository>,
    hostname: String,
}

impl Lifecycle {
    pub fn new(
        kinds: KindRegistry,
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn JobQueue>,
        repository: Arc<dyn AssetRepository>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            kinds: Arc::new(kinds),
            store,
            queue,
            repository,
            hostname: hostname.into(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn kinds(&self) -> &KindRegistry {
        &self.kinds
    }

    pub fn kind(&self, name: &str) -> AssetResult<Arc<AssetKindConfig>> {
        self.kinds.get(name)
    }

    pub fn load(&self, id: &AssetId) -> AssetResult<Option<Asset>> {
        Ok(self.repository.load(id)?)
    }

    // ────────────────────────────────────────────────────────────────
    // Creation
    // ────────────────────────────────────────────────────────────────

    /// Save a new asset and start its lifecycle, deferring slow steps when
    /// the kind asks for it.
    pub fn create(&self, asset: &mut Asset, input: Option<AssetInput>) -> AssetResult<Transition> {
        let input = self.require_input(asset, input)?;
        self.save(asset)?;
        self.run_move(asset, input, Mode::Deferred)
    }

    /// Save and run the whole pipeline, derivatives included, before returning.
    pub fn create_without_queue(
        &self,
        asset: &mut Asset,
        input: Option<AssetInput>,
    ) -> AssetResult<Transition> {
        let input = self.require_input(asset, input)?;
        self.save(asset)?;
        self.run_move(asset, input, Mode::Inline)
    }

    /// Save and process synchronously, but generate no versions.
    pub fn create_without_derivatives(
        &self,
        asset: &mut Asset,
        input: Option<AssetInput>,
    ) -> AssetResult<Transition> {
        let input = self.require_input(asset, input)?;
        self.save(asset)?;
        self.run_move(asset, input, Mode::InlineWithoutDerivatives)
    }

    fn require_input(&self, asset: &Asset, input: Option<AssetInput>) -> AssetResult<AssetInput> {
        input.ok_or_else(|| AssetError::validation(format!("asset {} has no input", asset.id)))
    }

    // ────────────────────────────────────────────────────────────────
    // Transitions
    // ────────────────────────────────────────────────────────────────

    pub fn move_asset(&self, asset: &mut Asset, input: AssetInput) -> AssetResult<Transition> {
        self.run_move(asset, input, Mode::Deferred)
    }

    pub fn move_without_queue(
        &self,
        asset: &mut Asset,
        input: AssetInput,
    ) -> AssetResult<Transition> {
        self.run_move(asset, input, Mode::Inline)
    }

    pub fn upload(&self, asset: &mut Asset) -> AssetResult<Transition> {
        self.run_upload(asset, Mode::Deferred)
    }

    pub fn upload_without_queue(&self, asset: &mut Asset) -> AssetResult<Transition> {
        self.run_upload(asset, Mode::Inline)
    }

    pub fn process(&self, asset: &mut Asset) -> AssetResult<Transition> {
        self.run_process(asset, None, Mode::Deferred)
    }

    pub fn process_without_queue(&self, asset: &mut Asset) -> AssetResult<Transition> {
        self.run_process(asset, None, Mode::Inline)
    }

    // ────────────────────────────────────────────────────────────────
    // Persistence
    // ────────────────────────────────────────────────────────────────

    /// Public save path: checks the record before writing it.
    pub fn save(&self, asset: &Asset) -> AssetResult<()> {
        self.kinds.get(&asset.kind)?;
        if let Some(name) = &asset.name {
            if name.trim().is_empty() {
                return Err(AssetError::validation(format!(
                    "asset {} has an empty name",
                    asset.id
                )));
            }
        }
        if asset.is_derivative() && asset.name.is_none() {
            return Err(AssetError::validation(format!(
                "derivative {} has no slot name",
                asset.id
            )));
        }
        self.persist(asset)
    }

    /// Write the record as-is. Only transitions call this, after their side
    /// effects have completed.
    pub(crate) fn persist(&self, asset: &Asset) -> AssetResult<()> {
        self.repository.store(asset)?;
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────
    // Destruction and lookup helpers
    // ────────────────────────────────────────────────────────────────

    /// Delete the remote object, any staged leftovers, every derivative and
    /// finally the record itself.
    pub fn destroy(&self, asset: &Asset) -> AssetResult<()> {
        let config = self.kinds.get(&asset.kind)?;
        for (name, child_id) in &asset.derivatives {
            match self.repository.load(child_id)? {
                Some(child) => self.destroy(&child)?,
                None => warn!("Derivative {} ({}) of {} already gone", name, child_id, asset.id),
            }
        }
        let key = asset.remote_key(config.format());
        self.store.delete(config.bucket(), &key)?;
        Staging::new(config.staging_dir()).delete(&asset.id)?;
        self.repository.remove(&asset.id)?;
        info!("Destroyed asset {} ({})", asset.id, key);
        Ok(())
    }

    pub fn url(&self, asset: &Asset) -> AssetResult<String> {
        let config = self.kinds.get(&asset.kind)?;
        Ok(self
            .store
            .url(config.bucket(), &asset.remote_key(config.format())))
    }

    /// Upload every asset of `kind` left in `moved` whose staged bytes live
    /// on this host. Returns how many were uploaded.
    pub fn handle_moved(&self, kind: &str) -> AssetResult<usize> {
        let config = self.kinds.get(kind)?;
        let staging = Staging::new(config.staging_dir());
        let mut uploaded = 0;
        for mut asset in self.repository.in_state(kind, AssetState::Moved)? {
            if !staging.exists(&asset.id) {
                continue;
            }
            if self.upload(&mut asset)?.applied() {
                uploaded += 1;
            }
        }
        Ok(uploaded)
    }
}
