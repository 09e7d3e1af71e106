use image::DynamicImage;
use log::{debug, info, warn};
use std::time::Instant;

use super::{Lifecycle, Mode, Transition};
use crate::common::ORIGINAL_NAME;
use crate::common::errors::{AssetError, AssetResult};
use crate::config::kinds::AssetKindConfig;
use crate::models::asset::{Asset, AssetId, AssetState};
use crate::models::input::AssetInput;
use crate::models::job::JobPayload;
use crate::storage::staging::Staging;
use crate::workflow::processors::Pipeline;
use crate::workflow::processors::image::{decode_image, encode_image, encoded_dimensions};

impl Lifecycle {
    // ────────────────────────────────────────────────────────────────
    // received -> moved
    // ────────────────────────────────────────────────────────────────

    pub(crate) fn run_move(
        &self,
        asset: &mut Asset,
        input: AssetInput,
        mode: Mode,
    ) -> AssetResult<Transition> {
        if asset.state != AssetState::Received {
            return Ok(skipped(asset, "move"));
        }
        let config = self.kinds.get(&asset.kind)?;

        // Nothing to stage: go straight to uploaded
        let input = match input {
            AssetInput::Image(image) => return self.upload_decoded(asset, &config, image, mode),
            input => input,
        };

        let transition = self.stage(asset, &config, input)?;
        if mode.runs_inline(config.defers()) {
            self.run_upload(asset, mode)?;
        } else {
            self.enqueue(
                config.upload_queue(),
                JobPayload::upload(asset.id, self.hostname.clone()),
            )?;
        }
        Ok(transition)
    }

    /// The bare `move`: stage the bytes and record `moved`, nothing else.
    pub(crate) fn stage(
        &self,
        asset: &mut Asset,
        config: &AssetKindConfig,
        input: AssetInput,
    ) -> AssetResult<Transition> {
        if asset.state != AssetState::Received {
            return Ok(skipped(asset, "move"));
        }
        if input.is_image() {
            return Err(AssetError::validation(format!(
                "asset {} was given a decoded image to stage",
                asset.id
            )));
        }
        Staging::new(config.staging_dir()).write(&asset.id, input)?;
        self.advance(asset, AssetState::Moved, |_| {})
    }

    // ────────────────────────────────────────────────────────────────
    // moved -> uploaded
    // ────────────────────────────────────────────────────────────────

    pub(crate) fn run_upload(&self, asset: &mut Asset, mode: Mode) -> AssetResult<Transition> {
        if asset.state != AssetState::Moved {
            return Ok(skipped(asset, "upload"));
        }
        let config = self.kinds.get(&asset.kind)?;
        let started = Instant::now();
        let staging = Staging::new(config.staging_dir());

        let raw = staging.read(&asset.id)?;
        let image = decode_image(&raw).map_err(|err| {
            AssetError::validation(format!(
                "staged bytes of {} are not an image: {:#}",
                asset.id, err
            ))
        })?;
        let bytes = encode_image(&image, asset.format_or(config.format()))?;
        self.store.put(
            config.bucket(),
            &asset.remote_key(config.format()),
            &bytes,
            config.acl(),
        )?;

        let original = self.save_original(asset, &config, &raw)?;
        let transition = self.advance(asset, AssetState::Uploaded, |next| {
            link_original(next, original)
        })?;
        discard_staged(&staging, &asset.id);
        info!(duration = &*format!("{:?}", started.elapsed()); "Uploaded asset {}", asset.id);

        self.after_upload(asset, &config, &bytes, mode)?;
        Ok(transition)
    }

    fn upload_decoded(
        &self,
        asset: &mut Asset,
        config: &AssetKindConfig,
        image: DynamicImage,
        mode: Mode,
    ) -> AssetResult<Transition> {
        let started = Instant::now();
        let bytes = encode_image(&image, asset.format_or(config.format()))?;
        self.store.put(
            config.bucket(),
            &asset.remote_key(config.format()),
            &bytes,
            config.acl(),
        )?;

        let original = self.save_original(asset, config, &bytes)?;
        let transition = self.advance(asset, AssetState::Uploaded, |next| {
            link_original(next, original)
        })?;
        info!(duration = &*format!("{:?}", started.elapsed()); "Uploaded decoded asset {} without staging", asset.id);

        self.after_upload(asset, config, &bytes, mode)?;
        Ok(transition)
    }

    /// Hand the stored object to `process`. The inline pipeline starts from
    /// the canonical bytes, the same image a worker would fetch back.
    fn after_upload(
        &self,
        asset: &mut Asset,
        config: &AssetKindConfig,
        stored: &[u8],
        mode: Mode,
    ) -> AssetResult<()> {
        if mode.runs_inline(config.defers()) {
            self.run_process(asset, Some(decode_image(stored)?), mode)?;
        } else {
            self.enqueue(config.process_queue(), JobPayload::process(asset.id))?;
        }
        Ok(())
    }

    /// Queue `process` again for an asset whose upload already landed. A
    /// duplicate is harmless: the second delivery finds it `processed`.
    pub(crate) fn requeue_process(&self, asset: &Asset) -> AssetResult<()> {
        if asset.state != AssetState::Uploaded {
            return Ok(());
        }
        let config = self.kinds.get(&asset.kind)?;
        self.enqueue(config.process_queue(), JobPayload::process(asset.id))
    }

    /// `moved -> processed` for bytes that are already final: stored
    /// verbatim, no pipeline.
    pub fn upload_unprocessed(&self, asset: &mut Asset) -> AssetResult<Transition> {
        if asset.state != AssetState::Moved {
            return Ok(skipped(asset, "upload_unprocessed"));
        }
        let config = self.kinds.get(&asset.kind)?;
        let staging = Staging::new(config.staging_dir());

        let raw = staging.read(&asset.id)?;
        let (width, height) = encoded_dimensions(&raw).map_err(|err| {
            AssetError::validation(format!(
                "staged bytes of {} are not an image: {:#}",
                asset.id, err
            ))
        })?;
        self.store.put(
            config.bucket(),
            &asset.remote_key(config.format()),
            &raw,
            config.acl(),
        )?;

        let transition = self.advance(asset, AssetState::Processed, |next| {
            next.width = width;
            next.height = height;
        })?;
        discard_staged(&staging, &asset.id);
        debug!("Uploaded {} unprocessed ({}x{})", asset.id, width, height);
        Ok(transition)
    }

    // ────────────────────────────────────────────────────────────────
    // uploaded -> processed
    // ────────────────────────────────────────────────────────────────

    pub(crate) fn run_process(
        &self,
        asset: &mut Asset,
        image: Option<DynamicImage>,
        mode: Mode,
    ) -> AssetResult<Transition> {
        if asset.state != AssetState::Uploaded {
            return Ok(skipped(asset, "process"));
        }
        let config = self.kinds.get(&asset.kind)?;
        let started = Instant::now();
        let format = asset.format_or(config.format());
        let key = asset.remote_key(config.format());

        let image = match image {
            Some(image) => image,
            None => decode_image(&self.store.get(config.bucket(), &key)?)?,
        };

        let pipeline = self.pipeline_for(asset, &config);
        let processed = pipeline.apply(image, asset)?;
        if !pipeline.is_empty() {
            let bytes = encode_image(&processed, format)?;
            self.store.put(config.bucket(), &key, &bytes, config.acl())?;
        }

        let derivatives = if mode.generates() && config.generates() && !asset.is_derivative() {
            self.generate_derivatives(asset, &config, &processed, mode)?
        } else {
            Default::default()
        };

        let (width, height) = (processed.width(), processed.height());
        let transition = self.advance(asset, AssetState::Processed, |next| {
            next.width = width;
            next.height = height;
            next.format = Some(format);
            next.derivatives.extend(derivatives);
        })?;
        info!(duration = &*format!("{:?}", started.elapsed()); "Processed asset {} ({})", asset.id, asset.size());
        Ok(transition)
    }

    fn pipeline_for(&self, asset: &Asset, config: &AssetKindConfig) -> Pipeline {
        if !asset.is_derivative() {
            return config.pipeline().clone();
        }
        asset
            .name
            .as_deref()
            .and_then(|name| config.version(name))
            .map(|version| version.pipeline())
            .unwrap_or_default()
    }

    // ────────────────────────────────────────────────────────────────
    // Helpers
    // ────────────────────────────────────────────────────────────────

    /// Persist the next state, then adopt it. The caller's value only
    /// changes once the record has been written.
    fn advance(
        &self,
        asset: &mut Asset,
        to: AssetState,
        update: impl FnOnce(&mut Asset),
    ) -> AssetResult<Transition> {
        let from = asset.state;
        let mut next = asset.clone();
        update(&mut next);
        next.state = to;
        self.persist(&next)?;
        *asset = next;
        debug!("Asset {}: {} -> {}", asset.id, from, to);
        Ok(Transition::Applied { from, to })
    }

    fn enqueue(&self, queue: &str, payload: JobPayload) -> AssetResult<()> {
        self.queue.push(queue, &payload.to_body()?)?;
        debug!("Queued {} on {}", payload.id, queue);
        Ok(())
    }
}

fn link_original(asset: &mut Asset, original: Option<AssetId>) {
    if let Some(id) = original {
        asset.derivatives.insert(ORIGINAL_NAME.to_string(), id);
    }
}

/// The new state is already recorded, so a file that will not go away is
/// only logged.
fn discard_staged(staging: &Staging, id: &AssetId) {
    if let Err(err) = staging.delete(id) {
        warn!("Leaving staged file of {} behind: {:#}", id, err);
    }
}

fn skipped(asset: &Asset, transition: &str) -> Transition {
    debug!(
        "Skipping {} for asset {}: already {}",
        transition, asset.id, asset.state
    );
    Transition::Skipped { state: asset.state }
}
