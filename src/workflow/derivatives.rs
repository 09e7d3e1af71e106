use image::DynamicImage;
use log::{debug, info};
use std::collections::BTreeMap;
use std::time::Instant;

use super::{Lifecycle, Mode};
use crate::common::ORIGINAL_NAME;
use crate::common::errors::AssetResult;
use crate::config::kinds::AssetKindConfig;
use crate::models::asset::{Asset, AssetFormat, AssetId};
use crate::models::input::AssetInput;

impl Lifecycle {
    /// Keep the untouched upload bytes as the `original` derivative.
    ///
    /// Runs only for root assets of kinds that keep originals. The child is
    /// staged and stored verbatim, so it reaches `processed` with no
    /// pipeline and no queue round trip.
    pub(crate) fn save_original(
        &self,
        parent: &Asset,
        config: &AssetKindConfig,
        raw: &[u8],
    ) -> AssetResult<Option<AssetId>> {
        if parent.is_derivative() || !config.keeps_original() {
            return Ok(None);
        }
        let format = AssetFormat::guess(raw).unwrap_or(parent.format_or(config.format()));
        let mut original = Asset::derivative_of(parent, ORIGINAL_NAME, Some(format));
        self.save(&original)?;
        self.stage(&mut original, config, AssetInput::Bytes(raw.to_vec()))?;
        self.upload_unprocessed(&mut original)?;
        debug!(
            "Kept original of {} as {} ({})",
            parent.id,
            original.id,
            original.size()
        );
        Ok(Some(original.id))
    }

    /// Create one child per declared version from the parent's final image.
    ///
    /// Children are fresh records with stable ids, so regenerating replaces
    /// the previous rendition rather than adding another.
    pub(crate) fn generate_derivatives(
        &self,
        parent: &Asset,
        config: &AssetKindConfig,
        image: &DynamicImage,
        mode: Mode,
    ) -> AssetResult<BTreeMap<String, AssetId>> {
        let mut created = BTreeMap::new();
        for version in config.versions() {
            let started = Instant::now();
            let format = version.format.unwrap_or(config.format());
            let mut child = Asset::derivative_of(parent, &version.name, Some(format));
            self.save(&child)?;
            self.run_move(&mut child, AssetInput::Image(image.clone()), mode)?;
            info!(duration = &*format!("{:?}", started.elapsed()); "Generated {} for asset {} ({})", version.name, parent.id, child.state);
            created.insert(version.name.clone(), child.id);
        }
        Ok(created)
    }
}
