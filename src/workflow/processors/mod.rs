//! Processors module - ordered image transforms applied during `process`
//!
//! This module contains the following submodules:
//! - `image`: Decoding, encoding and resizing helpers

pub mod image;

use ::image::DynamicImage;
use anyhow::Result;
use std::fmt;
use std::sync::Arc;

use crate::common::errors::{AssetError, AssetResult};
use crate::models::asset::Asset;

pub type ImageFn = dyn Fn(DynamicImage) -> Result<DynamicImage> + Send + Sync;
pub type AssetImageFn = dyn Fn(DynamicImage, &Asset) -> Result<DynamicImage> + Send + Sync;

/// One step of a pipeline. Steps that need to know which asset they are
/// transforming take it as a second argument.
#[derive(Clone)]
pub enum Processor {
    Image(Arc<ImageFn>),
    WithAsset(Arc<AssetImageFn>),
}

impl Processor {
    pub fn image<F>(f: F) -> Self
    where
        F: Fn(DynamicImage) -> Result<DynamicImage> + Send + Sync + 'static,
    {
        Processor::Image(Arc::new(f))
    }

    pub fn with_asset<F>(f: F) -> Self
    where
        F: Fn(DynamicImage, &Asset) -> Result<DynamicImage> + Send + Sync + 'static,
    {
        Processor::WithAsset(Arc::new(f))
    }

    fn call(&self, image: DynamicImage, asset: &Asset) -> Result<DynamicImage> {
        match self {
            Processor::Image(f) => f(image),
            Processor::WithAsset(f) => f(image, asset),
        }
    }
}

#[derive(Clone, Default)]
pub struct Pipeline {
    processors: Vec<Processor>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, processor: Processor) -> Self {
        self.push(processor);
        self
    }

    pub fn push(&mut self, processor: Processor) {
        self.processors.push(processor);
    }

    pub fn extend(&mut self, other: &Pipeline) {
        self.processors.extend(other.processors.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Run every processor in registration order, feeding each one the
    /// previous output. A failing step or an empty image aborts the run.
    pub fn apply(&self, image: DynamicImage, asset: &Asset) -> AssetResult<DynamicImage> {
        let mut current = image;
        for (index, processor) in self.processors.iter().enumerate() {
            current = processor.call(current, asset).map_err(|err| {
                AssetError::validation(format!(
                    "processor #{} failed for asset {}: {:#}",
                    index, asset.id, err
                ))
            })?;
            if current.width() == 0 || current.height() == 0 {
                return Err(AssetError::validation(format!(
                    "processor #{} returned no image for asset {}",
                    index, asset.id
                )));
            }
        }
        Ok(current)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pipeline({} processors)", self.processors.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::Mutex;

    #[test]
    fn processors_run_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (first, second) = (order.clone(), order.clone());
        let pipeline = Pipeline::new()
            .then(Processor::image(move |image| {
                first.lock().unwrap().push("f1");
                Ok(image.crop_imm(0, 0, 8, 6))
            }))
            .then(Processor::image(move |image| {
                second.lock().unwrap().push("f2");
                assert_eq!((image.width(), image.height()), (8, 6));
                Ok(image.crop_imm(0, 0, 4, 2))
            }));

        let out = pipeline
            .apply(DynamicImage::new_rgb8(10, 10), &Asset::new("photo"))
            .unwrap();
        assert_eq!((out.width(), out.height()), (4, 2));
        assert_eq!(*order.lock().unwrap(), vec!["f1", "f2"]);
    }

    #[test]
    fn asset_aware_processor_sees_the_asset() {
        let asset = Asset::new("photo").named("banner");
        let pipeline = Pipeline::new().then(Processor::with_asset(|image, asset| {
            assert_eq!(asset.name.as_deref(), Some("banner"));
            Ok(image)
        }));
        assert!(pipeline.apply(DynamicImage::new_rgb8(2, 2), &asset).is_ok());
    }

    #[test]
    fn failing_or_empty_output_is_a_validation_error() {
        let asset = Asset::new("photo");
        let failing = Pipeline::new().then(Processor::image(|_| bail!("not an image")));
        assert!(matches!(
            failing.apply(DynamicImage::new_rgb8(2, 2), &asset),
            Err(AssetError::Validation(_))
        ));

        let empty = Pipeline::new().then(Processor::image(|_| Ok(DynamicImage::new_rgb8(0, 0))));
        assert!(matches!(
            empty.apply(DynamicImage::new_rgb8(2, 2), &asset),
            Err(AssetError::Validation(_))
        ));
    }
}
