use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use path_clean::PathClean;

use crate::common::errors::{AssetError, AssetResult};
use crate::common::{DEFAULT_BUCKET, DEFAULT_QUEUE, DEFAULT_STAGING_DIR, ORIGINAL_NAME};
use crate::models::asset::AssetFormat;
use crate::storage::Acl;
use crate::workflow::processors::{Pipeline, Processor, image::crop_resize};

/// A named secondary rendition generated from a processed parent.
#[derive(Debug, Clone)]
pub struct VersionSpec {
    pub name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<AssetFormat>,
    pub transforms: Option<Pipeline>,
}

impl VersionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            width: None,
            height: None,
            format: None,
            transforms: None,
        }
    }

    pub fn sized(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self::new(name).width(width).height(height)
    }

    pub fn width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.height = Some(height);
        self
    }

    pub fn format(mut self, format: AssetFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn transforms(mut self, transforms: Pipeline) -> Self {
        self.transforms = Some(transforms);
        self
    }

    /// The implicit crop/resize for the size (if any), then the custom list.
    pub fn pipeline(&self) -> Pipeline {
        let mut pipeline = Pipeline::new();
        if self.width.is_some() || self.height.is_some() {
            let (width, height) = (self.width, self.height);
            pipeline.push(Processor::image(move |image| {
                Ok(crop_resize(&image, width, height))
            }));
        }
        if let Some(transforms) = &self.transforms {
            pipeline.extend(transforms);
        }
        pipeline
    }
}

/// Immutable per-kind settings, shared by every asset of that kind.
#[derive(Debug, Clone)]
pub struct AssetKindConfig {
    name: String,
    bucket: String,
    process_queue: String,
    upload_queue: String,
    format: AssetFormat,
    pipeline: Pipeline,
    versions: BTreeMap<String, VersionSpec>,
    staging_dir: PathBuf,
    acl: Acl,
    defer: bool,
    generate: bool,
    keep_original: bool,
}

impl AssetKindConfig {
    pub fn builder(name: impl Into<String>) -> AssetKindBuilder {
        AssetKindBuilder {
            config: AssetKindConfig {
                name: name.into(),
                bucket: DEFAULT_BUCKET.to_string(),
                process_queue: DEFAULT_QUEUE.to_string(),
                upload_queue: format!("{}-upload", DEFAULT_QUEUE),
                format: AssetFormat::Png,
                pipeline: Pipeline::new(),
                versions: BTreeMap::new(),
                staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
                acl: Acl::PublicRead,
                defer: true,
                generate: true,
                keep_original: true,
            },
        }
    }

    /// Start from `base` and override only what the builder names.
    pub fn derive(name: impl Into<String>, base: &AssetKindConfig) -> AssetKindBuilder {
        let mut config = base.clone();
        config.name = name.into();
        AssetKindBuilder { config }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn process_queue(&self) -> &str {
        &self.process_queue
    }

    pub fn upload_queue(&self) -> &str {
        &self.upload_queue
    }

    pub fn format(&self) -> AssetFormat {
        self.format
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn versions(&self) -> impl Iterator<Item = &VersionSpec> {
        self.versions.values()
    }

    pub fn version(&self, name: &str) -> Option<&VersionSpec> {
        self.versions.get(name)
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn acl(&self) -> Acl {
        self.acl
    }

    pub fn defers(&self) -> bool {
        self.defer
    }

    pub fn generates(&self) -> bool {
        self.generate
    }

    pub fn keeps_original(&self) -> bool {
        self.keep_original
    }
}

pub struct AssetKindBuilder {
    config: AssetKindConfig,
}

impl AssetKindBuilder {
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.bucket = bucket.into();
        self
    }

    pub fn process_queue(mut self, queue: impl Into<String>) -> Self {
        self.config.process_queue = queue.into();
        self
    }

    pub fn upload_queue(mut self, queue: impl Into<String>) -> Self {
        self.config.upload_queue = queue.into();
        self
    }

    pub fn format(mut self, format: AssetFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = dir.into().clean();
        self
    }

    pub fn acl(mut self, acl: Acl) -> Self {
        self.config.acl = acl;
        self
    }

    /// Append a transform to the kind's pipeline.
    pub fn process(mut self, processor: Processor) -> Self {
        self.config.pipeline.push(processor);
        self
    }

    pub fn version(mut self, version: VersionSpec) -> Self {
        self.config.versions.insert(version.name.clone(), version);
        self
    }

    pub fn defer(mut self, defer: bool) -> Self {
        self.config.defer = defer;
        self
    }

    pub fn generate(mut self, generate: bool) -> Self {
        self.config.generate = generate;
        self
    }

    pub fn keep_original(mut self, keep: bool) -> Self {
        self.config.keep_original = keep;
        self
    }

    pub fn build(self) -> AssetResult<AssetKindConfig> {
        let config = self.config;
        if config.name.trim().is_empty() {
            return Err(AssetError::validation("kind name must not be empty"));
        }
        if config.bucket.is_empty() {
            return Err(AssetError::validation(format!(
                "kind {} has an empty bucket",
                config.name
            )));
        }
        for version in config.versions.values() {
            if version.name == ORIGINAL_NAME || version.name.is_empty() {
                return Err(AssetError::validation(format!(
                    "kind {} cannot declare a version named {:?}",
                    config.name, version.name
                )));
            }
            if version.width == Some(0) || version.height == Some(0) {
                return Err(AssetError::validation(format!(
                    "version {} of kind {} has a zero dimension",
                    version.name, config.name
                )));
            }
        }
        Ok(config)
    }
}

/// All kinds known to the process, registered once at startup.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: HashMap<String, Arc<AssetKindConfig>>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, config: AssetKindConfig) -> AssetResult<()> {
        if self.kinds.contains_key(config.name()) {
            return Err(AssetError::validation(format!(
                "kind {} is already registered",
                config.name()
            )));
        }
        self.kinds.insert(config.name().to_string(), Arc::new(config));
        Ok(())
    }

    pub fn with(mut self, config: AssetKindConfig) -> AssetResult<Self> {
        self.register(config)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> AssetResult<Arc<AssetKindConfig>> {
        self.kinds
            .get(name)
            .cloned()
            .ok_or_else(|| AssetError::validation(format!("unknown asset kind {:?}", name)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AssetKindConfig>> {
        self.kinds.values()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
