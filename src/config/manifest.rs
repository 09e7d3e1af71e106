use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::kinds::{AssetKindConfig, KindRegistry, VersionSpec};
use crate::models::asset::AssetFormat;
use crate::storage::Acl;

/// On-disk description of the asset kinds a process serves.
///
/// ```json
/// { "kinds": [
///     { "name": "photo", "bucket": "media", "format": "jpg",
///       "versions": [{ "name": "thumb", "width": 100, "height": 100 }] },
///     { "name": "avatar", "extends": "photo", "defer": false }
/// ] }
/// ```
///
/// Custom processors cannot be expressed here; register them through
/// [`AssetKindConfig::builder`].
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub kinds: Vec<KindEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KindEntry {
    pub name: String,
    /// An earlier entry whose settings this kind starts from.
    pub extends: Option<String>,
    pub bucket: Option<String>,
    pub process_queue: Option<String>,
    pub upload_queue: Option<String>,
    pub format: Option<AssetFormat>,
    pub acl: Option<Acl>,
    pub staging_dir: Option<PathBuf>,
    pub defer: Option<bool>,
    pub generate: Option<bool>,
    pub keep_original: Option<bool>,
    #[serde(default)]
    pub versions: Vec<VersionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VersionEntry {
    pub name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<AssetFormat>,
}

pub fn load_manifest(path: &Path, default_staging: &Path) -> Result<KindRegistry> {
    let json = fs::read_to_string(path).context(format!("failed to read manifest {:?}", path))?;
    parse_manifest(&json, default_staging).context(format!("invalid manifest {:?}", path))
}

pub fn parse_manifest(json: &str, default_staging: &Path) -> Result<KindRegistry> {
    let manifest: Manifest = serde_json::from_str(json).context("failed to parse kind manifest")?;
    let mut built: HashMap<String, AssetKindConfig> = HashMap::new();
    let mut registry = KindRegistry::new();

    for entry in manifest.kinds {
        let mut builder = match &entry.extends {
            Some(base) => {
                let base = built.get(base).ok_or_else(|| {
                    anyhow!("kind {} extends {}, which is not declared before it", entry.name, base)
                })?;
                AssetKindConfig::derive(entry.name.clone(), base)
            }
            None => AssetKindConfig::builder(entry.name.clone()).staging_dir(default_staging),
        };

        if let Some(bucket) = entry.bucket {
            builder = builder.bucket(bucket);
        }
        if let Some(queue) = entry.process_queue {
            builder = builder.process_queue(queue);
        }
        if let Some(queue) = entry.upload_queue {
            builder = builder.upload_queue(queue);
        }
        if let Some(format) = entry.format {
            builder = builder.format(format);
        }
        if let Some(acl) = entry.acl {
            builder = builder.acl(acl);
        }
        if let Some(dir) = entry.staging_dir {
            builder = builder.staging_dir(dir);
        }
        if let Some(defer) = entry.defer {
            builder = builder.defer(defer);
        }
        if let Some(generate) = entry.generate {
            builder = builder.generate(generate);
        }
        if let Some(keep) = entry.keep_original {
            builder = builder.keep_original(keep);
        }
        for version in entry.versions {
            let mut rendition = VersionSpec::new(version.name);
            rendition.width = version.width;
            rendition.height = version.height;
            rendition.format = version.format;
            builder = builder.version(rendition);
        }

        let config = builder.build()?;
        registry.register(config.clone())?;
        built.insert(config.name().to_string(), config);
    }
    Ok(registry)
}
