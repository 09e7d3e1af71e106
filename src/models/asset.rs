use anyhow::{Result, anyhow};
use arrayvec::ArrayString;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::utils::tableize;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bitcode::Decode,
    bitcode::Encode,
)]
#[serde(transparent)]
pub struct AssetId(ArrayString<64>);

impl AssetId {
    /// Fresh id for a root asset.
    pub fn generate() -> Self {
        let mut id = ArrayString::new();
        id.push_str(&Uuid::new_v4().simple().to_string());
        AssetId(id)
    }

    /// Id of the derivative `name` of `parent`. Stable across regeneration.
    pub fn derived(parent: &AssetId, name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(parent.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(name.as_bytes());
        AssetId(hasher.finalize().to_hex())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl AsRef<str> for AssetId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for AssetId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(anyhow!("asset id must not be empty"));
        }
        ArrayString::from(s)
            .map(AssetId)
            .map_err(|_| anyhow!("asset id too long: {} bytes", s.len()))
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bitcode::Decode,
    bitcode::Encode,
)]
#[serde(rename_all = "lowercase")]
pub enum AssetState {
    Received,
    Moved,
    Uploaded,
    Processed,
}

impl fmt::Display for AssetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetState::Received => write!(f, "received"),
            AssetState::Moved => write!(f, "moved"),
            AssetState::Uploaded => write!(f, "uploaded"),
            AssetState::Processed => write!(f, "processed"),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bitcode::Decode,
    bitcode::Encode,
)]
#[serde(rename_all = "lowercase")]
pub enum AssetFormat {
    Png,
    #[serde(alias = "jpeg")]
    Jpg,
    Gif,
    Webp,
    Bmp,
}

impl AssetFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AssetFormat::Png => "png",
            AssetFormat::Jpg => "jpg",
            AssetFormat::Gif => "gif",
            AssetFormat::Webp => "webp",
            AssetFormat::Bmp => "bmp",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            AssetFormat::Png => ImageFormat::Png,
            AssetFormat::Jpg => ImageFormat::Jpeg,
            AssetFormat::Gif => ImageFormat::Gif,
            AssetFormat::Webp => ImageFormat::WebP,
            AssetFormat::Bmp => ImageFormat::Bmp,
        }
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(AssetFormat::Png),
            ImageFormat::Jpeg => Some(AssetFormat::Jpg),
            ImageFormat::Gif => Some(AssetFormat::Gif),
            ImageFormat::WebP => Some(AssetFormat::Webp),
            ImageFormat::Bmp => Some(AssetFormat::Bmp),
            _ => None,
        }
    }

    /// Sniff the container format of already-encoded bytes.
    pub fn guess(bytes: &[u8]) -> Option<Self> {
        image::guess_format(bytes)
            .ok()
            .and_then(Self::from_image_format)
    }

    pub fn content_type(&self) -> &'static str {
        self.image_format().to_mime_type()
    }
}

impl FromStr for AssetFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(AssetFormat::Png),
            "jpg" | "jpeg" => Ok(AssetFormat::Jpg),
            "gif" => Ok(AssetFormat::Gif),
            "webp" => Ok(AssetFormat::Webp),
            "bmp" => Ok(AssetFormat::Bmp),
            other => Err(anyhow!("unsupported image format: {}", other)),
        }
    }
}

/// Opaque pointer to whatever record owns an asset.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, bitcode::Decode, bitcode::Encode,
)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRef {
    pub owner_type: String,
    pub owner_id: String,
}

impl OwnerRef {
    pub fn new(owner_type: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id: owner_id.into(),
        }
    }

    /// Resolve the owner through a caller-supplied lookup.
    pub fn resolve<T>(&self, lookup: impl FnOnce(&str, &str) -> Option<T>) -> Option<T> {
        lookup(&self.owner_type, &self.owner_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bitcode::Decode, bitcode::Encode)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    pub kind: String,
    pub name: Option<String>,
    pub format: Option<AssetFormat>,
    pub state: AssetState,
    pub width: u32,
    pub height: u32,
    pub owner: Option<OwnerRef>,
    pub parent: Option<AssetId>,
    pub derivatives: BTreeMap<String, AssetId>,
    pub created_at: i64,
}

impl Asset {
    pub fn new(kind: impl Into<String>) -> Self {
        Self::with_id(AssetId::generate(), kind)
    }

    pub fn with_id(id: AssetId, kind: impl Into<String>) -> Self {
        Self {
            id,
            kind: kind.into(),
            name: None,
            format: None,
            state: AssetState::Received,
            width: 0,
            height: 0,
            owner: None,
            parent: None,
            derivatives: BTreeMap::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Fresh child record for the derivative slot `name` of `parent`.
    pub fn derivative_of(parent: &Asset, name: &str, format: Option<AssetFormat>) -> Self {
        let mut child = Self::with_id(AssetId::derived(&parent.id, name), parent.kind.clone())
            .named(name)
            .owned_by(OwnerRef::new(parent.kind.clone(), parent.id.to_string()));
        child.format = format;
        child.parent = Some(parent.id);
        child
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn owned_by(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn formatted(mut self, format: AssetFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn is_derivative(&self) -> bool {
        self.parent.is_some()
    }

    pub fn format_or(&self, default: AssetFormat) -> AssetFormat {
        self.format.unwrap_or(default)
    }

    /// Object key under the kind's bucket.
    ///
    /// Root assets live at `<kinds>/<id>.<ext>`; derivatives at
    /// `<owner kinds>/<owner id>/<name>.<ext>` so a regenerated version lands
    /// on the same object.
    pub fn remote_key(&self, default_format: AssetFormat) -> String {
        let ext = self.format_or(default_format).extension();
        match (&self.parent, &self.owner, &self.name) {
            (Some(_), Some(owner), Some(name)) => format!(
                "{}/{}/{}.{}",
                tableize(&owner.owner_type),
                owner.owner_id,
                name,
                ext
            ),
            _ => format!("{}/{}.{}", tableize(&self.kind), self.id, ext),
        }
    }

    pub fn size(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_ids_are_stable_and_distinct() {
        let parent = AssetId::generate();
        assert_eq!(
            AssetId::derived(&parent, "thumb"),
            AssetId::derived(&parent, "thumb")
        );
        assert_ne!(
            AssetId::derived(&parent, "thumb"),
            AssetId::derived(&parent, "original")
        );
    }

    #[test]
    fn root_key_uses_pluralized_kind() {
        let asset = Asset::new("UserAvatar");
        assert_eq!(
            asset.remote_key(AssetFormat::Png),
            format!("user_avatars/{}.png", asset.id)
        );
    }

    #[test]
    fn derivative_key_is_scoped_under_owner() {
        let parent = Asset::new("photo").formatted(AssetFormat::Jpg);
        let child = Asset::derivative_of(&parent, "thumb", None);
        assert_eq!(
            child.remote_key(AssetFormat::Png),
            format!("photos/{}/thumb.png", parent.id)
        );
        assert_ne!(
            child.remote_key(AssetFormat::Png),
            parent.remote_key(AssetFormat::Png)
        );
    }

    #[test]
    fn derivative_is_owned_by_its_parent() {
        let parent = Asset::new("photo");
        let child = Asset::derivative_of(&parent, "thumb", Some(AssetFormat::Webp));
        assert_eq!(child.name.as_deref(), Some("thumb"));
        assert_eq!(child.parent, Some(parent.id));
        assert_eq!(
            child.owner,
            Some(OwnerRef::new("photo", parent.id.to_string()))
        );
        assert_eq!(child.state, AssetState::Received);
    }

    #[test]
    fn owner_resolves_through_lookup() {
        let owner = OwnerRef::new("user", "42");
        let found = owner.resolve(|kind, id| {
            if kind == "user" {
                id.parse::<u32>().ok()
            } else {
                None
            }
        });
        assert_eq!(found, Some(42));
    }

    #[test]
    fn format_parses_aliases() {
        assert_eq!("JPEG".parse::<AssetFormat>().unwrap(), AssetFormat::Jpg);
        assert!("tiff".parse::<AssetFormat>().is_err());
    }
}
