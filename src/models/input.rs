use image::DynamicImage;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;

/// Source handed to an asset at creation.
pub enum AssetInput {
    Bytes(Vec<u8>),
    /// Copied into staging; the source file is left in place.
    Path(PathBuf),
    Reader(Box<dyn Read + Send>),
    /// Already decoded. Skips staging entirely.
    Image(DynamicImage),
}

impl AssetInput {
    pub fn is_image(&self) -> bool {
        matches!(self, AssetInput::Image(_))
    }
}

impl fmt::Debug for AssetInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetInput::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            AssetInput::Path(path) => write!(f, "Path({:?})", path),
            AssetInput::Reader(_) => write!(f, "Reader(..)"),
            AssetInput::Image(image) => write!(f, "Image({}x{})", image.width(), image.height()),
        }
    }
}

impl From<Vec<u8>> for AssetInput {
    fn from(bytes: Vec<u8>) -> Self {
        AssetInput::Bytes(bytes)
    }
}

impl From<PathBuf> for AssetInput {
    fn from(path: PathBuf) -> Self {
        AssetInput::Path(path)
    }
}

impl From<DynamicImage> for AssetInput {
    fn from(image: DynamicImage) -> Self {
        AssetInput::Image(image)
    }
}
