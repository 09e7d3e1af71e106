use anyhow::{Context, Result, bail};
use log::debug;
use path_clean::PathClean;
use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};

use super::{Acl, ObjectStore};

/// Object store laid out on a local (or mounted) directory:
/// `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into().clean();
        fs::create_dir_all(&root)
            .context(format!("failed to create object store root {:?}", root))?;
        Ok(Self { root })
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(bucket).join(key).clean();
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            bail!("object key {:?} escapes bucket {:?}", key, bucket);
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, bucket: &str, key: &str, body: &[u8], _acl: Acl) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("failed to create directory tree {:?}", parent))?;
        }
        // Write then rename so readers never observe a torn object
        let tmp = partial_path(&path);
        fs::write(&tmp, body).context(format!("failed to write {:?}", tmp))?;
        fs::rename(&tmp, &path).context(format!("failed to move {:?} into place", path))?;
        debug!("Stored {} bytes at {:?}", body.len(), path);
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        fs::read(&path).context(format!("failed to read object {:?}", path))
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context(format!("failed to delete object {:?}", path)),
        }
    }

    fn url(&self, bucket: &str, key: &str) -> String {
        format!("file://{}", self.root.join(bucket).join(key).display())
    }
}

/// `thumb.png` is written as `thumb.png.partial`, so objects that differ only
/// by extension never share a temp file.
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path()).unwrap();

        store
            .put("images", "photos/a.png", b"bytes", Acl::PublicRead)
            .unwrap();
        assert_eq!(store.get("images", "photos/a.png").unwrap(), b"bytes");

        store
            .put("images", "photos/a.png", b"new", Acl::PublicRead)
            .unwrap();
        assert_eq!(store.get("images", "photos/a.png").unwrap(), b"new");

        store.delete("images", "photos/a.png").unwrap();
        store.delete("images", "photos/a.png").unwrap();
        assert!(store.get("images", "photos/a.png").is_err());
    }

    #[test]
    fn temp_name_keeps_the_extension() {
        assert_eq!(
            partial_path(Path::new("photos/1/thumb.png")),
            Path::new("photos/1/thumb.png.partial")
        );
        assert_ne!(
            partial_path(Path::new("photos/1/thumb.png")),
            partial_path(Path::new("photos/1/thumb.jpg"))
        );
    }

    #[test]
    fn sibling_formats_both_land_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path()).unwrap();
        store
            .put("images", "photos/1/thumb.png", b"png", Acl::PublicRead)
            .unwrap();
        store
            .put("images", "photos/1/thumb.jpg", b"jpg", Acl::PublicRead)
            .unwrap();

        assert_eq!(store.get("images", "photos/1/thumb.png").unwrap(), b"png");
        assert_eq!(store.get("images", "photos/1/thumb.jpg").unwrap(), b"jpg");
        let mut names: Vec<String> = fs::read_dir(dir.path().join("images/photos/1"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["thumb.jpg", "thumb.png"]);
    }

    #[test]
    fn keys_cannot_escape_the_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path()).unwrap();
        assert!(
            store
                .put("images", "../../etc/passwd", b"x", Acl::Private)
                .is_err()
        );
    }
}
