use anyhow::{Context, Error, Result, bail};
use log::{debug, warn};
use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
    thread::sleep,
    time::Duration,
};

use crate::common::{MAX_DELETE_ATTEMPTS, MAX_OPEN_ATTEMPTS, OPEN_RETRY_DELAY_MS};
use crate::models::asset::AssetId;
use crate::models::input::AssetInput;
use crate::utils::staged_path;

/// Host-local holding area for bytes between `moved` and `uploaded`.
#[derive(Debug, Clone)]
pub struct Staging {
    dir: PathBuf,
}

impl Staging {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, id: &AssetId) -> PathBuf {
        staged_path(&self.dir, id)
    }

    pub fn exists(&self, id: &AssetId) -> bool {
        self.path(id).is_file()
    }

    pub fn write(&self, id: &AssetId, input: AssetInput) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .context(format!("failed to create staging directory {:?}", self.dir))?;
        let path = self.path(id);
        match input {
            AssetInput::Bytes(bytes) => {
                fs::write(&path, bytes).context(format!("failed to stage bytes at {:?}", path))?
            }
            AssetInput::Path(source) => {
                fs::copy(&source, &path)
                    .context(format!("failed to copy {:?} into staging", source))?;
            }
            AssetInput::Reader(mut reader) => {
                let mut file =
                    File::create(&path).context(format!("failed to create {:?}", path))?;
                io::copy(&mut reader, &mut file)
                    .context(format!("failed to stream input into {:?}", path))?;
            }
            AssetInput::Image(_) => bail!("decoded images are never staged"),
        }
        debug!("Staged {} at {:?}", id, path);
        Ok(path)
    }

    pub fn read(&self, id: &AssetId) -> Result<Vec<u8>> {
        let path = self.path(id);
        let mut file = open_file_with_retry(&path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .context(format!("failed to read staged file {:?}", path))?;
        Ok(bytes)
    }

    /// Remove the staged file. Already gone counts as success.
    pub fn delete(&self, id: &AssetId) -> Result<()> {
        delete_with_retry(self.path(id))
    }
}

pub fn open_file_with_retry<P: AsRef<Path> + std::fmt::Debug>(path: P) -> Result<File> {
    let mut delay = Duration::from_millis(OPEN_RETRY_DELAY_MS);

    for attempt in 0..=MAX_OPEN_ATTEMPTS {
        match File::open(&path) {
            Ok(file) => return Ok(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::new(e).context(format!("staged file {:?} does not exist", path)));
            }
            Err(e) if attempt < MAX_OPEN_ATTEMPTS => {
                warn!(
                    "Attempt {}/{} failed to open {:?}: {}. Retrying in {:?}…",
                    attempt + 1,
                    MAX_OPEN_ATTEMPTS + 1,
                    path,
                    e,
                    delay,
                );
                sleep(delay);
                delay = delay.checked_mul(2).unwrap_or(delay);
            }
            Err(e) => {
                return Err(Error::new(e).context(format!(
                    "Failed to open file {:?} after {} attempts",
                    path,
                    MAX_OPEN_ATTEMPTS + 1
                )));
            }
        }
    }

    unreachable!("open_file_with_retry logic error")
}

fn delete_with_retry<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let mut attempts = 0;
    loop {
        attempts += 1;
        match fs::remove_file(path) {
            Ok(_) => {
                debug!("Deleted staged file: {:?}", path);
                return Ok(());
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) if attempts < MAX_DELETE_ATTEMPTS => {
                warn!(
                    "Failed deleting {:?} (attempt {}), retrying in {}ms: {}",
                    path,
                    attempts,
                    100 * attempts,
                    err
                );
                sleep(Duration::from_millis(100 * attempts));
            }
            Err(err) => {
                return Err(err).context(format!(
                    "Failed deleting {:?} after {} attempts",
                    path, attempts
                ));
            }
        }
    }
}
