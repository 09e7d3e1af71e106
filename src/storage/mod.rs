pub mod fs;
pub mod http;
pub mod memory;
pub mod staging;

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Acl {
    Private,
    #[default]
    PublicRead,
}

impl Acl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
        }
    }
}

/// Durable key-addressed artifact storage.
pub trait ObjectStore: Send + Sync {
    /// Create or overwrite `key`.
    fn put(&self, bucket: &str, key: &str, body: &[u8], acl: Acl) -> Result<()>;

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Deleting a missing key succeeds.
    fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    fn url(&self, bucket: &str, key: &str) -> String {
        format!("/{}/{}", bucket, key)
    }
}
