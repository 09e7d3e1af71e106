use anyhow::{Result, anyhow, bail};
use dashmap::DashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Acl, ObjectStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Put { bucket: String, key: String, acl: Acl },
    Get { bucket: String, key: String },
    Delete { bucket: String, key: String },
}

/// Object store kept in process memory. Records every call so callers can
/// assert on side effects.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<(String, String), Vec<u8>>,
    calls: Mutex<Vec<StoreCall>>,
    failing: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails as if the remote were unreachable.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|entry| entry.value().clone())
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == bucket)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn record(&self, call: StoreCall) -> Result<()> {
        self.calls
            .lock()
            .map_err(|_| anyhow!("store call log poisoned"))?
            .push(call);
        if self.failing.load(Ordering::SeqCst) {
            bail!("object store unavailable");
        }
        Ok(())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(&self, bucket: &str, key: &str, body: &[u8], acl: Acl) -> Result<()> {
        self.record(StoreCall::Put {
            bucket: bucket.to_string(),
            key: key.to_string(),
            acl,
        })?;
        self.objects
            .insert((bucket.to_string(), key.to_string()), body.to_vec());
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.record(StoreCall::Get {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;
        self.object(bucket, key)
            .ok_or_else(|| anyhow!("no object at {}/{}", bucket, key))
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.record(StoreCall::Delete {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })?;
        self.objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    fn url(&self, bucket: &str, key: &str) -> String {
        format!("memory://{}/{}", bucket, key)
    }
}
