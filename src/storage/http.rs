use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use std::time::Duration;

use super::{Acl, ObjectStore};
use crate::models::asset::AssetFormat;

/// S3-compatible gateway reached over plain HTTP: objects live at
/// `<endpoint>/<bucket>/<key>`. Request signing is left to the gateway
/// (pre-authorised endpoints, bucket policies).
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client for object store")?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, key)
    }
}

impl ObjectStore for HttpObjectStore {
    fn put(&self, bucket: &str, key: &str, body: &[u8], acl: Acl) -> Result<()> {
        let url = self.object_url(bucket, key);
        let mut request = self
            .client
            .put(&url)
            .header("x-amz-acl", acl.as_str())
            .body(body.to_vec());
        if let Some(format) = AssetFormat::guess(body) {
            request = request.header("content-type", format.content_type());
        }
        request
            .send()
            .context(format!("PUT {} failed", url))?
            .error_for_status()
            .context(format!("PUT {} was rejected", url))?;
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let url = self.object_url(bucket, key);
        let response = self
            .client
            .get(&url)
            .send()
            .context(format!("GET {} failed", url))?
            .error_for_status()
            .context(format!("GET {} was rejected", url))?;
        let bytes = response
            .bytes()
            .context(format!("failed to read body of {}", url))?;
        Ok(bytes.to_vec())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let url = self.object_url(bucket, key);
        let response = self
            .client
            .delete(&url)
            .send()
            .context(format!("DELETE {} failed", url))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        response
            .error_for_status()
            .context(format!("DELETE {} was rejected", url))?;
        Ok(())
    }

    fn url(&self, bucket: &str, key: &str) -> String {
        self.object_url(bucket, key)
    }
}
