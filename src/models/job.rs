use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::asset::AssetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Upload,
    Process,
}

/// Body of a queued job. Upload jobs also carry the host that staged the
/// bytes, since staged files never leave that host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub id: AssetId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl JobPayload {
    pub fn process(id: AssetId) -> Self {
        Self { id, hostname: None }
    }

    pub fn upload(id: AssetId, hostname: impl Into<String>) -> Self {
        Self {
            id,
            hostname: Some(hostname.into()),
        }
    }

    pub fn to_body(&self) -> Result<String> {
        serde_json::to_string(self).context("failed to encode job payload")
    }

    pub fn from_body(body: &str) -> Result<Self> {
        serde_json::from_str(body).context(format!("malformed job payload: {:?}", body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_payload_has_only_id() {
        let id: AssetId = "abc".parse().unwrap();
        assert_eq!(JobPayload::process(id).to_body().unwrap(), r#"{"id":"abc"}"#);
    }

    #[test]
    fn upload_payload_carries_hostname() {
        let id: AssetId = "abc".parse().unwrap();
        let body = JobPayload::upload(id, "web-1").to_body().unwrap();
        assert_eq!(body, r#"{"id":"abc","hostname":"web-1"}"#);
        assert_eq!(
            JobPayload::from_body(&body).unwrap().hostname.as_deref(),
            Some("web-1")
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(JobPayload::from_body("not json").is_err());
    }
}
