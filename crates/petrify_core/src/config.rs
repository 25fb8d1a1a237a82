use std::fmt;

use serde::{Deserialize, Serialize};

/// Storage host under which each account gets its own endpoint.
pub const DEFAULT_STORAGE_DOMAIN: &str = "r2.cloudflarestorage.com";

/// Object storage credentials. Every field is required for a deploy.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub account_id: String,
    pub bucket: String,
}

impl DeploymentCredentials {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("access_key_id", &self.access_key_id),
            ("secret_access_key", &self.secret_access_key),
            ("account_id", &self.account_id),
            ("bucket", &self.bucket),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// `https://{account_id}.{domain}`
    pub fn endpoint(&self, storage_domain: &str) -> String {
        format!("https://{}.{}", self.account_id, storage_domain)
    }
}

impl fmt::Debug for DeploymentCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &redacted(&self.secret_access_key))
            .field("account_id", &self.account_id)
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// Edge worker connection settings.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeSettings {
    pub worker_url: String,
    pub api_token: String,
}

impl fmt::Debug for EdgeSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeSettings")
            .field("worker_url", &self.worker_url)
            .field("api_token", &redacted(&self.api_token))
            .finish()
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}
