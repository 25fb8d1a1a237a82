use serde::{Deserialize, Serialize};

pub const DEFAULT_TTL: u32 = 3600;

/// A DNS record as accepted by the edge worker's `dns/add` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default)]
    pub proxied: bool,
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

impl DnsRecord {
    pub fn new(
        record_type: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            record_type: record_type.into(),
            name: name.into(),
            content: content.into(),
            ttl: DEFAULT_TTL,
            proxied: false,
        }
    }

    /// Names of required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.record_type.trim().is_empty() {
            missing.push("type");
        }
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.content.trim().is_empty() {
            missing.push("content");
        }
        missing
    }
}
