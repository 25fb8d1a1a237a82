//! Client for the edge worker's DNS endpoints.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use petrify_core::{DnsRecord, EdgeSettings, LogSink};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::Value;
use thiserror::Error;

const EDGE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeErrorKind {
    /// Worker URL missing or malformed; no request was sent.
    Config,
    /// Request rejected locally before sending.
    InvalidInput,
    Transport,
    /// Response status outside `200..300`.
    Status(u16),
    Decode,
}

impl fmt::Display for EdgeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeErrorKind::Config => write!(f, "configuration error"),
            EdgeErrorKind::InvalidInput => write!(f, "invalid input"),
            EdgeErrorKind::Transport => write!(f, "transport error"),
            EdgeErrorKind::Status(code) => write!(f, "worker returned status {code}"),
            EdgeErrorKind::Decode => write!(f, "undecodable response"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct EdgeError {
    pub kind: EdgeErrorKind,
    pub message: String,
    /// Response body, JSON-decoded when possible.
    pub raw_body: Option<Value>,
}

impl EdgeError {
    fn new(kind: EdgeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw_body: None,
        }
    }
}

/// One authenticated round trip per call, no retries.
pub struct EdgeClient {
    settings: EdgeSettings,
    client: reqwest::Client,
    log: Arc<dyn LogSink>,
}

impl EdgeClient {
    pub fn new(settings: EdgeSettings, log: Arc<dyn LogSink>) -> Result<Self, EdgeError> {
        let client = reqwest::Client::builder()
            .timeout(EDGE_TIMEOUT)
            .build()
            .map_err(|err| EdgeError::new(EdgeErrorKind::Transport, err.to_string()))?;
        Ok(Self {
            settings,
            client,
            log,
        })
    }

    /// `GET {base}/dns/list`
    pub async fn list(&self) -> Result<Vec<Value>, EdgeError> {
        let result = self
            .request(Method::GET, &["dns", "list"], None)
            .await
            .and_then(extract_records);
        self.report("list DNS records", result)
    }

    /// `POST {base}/dns/add`
    pub async fn add(&self, record: &DnsRecord) -> Result<Value, EdgeError> {
        let missing = record.missing_fields();
        let result = if missing.is_empty() {
            self.request(Method::POST, &["dns", "add"], Some(record)).await
        } else {
            Err(EdgeError::new(
                EdgeErrorKind::InvalidInput,
                format!("record {} required", missing.join(", ")),
            ))
        };
        self.report("add DNS record", result)
    }

    /// `DELETE {base}/dns/delete/{id}`
    pub async fn delete(&self, id: &str) -> Result<Value, EdgeError> {
        let result = if id.trim().is_empty() {
            Err(EdgeError::new(EdgeErrorKind::InvalidInput, "record id required"))
        } else {
            self.request(Method::DELETE, &["dns", "delete", id.trim()], None)
                .await
        };
        self.report("delete DNS record", result)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<url::Url, EdgeError> {
        let base = self.settings.worker_url.trim();
        if base.is_empty() {
            return Err(EdgeError::new(
                EdgeErrorKind::Config,
                "Worker URL not configured",
            ));
        }
        let mut url = url::Url::parse(base)
            .map_err(|err| EdgeError::new(EdgeErrorKind::Config, format!("invalid worker URL: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| EdgeError::new(EdgeErrorKind::Config, "worker URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&DnsRecord>,
    ) -> Result<Value, EdgeError> {
        let url = self.endpoint(segments)?;

        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.settings.api_token)
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| EdgeError::new(EdgeErrorKind::Transport, err.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|err| EdgeError::new(EdgeErrorKind::Transport, err.to_string()))?;
        let decoded = decode_body(&text);

        if (200..300).contains(&status) {
            return match decoded {
                Some(value) => Ok(value),
                None if text.trim().is_empty() => Ok(Value::Null),
                None => Err(EdgeError {
                    kind: EdgeErrorKind::Decode,
                    message: "response body is not JSON".to_string(),
                    raw_body: Some(Value::String(text)),
                }),
            };
        }

        let raw_body = decoded.or_else(|| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| Value::String(trimmed.to_string()))
        });
        Err(EdgeError {
            kind: EdgeErrorKind::Status(status),
            message: "Worker returned error".to_string(),
            raw_body,
        })
    }

    fn report<T>(&self, action: &str, result: Result<T, EdgeError>) -> Result<T, EdgeError> {
        if let Err(err) = &result {
            match &err.raw_body {
                Some(body) => self
                    .log
                    .error(&format!("Failed to {action}: {err} ({body})")),
                None => self.log.error(&format!("Failed to {action}: {err}")),
            }
        }
        result
    }
}

fn decode_body(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

/// Accept a bare array or an object wrapping it as `records` or `result`.
fn extract_records(value: Value) -> Result<Vec<Value>, EdgeError> {
    match value {
        Value::Array(records) => Ok(records),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut map) => {
            for key in ["records", "result"] {
                if let Some(Value::Array(records)) = map.remove(key) {
                    return Ok(records);
                }
            }
            Err(EdgeError {
                kind: EdgeErrorKind::Decode,
                message: "response does not contain a record list".to_string(),
                raw_body: Some(Value::Object(map)),
            })
        }
        other => Err(EdgeError {
            kind: EdgeErrorKind::Decode,
            message: "response does not contain a record list".to_string(),
            raw_body: Some(other),
        }),
    }
}
