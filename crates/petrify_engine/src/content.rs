use std::time::Duration;

use petrify_core::{ContentItem, ContentKind};
use petrify_logging::petrify_debug;
use serde::Deserialize;
use thiserror::Error;

const REST_PAGE_SIZE: usize = 100;
const TOTAL_PAGES_HEADER: &str = "x-wp-totalpages";

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("invalid content url: {0}")]
    InvalidUrl(String),
    #[error("content listing {url} returned status {status}")]
    Http { url: String, status: u16 },
    #[error("content listing request failed: {0}")]
    Network(String),
    #[error("content listing could not be decoded: {0}")]
    Decode(String),
}

/// Enumerates every published item of a kind. There is no item limit.
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    async fn published(&self, kind: ContentKind) -> Result<Vec<ContentItem>, ContentError>;
}

/// A fixed list of items, typically from the configuration file.
#[derive(Debug, Clone, Default)]
pub struct StaticContentSource {
    items: Vec<ContentItem>,
}

impl StaticContentSource {
    pub fn new(items: Vec<ContentItem>) -> Self {
        Self { items }
    }
}

#[async_trait::async_trait]
impl ContentSource for StaticContentSource {
    async fn published(&self, kind: ContentKind) -> Result<Vec<ContentItem>, ContentError> {
        Ok(self
            .items
            .iter()
            .filter(|item| item.kind == kind)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct RestItem {
    id: u64,
    #[serde(default)]
    slug: String,
    link: String,
}

/// Pages through the site's REST collections (`/wp-json/wp/v2/pages`, `/posts`).
#[derive(Debug, Clone)]
pub struct WpRestContentSource {
    site_url: String,
    client: reqwest::Client,
}

impl WpRestContentSource {
    pub fn new(site_url: &str, timeout: Duration) -> Result<Self, ContentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ContentError::Network(err.to_string()))?;
        Ok(Self {
            site_url: site_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn collection_url(&self, kind: ContentKind, page: usize) -> Result<url::Url, ContentError> {
        let collection = match kind {
            ContentKind::Page => "pages",
            ContentKind::Post => "posts",
        };
        let raw = format!("{}/wp-json/wp/v2/{}", self.site_url, collection);
        let mut url = url::Url::parse(&raw).map_err(|err| ContentError::InvalidUrl(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("status", "publish")
            .append_pair("per_page", &REST_PAGE_SIZE.to_string())
            .append_pair("page", &page.to_string());
        Ok(url)
    }
}

#[async_trait::async_trait]
impl ContentSource for WpRestContentSource {
    async fn published(&self, kind: ContentKind) -> Result<Vec<ContentItem>, ContentError> {
        let mut items = Vec::new();
        let mut page = 1;

        loop {
            let url = self.collection_url(kind, page)?;
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|err| ContentError::Network(err.to_string()))?;

            let status = response.status();
            // Requesting past the last page is answered with 400.
            if status.as_u16() == 400 && page > 1 {
                break;
            }
            if !status.is_success() {
                return Err(ContentError::Http {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let total_pages = response
                .headers()
                .get(TOTAL_PAGES_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<usize>().ok());

            let batch: Vec<RestItem> = response
                .json()
                .await
                .map_err(|err| ContentError::Decode(err.to_string()))?;
            let batch_len = batch.len();
            petrify_debug!("{} {} page {}: {} items", self.site_url, kind, page, batch_len);

            items.extend(batch.into_iter().map(|item| ContentItem {
                id: item.id,
                slug: item.slug,
                url: item.link,
                kind,
            }));

            let last_page = total_pages.is_some_and(|total| page >= total);
            if batch_len < REST_PAGE_SIZE || last_page {
                break;
            }
            page += 1;
        }

        Ok(items)
    }
}
