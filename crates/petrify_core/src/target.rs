use std::fmt;

use serde::{Deserialize, Serialize};

/// Filename written for the site root.
pub const HOME_FILENAME: &str = "index.html";

const MAX_STEM_LEN: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Page,
    Post,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Page => f.write_str("page"),
            ContentKind::Post => f.write_str("post"),
        }
    }
}

/// A published page or post as enumerated by a content source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: u64,
    #[serde(default)]
    pub slug: String,
    pub url: String,
    pub kind: ContentKind,
}

/// A URL to fetch and the staging filename its body is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTarget {
    pub url: String,
    pub filename: String,
}

impl ExportTarget {
    pub fn home(site_url: &str) -> Self {
        Self {
            url: site_url.to_string(),
            filename: HOME_FILENAME.to_string(),
        }
    }

    /// `<slug>.html`, or `<id>.html` when the slug is empty.
    pub fn for_item(item: &ContentItem) -> Self {
        let stem = if item.slug.trim().is_empty() {
            item.id.to_string()
        } else {
            item.slug.clone()
        };
        Self {
            url: item.url.clone(),
            filename: format!("{}.html", sanitize_filename(&stem)),
        }
    }
}

/// Confine `input` to `[A-Za-z0-9_.-]`, a single path segment.
///
/// Any other character becomes `_` and runs of dots collapse so no `..`
/// survives. Leading dots are dropped so the result is never hidden, and
/// trailing dots so appending an extension never yields `..`.
pub fn sanitize_filename(input: &str) -> String {
    let mut cleaned = String::with_capacity(input.len());
    let mut prev_dot = false;
    for c in input.chars() {
        let mapped = if is_safe(c) { c } else { '_' };
        if mapped == '.' {
            if prev_dot {
                continue;
            }
            prev_dot = true;
        } else {
            prev_dot = false;
        }
        cleaned.push(mapped);
    }

    let mut cleaned = cleaned.trim_start_matches('.').to_string();
    // Only ASCII survives the mapping, so any byte index is a char boundary.
    cleaned.truncate(MAX_STEM_LEN);
    let cleaned = cleaned.trim_end_matches('.');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_' || c == '.') {
        return "untitled".to_string();
    }
    cleaned.to_string()
}

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}
