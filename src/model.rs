use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Link,
    Note,
    Image,
    Topic,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Link => "link",
            ItemType::Note => "note",
            ItemType::Image => "image",
            ItemType::Topic => "topic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "link" => Some(ItemType::Link),
            "note" => Some(ItemType::Note),
            "image" => Some(ItemType::Image),
            "topic" => Some(ItemType::Topic),
            _ => None,
        }
    }
}

/// A single vault entry. `id` is a UUID string, unique within the owning
/// vault. `tags` is always normalized (lowercase, trimmed, non-empty,
/// deduplicated) before it reaches storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub item_type: ItemType,
    pub url: Option<String>,
    pub title: String,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub raw_content: Option<String>,
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: BTreeSet<String>,
}

impl Item {
    /// A freshly-assembled item ready for `Vault::create_item`: empty id
    /// (assigned on insert) and timestamps (stamped on insert).
    pub fn draft(item_type: ItemType, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            item_type,
            url: None,
            title: title.into(),
            content: None,
            summary: None,
            raw_content: None,
            image_path: None,
            created_at: now,
            updated_at: now,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_raw_content(mut self, raw: impl Into<String>) -> Self {
        self.raw_content = Some(raw.into());
        self
    }

    pub fn with_image_path(mut self, path: impl Into<String>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags = normalize_tags(tags);
        self
    }
}

/// Lowercase, trim, drop-empty, dedupe — the tag normalization contract
/// that applies uniformly wherever tags enter the system.
pub fn normalize_tags(tags: impl IntoIterator<Item = String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub source_id: String,
    pub target_id: String,
    pub relation_type: String,
    pub strength: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub item: Item,
    pub snippet: String,
    /// BM25 score; smaller is better (matches FTS5 bm25() ordering).
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultStats {
    pub items: usize,
    pub tags: usize,
    pub by_type: ByTypeCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ByTypeCounts {
    pub link: usize,
    pub note: usize,
    pub image: usize,
    pub topic: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub items: Vec<Item>,
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<AnswerSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSource {
    pub item_id: String,
    pub title: String,
    pub snippet: String,
}

/// Raw submission handed to the ingestion pipeline, one per external input.
#[derive(Debug, Clone, Default)]
pub struct RawContent {
    pub owner_id: u64,
    pub content_type: RawContentType,
    pub url: Option<String>,
    pub text: Option<String>,
    pub image_bytes: Option<Vec<u8>>,
    pub image_ext: Option<String>,
    pub caption: Option<String>,
    pub language_hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RawContentType {
    #[default]
    Link,
    Note,
    Image,
    Topic,
}

impl RawContentType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "link" => Some(RawContentType::Link),
            "note" => Some(RawContentType::Note),
            "image" => Some(RawContentType::Image),
            "topic" => Some(RawContentType::Topic),
            _ => None,
        }
    }
}
