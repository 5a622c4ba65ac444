//! MindVault core: the per-tenant ingestion-and-storage engine described
//! in the component design — vault lifecycle, content extractors, the
//! ingestion pipeline, relationship inference, the query facade, and the
//! vault exporter. The chat front-end, HTTP router/auth, mini-app UI,
//! configuration loading, logging initialization, and the concrete
//! provider wire formats are host concerns and live outside this crate.

mod clients;
mod config;
mod error;
mod exporter;
mod extract;
mod lang;
mod manager;
mod model;
mod pipeline;
mod query;
mod relationships;
mod schema;
mod vault;

pub use crate::clients::{
    ClientError, FindRelationshipsRequest, ItemContext, Llm, LlmRelationship, Readability,
    ReadabilityResult, RelatedTopic, SearchResponse, SummarizeRequest, SummarizeResponse,
    SummarizeSearchRequest, WebSearch,
};
pub use crate::config::VaultManagerConfig;
pub use crate::error::{Error, Result};
pub use crate::extract::hashtag::extract_hashtags;
pub use crate::extract::title::{explicit_title, truncated_fallback};
pub use crate::extract::topic::is_short_topic;
pub use crate::extract::wikilink::{canonical_target, extract_wikilinks};
pub use crate::lang::{parse_lang, Language};
pub use crate::manager::VaultManager;
pub use crate::model::{
    normalize_tags, Answer, AnswerSource, ByTypeCounts, GraphSnapshot, Item, ItemType, RawContent,
    RawContentType, Relationship, SearchResult, VaultStats,
};
pub use crate::pipeline::Pipeline;
pub use crate::query::QueryFacade;
pub use crate::vault::{escape_fts5_query, Vault};
