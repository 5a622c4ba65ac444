//! Interfaces to the external collaborators the ingestion pipeline leans
//! on. Concrete implementations (an HTTP-backed readability extractor, a
//! search API client, an LLM provider client) are a host concern; this
//! crate only defines the contract and exercises it against test doubles.
//! Response shapes follow the documented collaborator contract verbatim.

use async_trait::async_trait;

use crate::lang::Language;

/// Fetches a URL and extracts readable article text from it. Fetch and
/// extraction are a single call: the pipeline never needs raw HTML.
#[async_trait]
pub trait Readability: Send + Sync {
    async fn extract(&self, url: &str) -> std::result::Result<ReadabilityResult, ClientError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadabilityResult {
    pub title: Option<String>,
    pub text_content: String,
    pub excerpt: Option<String>,
    pub site_name: Option<String>,
    pub favicon: Option<String>,
}

/// Looks up background material for a short topic string.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, topic: &str) -> std::result::Result<SearchResponse, ClientError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    pub heading: Option<String>,
    pub abstract_text: Option<String>,
    pub abstract_url: Option<String>,
    pub source: Option<String>,
    pub related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelatedTopic {
    pub text: String,
    pub url: Option<String>,
}

/// Text generation used for summarization, relationship discovery, and
/// question answering over retrieved items.
#[async_trait]
pub trait Llm: Send + Sync {
    async fn summarize(&self, req: SummarizeRequest) -> std::result::Result<SummarizeResponse, ClientError>;

    async fn summarize_search_results(
        &self,
        req: SummarizeSearchRequest,
    ) -> std::result::Result<SummarizeResponse, ClientError>;

    async fn find_relationships(
        &self,
        req: FindRelationshipsRequest,
    ) -> std::result::Result<Vec<LlmRelationship>, ClientError>;

    async fn answer_question(
        &self,
        question: &str,
        context: &[ItemContext],
    ) -> std::result::Result<String, ClientError>;
}

/// `summarize(contentType, text, language, existingTags)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizeRequest {
    pub content_type: &'static str,
    pub text: String,
    pub language: Language,
    pub existing_tags: Vec<String>,
}

/// `summarizeSearchResults(topic, block, language, existingTags)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SummarizeSearchRequest {
    pub topic: String,
    pub formatted_results: String,
    pub language: Language,
    pub existing_tags: Vec<String>,
}

/// `{title, summary, tags, related_topics}` — shared response shape for
/// both summarize endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummarizeResponse {
    pub title: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub related_topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FindRelationshipsRequest {
    pub title: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub candidates: Vec<ItemContext>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemContext {
    pub item_id: String,
    pub title: String,
    pub text: String,
}

/// `relation_type` is constrained to five recognized values;
/// `strength` must fall in `[0.7, 1.0]` for a suggestion to be considered
/// — the pipeline re-validates rather than trusting the client.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRelationship {
    pub target_id: String,
    pub relation_type: String,
    pub strength: f64,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ClientError(pub String);

impl ClientError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
