//! Ingestion pipeline: type-dispatched stages that turn a `RawContent`
//! submission into a persisted `Item`, degrading gracefully whenever an
//! external collaborator fails.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

use crate::clients::{
    ClientError, FindRelationshipsRequest, ItemContext, Llm, LlmRelationship, Readability,
    SummarizeRequest, SummarizeResponse, SummarizeSearchRequest, WebSearch,
};
use crate::error::{Error, Result};
use crate::extract::hashtag::extract_hashtags;
use crate::extract::title::{explicit_title, truncated_fallback};
use crate::lang::{parse_lang, Language};
use crate::manager::VaultManager;
use crate::model::{Item, ItemType, RawContent, RawContentType};
use crate::relationships;

const UNCATEGORIZED: &str = "uncategorized";
const IMAGE_TAG: &str = "image";
const SEARCH_TAG: &str = "search";

pub struct Pipeline {
    manager: Arc<VaultManager>,
    readability: Arc<dyn Readability>,
    search: Arc<dyn WebSearch>,
    llm: Arc<dyn Llm>,
}

impl Pipeline {
    pub fn new(
        manager: Arc<VaultManager>,
        readability: Arc<dyn Readability>,
        search: Arc<dyn WebSearch>,
        llm: Arc<dyn Llm>,
    ) -> Self {
        Self { manager, readability, search, llm }
    }

    /// Dispatches by `raw.content_type`, enriches, persists, then runs
    /// relationship inference as a best-effort sub-stage. Returns the
    /// persisted item; enrichment failures never reach this return value
    /// as an `Err` — only persistence failures and malformed input do.
    pub async fn process(&self, raw: RawContent) -> Result<Item> {
        let vault = self.manager.get_vault(raw.owner_id).await?;
        let existing_tags =
            crate::vault::run_blocking(Arc::clone(&vault), |v| Ok(v.get_all_tags().unwrap_or_default()))
                .await?;
        let language = self.resolve_language(raw.owner_id, &vault, raw.language_hint.as_deref()).await;

        let draft = match raw.content_type {
            RawContentType::Link => {
                self.ingest_link(&raw, &existing_tags, language).await?
            }
            RawContentType::Note => self.ingest_note(&raw, &existing_tags, language).await?,
            RawContentType::Image => {
                self.ingest_image(&raw, &existing_tags, language).await?
            }
            RawContentType::Topic => self.ingest_topic(&raw, &existing_tags, language).await?,
        };

        let item =
            crate::vault::run_blocking(Arc::clone(&vault), move |v| v.create_item(draft)).await?;

        let cfg = self.manager.config().clone();
        let infer_item = item.clone();
        crate::vault::run_blocking(vault, move |v| {
            relationships::infer(v, &infer_item, &cfg);
            Ok(())
        })
        .await?;
        Ok(item)
    }

    async fn resolve_language(
        &self,
        owner_id: u64,
        vault: &Arc<crate::vault::Vault>,
        hint: Option<&str>,
    ) -> Language {
        let stored = crate::vault::run_blocking(Arc::clone(vault), |v| v.get_setting("language")).await;
        if let Ok(Some(stored)) = stored {
            let language = parse_lang(Some(&stored));
            self.manager.cache_language(owner_id, language);
            return language;
        }
        if let Some(cached) = self.manager.cached_language(owner_id) {
            return cached;
        }
        let language = parse_lang(hint);
        self.manager.cache_language(owner_id, language);
        language
    }

    async fn ingest_link(
        &self,
        raw: &RawContent,
        existing_tags: &[String],
        language: Language,
    ) -> Result<Item> {
        let url = raw.url.clone().ok_or_else(|| Error::InvalidInput("link submission requires a url".into()))?;
        let cfg = self.manager.config();

        let extracted = match run_enrichment("readability", cfg.fetch_timeout, self.readability.extract(&url)).await {
            Ok(extracted) => extracted,
            Err(err) => {
                warn!(%url, %err, "readability extraction failed, emitting degraded link item");
                return Ok(degraded_link_item(raw, &url));
            }
        };

        let excerpt_text = truncate_ellipsis(&extracted.text_content, cfg.link_excerpt_chars);
        let req = SummarizeRequest {
            content_type: "web article",
            text: excerpt_text.clone(),
            language,
            existing_tags: existing_tags.to_vec(),
        };
        let content_excerpt = extracted
            .excerpt
            .clone()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| truncate_ellipsis(&extracted.text_content, 500));

        match run_enrichment("llm summarize", cfg.llm_timeout, self.llm.summarize(req)).await {
            Ok(summary) => Ok(Item::draft(ItemType::Link, non_empty(summary.title).unwrap_or_else(|| url.clone()))
                .with_url(url)
                .with_summary(summary.summary)
                .with_content(content_excerpt)
                .with_raw_content(extracted.text_content)
                .with_tags(summary.tags)),
            Err(err) => {
                warn!(%url, %err, "llm summarize failed, falling back for link item");
                Ok(link_fallback_item(&url, extracted.title, content_excerpt, extracted.text_content))
            }
        }
    }

    async fn ingest_note(
        &self,
        raw: &RawContent,
        existing_tags: &[String],
        language: Language,
    ) -> Result<Item> {
        let text = raw.text.clone().unwrap_or_default();
        let cfg = self.manager.config();
        let title = explicit_title(&text);
        let hashtags = extract_hashtags(&text);

        let req = SummarizeRequest {
            content_type: "note",
            text: text.clone(),
            language,
            existing_tags: existing_tags.to_vec(),
        };

        let item = match run_enrichment("llm summarize", cfg.llm_timeout, self.llm.summarize(req)).await {
            Ok(summary) => {
                let resolved_title = title
                    .clone()
                    .or_else(|| non_empty(summary.title))
                    .unwrap_or_else(|| truncated_fallback(&text));
                let mut tags = summary.tags;
                tags.extend(hashtags);
                Item::draft(ItemType::Note, resolved_title)
                    .with_summary(summary.summary)
                    .with_content(text)
                    .with_tags(tags)
            }
            Err(err) => {
                warn!(%err, "llm summarize failed, falling back for note item");
                note_fallback_item(title, &text, hashtags)
            }
        };
        Ok(item)
    }

    async fn ingest_image(
        &self,
        raw: &RawContent,
        existing_tags: &[String],
        language: Language,
    ) -> Result<Item> {
        let bytes = raw
            .image_bytes
            .clone()
            .ok_or_else(|| Error::InvalidInput("image submission requires image bytes".into()))?;
        let ext = raw.image_ext.clone().unwrap_or_else(|| "bin".to_string());
        let image_id = Uuid::new_v4();
        let image_dir = self.manager.image_dir(raw.owner_id);
        let image_path = image_dir.join(format!("{image_id}.{ext}"));

        std::fs::create_dir_all(&image_dir).map_err(|e| Error::io(&image_dir, e))?;
        std::fs::write(&image_path, &bytes).map_err(|e| Error::io(&image_path, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&image_path, std::fs::Permissions::from_mode(0o644));
        }

        let relative_path = format!("images/{image_id}.{ext}");

        let item = match raw.caption.as_deref().filter(|c| !c.trim().is_empty()) {
            None => Item::draft(ItemType::Image, "Image")
                .with_image_path(relative_path)
                .with_tags([IMAGE_TAG.to_string()]),
            Some(caption) => {
                let cfg = self.manager.config();
                let hashtags = extract_hashtags(caption);
                let explicit = explicit_title(caption);
                let req = SummarizeRequest {
                    content_type: "note with image",
                    text: caption.to_string(),
                    language,
                    existing_tags: existing_tags.to_vec(),
                };
                let mut item = match run_enrichment("llm summarize", cfg.llm_timeout, self.llm.summarize(req)).await {
                    Ok(summary) => {
                        let resolved_title = explicit
                            .clone()
                            .or_else(|| non_empty(summary.title))
                            .unwrap_or_else(|| "Image".to_string());
                        let mut tags = summary.tags;
                        tags.extend(hashtags.clone());
                        Item::draft(ItemType::Image, resolved_title)
                            .with_summary(summary.summary)
                            .with_content(caption.to_string())
                            .with_tags(tags)
                    }
                    Err(err) => {
                        warn!(%err, "llm summarize failed for captioned image, falling back");
                        note_fallback_item(explicit, caption, hashtags)
                    }
                };
                item.item_type = ItemType::Image;
                item.tags.insert(IMAGE_TAG.to_string());
                item.with_image_path(relative_path)
            }
        };
        Ok(item)
    }

    async fn ingest_topic(
        &self,
        raw: &RawContent,
        existing_tags: &[String],
        language: Language,
    ) -> Result<Item> {
        let topic = raw.text.clone().unwrap_or_default();
        let cfg = self.manager.config();

        let search_result = match run_enrichment("web search", cfg.search_timeout, self.search.search(&topic)).await {
            Ok(result) => Some(result),
            Err(err) => {
                warn!(%topic, %err, "web search failed for topic submission");
                None
            }
        };

        let formatted = search_result.as_ref().map(format_search_block).unwrap_or_else(|| {
            "No search results available.".to_string()
        });
        let abstract_text = search_result.as_ref().and_then(|r| r.abstract_text.clone());

        let req = SummarizeSearchRequest {
            topic: topic.clone(),
            formatted_results: formatted.clone(),
            language,
            existing_tags: existing_tags.to_vec(),
        };

        let item = match run_enrichment("llm summarize_search_results", cfg.llm_timeout, self.llm.summarize_search_results(req)).await {
            Ok(summary) => Item::draft(ItemType::Topic, non_empty(summary.title).unwrap_or_else(|| topic.clone()))
                .with_summary(summary.summary)
                .with_content(formatted)
                .with_tags(summary.tags),
            Err(err) => {
                warn!(%topic, %err, "llm summarize_search_results failed, falling back for topic item");
                topic_fallback_item(&topic, abstract_text, formatted)
            }
        };
        Ok(item)
    }

    /// Thin wrapper usable as an augmentation to the canonical
    /// wiki-link/tag-overlap mechanism: only suggestions with strength
    /// `>= 0.7` and a recognized `relation_type` are materialized.
    pub async fn score_relationships_with_llm(
        &self,
        vault: Arc<crate::vault::Vault>,
        subject: &Item,
        candidates: Vec<ItemContext>,
    ) -> Result<()> {
        let req = FindRelationshipsRequest {
            title: subject.title.clone(),
            summary: subject.summary.clone().unwrap_or_default(),
            tags: subject.tags.iter().cloned().collect(),
            candidates,
        };
        let suggestions = match self.llm.find_relationships(req).await {
            Ok(suggestions) => suggestions,
            Err(err) => {
                warn!(item_id = %subject.id, %err, "llm relationship scoring failed");
                return Ok(());
            }
        };
        let subject_id = subject.id.clone();
        crate::vault::run_blocking(vault, move |v| {
            for suggestion in suggestions {
                if !is_valid_llm_relationship(&suggestion) {
                    continue;
                }
                if let Err(err) = v.create_relationship(
                    &subject_id,
                    &suggestion.target_id,
                    &suggestion.relation_type,
                    suggestion.strength,
                ) {
                    warn!(item_id = %subject_id, %err, "failed to persist llm-suggested relationship");
                }
            }
            Ok(())
        })
        .await
    }
}

const ALLOWED_LLM_RELATION_TYPES: [&str; 5] =
    ["similar_topic", "references", "contradicts", "extends", "prerequisite"];

fn is_valid_llm_relationship(rel: &LlmRelationship) -> bool {
    (0.7..=1.0).contains(&rel.strength) && ALLOWED_LLM_RELATION_TYPES.contains(&rel.relation_type.as_str())
}

fn degraded_link_item(raw: &RawContent, url: &str) -> Item {
    let mut item = Item::draft(ItemType::Link, url).with_url(url.to_string()).with_tags([UNCATEGORIZED.to_string()]);
    if let Some(text) = raw.text.clone().filter(|t| !t.is_empty()) {
        item = item.with_content(text);
    }
    item
}

fn link_fallback_item(url: &str, extracted_title: Option<String>, excerpt: String, raw_text: String) -> Item {
    let title = non_empty(extracted_title.unwrap_or_default()).unwrap_or_else(|| url.to_string());
    Item::draft(ItemType::Link, title)
        .with_url(url.to_string())
        .with_content(excerpt)
        .with_raw_content(raw_text)
        .with_tags([UNCATEGORIZED.to_string()])
}

fn note_fallback_item(explicit: Option<String>, text: &str, hashtags: Vec<String>) -> Item {
    let title = explicit.unwrap_or_else(|| truncated_fallback(text));
    let mut tags = vec![UNCATEGORIZED.to_string()];
    tags.extend(hashtags);
    Item::draft(ItemType::Note, title).with_content(text.to_string()).with_tags(tags)
}

fn topic_fallback_item(topic: &str, abstract_text: Option<String>, formatted: String) -> Item {
    let summary = abstract_text
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| format!("Search result for: {topic}"));
    Item::draft(ItemType::Topic, topic)
        .with_summary(summary)
        .with_content(formatted)
        .with_tags([SEARCH_TAG.to_string(), UNCATEGORIZED.to_string()])
}

fn format_search_block(result: &crate::clients::SearchResponse) -> String {
    let mut out = String::new();
    if let Some(heading) = &result.heading {
        out.push_str(&format!("# {heading}\n\n"));
    }
    if let Some(abstract_text) = &result.abstract_text {
        out.push_str(abstract_text);
        out.push('\n');
    }
    if let Some(source) = &result.source {
        out.push_str(&format!("Source: {source}\n"));
    }
    if !result.related_topics.is_empty() {
        out.push_str("\nRelated:\n");
        for related in &result.related_topics {
            out.push_str(&format!("- {}\n", related.text));
        }
    }
    out
}

fn truncate_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let prefix: String = text.chars().take(max_chars).collect();
    format!("{prefix}...")
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}

/// Runs a collaborator call under its timeout budget, translating both a
/// collaborator-reported failure and a budget overrun into the same
/// `Error` shape so call sites have one branch to log and fall back from.
async fn run_enrichment<F, T>(stage: &'static str, budget: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = std::result::Result<T, ClientError>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Error::enrichment(stage, err)),
        Err(_elapsed) => Err(Error::Timeout { stage, budget_secs: budget.as_secs() }),
    }
}

/// A `SummarizeResponse` consumer helper kept near the pipeline so stage
/// functions above read top-to-bottom without an extra import hop.
impl SummarizeResponse {
    #[cfg(test)]
    fn stub(title: &str) -> Self {
        Self {
            title: title.to_string(),
            summary: "stub summary".to_string(),
            tags: vec!["stub".to_string()],
            related_topics: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ClientError, ReadabilityResult, RelatedTopic, SearchResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct StubReadability {
        fail: bool,
        result: ReadabilityResult,
    }

    #[async_trait]
    impl Readability for StubReadability {
        async fn extract(&self, _url: &str) -> std::result::Result<ReadabilityResult, ClientError> {
            if self.fail {
                Err(ClientError::new("fetch failed"))
            } else {
                Ok(self.result.clone())
            }
        }
    }

    struct StubSearch {
        fail: bool,
    }

    #[async_trait]
    impl WebSearch for StubSearch {
        async fn search(&self, topic: &str) -> std::result::Result<SearchResponse, ClientError> {
            if self.fail {
                Err(ClientError::new("search failed"))
            } else {
                Ok(SearchResponse {
                    heading: Some(topic.to_string()),
                    abstract_text: Some("An abstract.".to_string()),
                    abstract_url: None,
                    source: Some("stub".to_string()),
                    related_topics: vec![RelatedTopic { text: "Related one".to_string(), url: None }],
                })
            }
        }
    }

    struct StubLlm {
        fail_summarize: AtomicBool,
        response: Mutex<SummarizeResponse>,
    }

    impl StubLlm {
        fn succeeding(response: SummarizeResponse) -> Self {
            Self { fail_summarize: AtomicBool::new(false), response: Mutex::new(response) }
        }

        fn failing() -> Self {
            Self {
                fail_summarize: AtomicBool::new(true),
                response: Mutex::new(SummarizeResponse::default()),
            }
        }
    }

    #[async_trait]
    impl Llm for StubLlm {
        async fn summarize(&self, _req: SummarizeRequest) -> std::result::Result<SummarizeResponse, ClientError> {
            if self.fail_summarize.load(Ordering::SeqCst) {
                Err(ClientError::new("llm down"))
            } else {
                Ok(self.response.lock().unwrap().clone())
            }
        }

        async fn summarize_search_results(
            &self,
            _req: SummarizeSearchRequest,
        ) -> std::result::Result<SummarizeResponse, ClientError> {
            self.summarize(SummarizeRequest {
                content_type: "search",
                text: String::new(),
                language: Language::En,
                existing_tags: vec![],
            })
            .await
        }

        async fn find_relationships(
            &self,
            _req: FindRelationshipsRequest,
        ) -> std::result::Result<Vec<LlmRelationship>, ClientError> {
            Ok(vec![])
        }

        async fn answer_question(
            &self,
            _question: &str,
            _context: &[ItemContext],
        ) -> std::result::Result<String, ClientError> {
            Ok("stub answer".to_string())
        }
    }

    fn test_manager() -> (tempfile::TempDir, Arc<VaultManager>) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = crate::config::VaultManagerConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        (dir, Arc::new(VaultManager::new(cfg)))
    }

    #[tokio::test]
    async fn link_happy_path_uses_llm_summary() {
        let (_dir, manager) = test_manager();
        let readability = Arc::new(StubReadability {
            fail: false,
            result: ReadabilityResult {
                title: Some("Post".to_string()),
                text_content: "Hello world".to_string(),
                excerpt: Some("Hello".to_string()),
                ..Default::default()
            },
        });
        let search = Arc::new(StubSearch { fail: false });
        let llm = Arc::new(StubLlm::succeeding(SummarizeResponse {
            title: "Post".to_string(),
            summary: "A greeting.".to_string(),
            tags: vec!["greeting".to_string(), "example".to_string()],
            related_topics: vec![],
        }));
        let pipeline = Pipeline::new(manager, readability, search, llm);

        let raw = RawContent {
            owner_id: 1,
            content_type: RawContentType::Link,
            url: Some("https://example.com/post".to_string()),
            ..Default::default()
        };
        let item = pipeline.process(raw).await.unwrap();
        assert_eq!(item.title, "Post");
        assert_eq!(item.summary.as_deref(), Some("A greeting."));
        assert!(item.tags.contains("greeting"));
        assert!(item.tags.contains("example"));
    }

    #[tokio::test]
    async fn link_llm_outage_falls_back_to_uncategorized() {
        let (_dir, manager) = test_manager();
        let readability = Arc::new(StubReadability {
            fail: false,
            result: ReadabilityResult {
                title: Some("Post".to_string()),
                text_content: "Hello world".to_string(),
                excerpt: Some("Hello".to_string()),
                ..Default::default()
            },
        });
        let search = Arc::new(StubSearch { fail: false });
        let llm = Arc::new(StubLlm::failing());
        let pipeline = Pipeline::new(manager, readability, search, llm);

        let raw = RawContent {
            owner_id: 1,
            content_type: RawContentType::Link,
            url: Some("https://example.com/post".to_string()),
            ..Default::default()
        };
        let item = pipeline.process(raw).await.unwrap();
        assert_eq!(item.title, "Post");
        assert_eq!(item.tags.len(), 1);
        assert!(item.tags.contains(UNCATEGORIZED));
        assert_eq!(item.content.as_deref(), Some("Hello"));
        assert_eq!(item.raw_content.as_deref(), Some("Hello world"));
    }

    #[tokio::test]
    async fn link_fetch_failure_emits_degraded_item() {
        let (_dir, manager) = test_manager();
        let readability = Arc::new(StubReadability {
            fail: true,
            result: ReadabilityResult { title: None, text_content: String::new(), excerpt: None, ..Default::default() },
        });
        let search = Arc::new(StubSearch { fail: false });
        let llm = Arc::new(StubLlm::succeeding(SummarizeResponse::stub("unused")));
        let pipeline = Pipeline::new(manager, readability, search, llm);

        let raw = RawContent {
            owner_id: 1,
            content_type: RawContentType::Link,
            url: Some("https://example.com/dead".to_string()),
            ..Default::default()
        };
        let item = pipeline.process(raw).await.unwrap();
        assert_eq!(item.title, "https://example.com/dead");
        assert!(item.tags.contains(UNCATEGORIZED));
    }

    #[tokio::test]
    async fn note_explicit_title_wins_over_llm_title() {
        let (_dir, manager) = test_manager();
        let readability = Arc::new(StubReadability {
            fail: true,
            result: ReadabilityResult { title: None, text_content: String::new(), excerpt: None, ..Default::default() },
        });
        let search = Arc::new(StubSearch { fail: false });
        let llm = Arc::new(StubLlm::succeeding(SummarizeResponse {
            title: "X".to_string(),
            summary: "...".to_string(),
            tags: vec!["notes".to_string()],
            related_topics: vec![],
        }));
        let pipeline = Pipeline::new(manager, readability, search, llm);

        let raw = RawContent {
            owner_id: 1,
            content_type: RawContentType::Note,
            text: Some("# Meeting\nDiscuss #roadmap today".to_string()),
            ..Default::default()
        };
        let item = pipeline.process(raw).await.unwrap();
        assert_eq!(item.title, "Meeting");
        assert!(item.tags.contains("roadmap"));
        assert!(item.tags.contains("notes"));
    }

    #[tokio::test]
    async fn topic_search_failure_still_falls_back_through_llm_failure() {
        let (_dir, manager) = test_manager();
        let readability = Arc::new(StubReadability {
            fail: true,
            result: ReadabilityResult { title: None, text_content: String::new(), excerpt: None, ..Default::default() },
        });
        let search = Arc::new(StubSearch { fail: true });
        let llm = Arc::new(StubLlm::failing());
        let pipeline = Pipeline::new(manager, readability, search, llm);

        let raw = RawContent {
            owner_id: 1,
            content_type: RawContentType::Topic,
            text: Some("kubernetes".to_string()),
            ..Default::default()
        };
        let item = pipeline.process(raw).await.unwrap();
        assert_eq!(item.title, "kubernetes");
        assert!(item.tags.contains(SEARCH_TAG));
        assert!(item.tags.contains(UNCATEGORIZED));
        assert_eq!(item.summary.as_deref(), Some("Search result for: kubernetes"));
    }

    #[tokio::test]
    async fn image_without_caption_is_tagged_image_only() {
        let (dir, manager) = test_manager();
        let readability = Arc::new(StubReadability {
            fail: true,
            result: ReadabilityResult { title: None, text_content: String::new(), excerpt: None, ..Default::default() },
        });
        let search = Arc::new(StubSearch { fail: false });
        let llm = Arc::new(StubLlm::failing());
        let pipeline = Pipeline::new(manager, readability, search, llm);

        let raw = RawContent {
            owner_id: 1,
            content_type: RawContentType::Image,
            image_bytes: Some(vec![0xFF, 0xD8, 0xFF]),
            image_ext: Some("jpg".to_string()),
            ..Default::default()
        };
        let item = pipeline.process(raw).await.unwrap();
        assert_eq!(item.title, "Image");
        assert_eq!(item.tags.len(), 1);
        assert!(item.tags.contains(IMAGE_TAG));
        assert!(item.image_path.is_some());
        let path = dir.path().join("users/1/images");
        assert!(std::fs::read_dir(&path).unwrap().count() == 1);
    }
}
