//! Query Facade: the thin, consistently-erroring read surface
//! an HTTP layer sits on top of. Every method here takes an owner id,
//! resolves the vault through the manager, and translates not-found into
//! `Option::None` rather than an error — matching the "not-found on
//! read" contract.

use std::sync::Arc;

use crate::clients::{ItemContext, Llm};
use crate::error::Result;
use crate::manager::VaultManager;
use crate::model::{Answer, AnswerSource, GraphSnapshot, Item, VaultStats};

const NO_RELEVANT_ITEMS_ANSWER: &str =
    "I couldn't find any relevant items in your vault to answer that question.";

pub struct QueryFacade {
    manager: Arc<VaultManager>,
    llm: Arc<dyn Llm>,
}

impl QueryFacade {
    pub fn new(manager: Arc<VaultManager>, llm: Arc<dyn Llm>) -> Self {
        Self { manager, llm }
    }

    pub async fn list(&self, owner_id: u64, limit: usize, offset: usize, tag: Option<&str>) -> Result<Vec<Item>> {
        let vault = self.manager.get_vault(owner_id).await?;
        let tag = tag.map(str::to_string);
        crate::vault::run_blocking(vault, move |v| match &tag {
            Some(tag) => v.list_items_by_tag(tag, limit, offset),
            None => v.list_items(limit, offset),
        })
        .await
    }

    pub async fn get(&self, owner_id: u64, id: &str) -> Result<Option<Item>> {
        let vault = self.manager.get_vault(owner_id).await?;
        let id = id.to_string();
        crate::vault::run_blocking(vault, move |v| v.get_item(&id)).await
    }

    pub async fn delete(&self, owner_id: u64, id: &str) -> Result<bool> {
        let vault = self.manager.get_vault(owner_id).await?;
        let id = id.to_string();
        crate::vault::run_blocking(vault, move |v| v.delete_item(&id)).await
    }

    /// `q` is passed to the FTS engine verbatim; sanitizing untrusted
    /// query expressions is the caller's responsibility (see
    /// Open Questions). `vault::escape_fts5_query` is available for
    /// callers who want it but is never applied implicitly here.
    pub async fn search(&self, owner_id: u64, q: &str) -> Result<Vec<crate::model::SearchResult>> {
        let vault = self.manager.get_vault(owner_id).await?;
        let limit = self.manager.config().search_result_limit;
        let q = q.to_string();
        crate::vault::run_blocking(vault, move |v| v.search(&q, limit)).await
    }

    pub async fn tags(&self, owner_id: u64) -> Result<Vec<String>> {
        let vault = self.manager.get_vault(owner_id).await?;
        crate::vault::run_blocking(vault, |v| v.get_all_tags()).await
    }

    pub async fn graph(&self, owner_id: u64) -> Result<GraphSnapshot> {
        let vault = self.manager.get_vault(owner_id).await?;
        let limit = self.manager.config().max_recent_items_for_graph;
        crate::vault::run_blocking(vault, move |v| v.get_graph(limit)).await
    }

    /// Retrieval-augmented answer: search for the question, format the top
    /// hits, call the LLM. When there are no hits at all, returns the
    /// stock "no relevant items" answer without ever calling the LLM.
    pub async fn ask(&self, owner_id: u64, question: &str) -> Result<Answer> {
        let vault = self.manager.get_vault(owner_id).await?;
        let limit = self.manager.config().ask_retrieval_limit;
        let question_owned = question.to_string();
        let hits =
            crate::vault::run_blocking(vault, move |v| v.search(&question_owned, limit)).await?;

        if hits.is_empty() {
            return Ok(Answer { answer: NO_RELEVANT_ITEMS_ANSWER.to_string(), sources: Vec::new() });
        }

        let context: Vec<ItemContext> = hits
            .iter()
            .map(|hit| ItemContext {
                item_id: hit.item.id.clone(),
                title: hit.item.title.clone(),
                text: format_item_context(hit),
            })
            .collect();

        let answer = match self.llm.answer_question(question, &context).await {
            Ok(answer) => answer,
            Err(err) => {
                tracing::warn!(%err, "llm answer_question failed");
                NO_RELEVANT_ITEMS_ANSWER.to_string()
            }
        };

        let sources = hits
            .into_iter()
            .map(|hit| AnswerSource { item_id: hit.item.id, title: hit.item.title, snippet: hit.snippet })
            .collect();

        Ok(Answer { answer, sources })
    }

    pub async fn stats(&self, owner_id: u64) -> Result<VaultStats> {
        let vault = self.manager.get_vault(owner_id).await?;
        crate::vault::run_blocking(vault, |v| v.stats()).await
    }

    pub async fn get_setting(&self, owner_id: u64, key: &str) -> Result<Option<String>> {
        let vault = self.manager.get_vault(owner_id).await?;
        let key = key.to_string();
        crate::vault::run_blocking(vault, move |v| v.get_setting(&key)).await
    }

    pub async fn set_setting(&self, owner_id: u64, key: &str, value: &str) -> Result<()> {
        let vault = self.manager.get_vault(owner_id).await?;
        let key = key.to_string();
        let value = value.to_string();
        crate::vault::run_blocking(vault, move |v| v.set_setting(&key, &value)).await
    }

    pub async fn export(&self, owner_id: u64) -> Result<Vec<u8>> {
        let vault = self.manager.get_vault(owner_id).await?;
        let limit = self.manager.config().max_recent_items_for_graph;
        let snapshot = crate::vault::run_blocking(vault, move |v| v.get_graph(limit)).await?;
        crate::exporter::export_zip(&snapshot)
    }
}

fn format_item_context(hit: &crate::model::SearchResult) -> String {
    let mut out = format!("Title: {}\n", hit.item.title);
    if let Some(summary) = &hit.item.summary {
        out.push_str(&format!("Summary: {summary}\n"));
    }
    if let Some(content) = &hit.item.content {
        out.push_str(&format!("Content: {content}\n"));
    }
    out
}
