use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Ambient knobs for the vault manager and ingestion pipeline. Defaults
/// mirror the budgets and bounds named throughout the component design.
#[derive(Debug, Clone)]
pub struct VaultManagerConfig {
    /// Root of `<dataDir>/users/<ownerId>/...`.
    pub data_dir: PathBuf,
    /// Budget for the link stage's readability fetch+extract call.
    pub fetch_timeout: Duration,
    /// Budget for any LLM call (summarize, findRelationships, answerQuestion).
    pub llm_timeout: Duration,
    /// Budget for the topic stage's web-search call.
    pub search_timeout: Duration,
    /// Max characters of extracted article text sent to the LLM, with an
    /// ellipsis appended on truncation.
    pub link_excerpt_chars: usize,
    /// Cap on "recent items" considered when assembling a graph snapshot.
    pub max_recent_items_for_graph: usize,
    /// Cap on "recent items" scanned during relationship inference.
    pub max_recent_items_for_relationships: usize,
    /// Generic tags excluded from tag-overlap scoring.
    pub generic_tags: BTreeSet<String>,
    /// Result cap for `search()` on the query facade.
    pub search_result_limit: usize,
    /// Result cap for `ask()`'s retrieval step.
    pub ask_retrieval_limit: usize,
}

impl Default for VaultManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            fetch_timeout: Duration::from_secs(30),
            llm_timeout: Duration::from_secs(60),
            search_timeout: Duration::from_secs(15),
            link_excerpt_chars: 8_000,
            max_recent_items_for_graph: 1_000,
            max_recent_items_for_relationships: 1_000,
            generic_tags: ["uncategorized", "image", "search", "link", "note"]
                .into_iter()
                .map(String::from)
                .collect(),
            search_result_limit: 20,
            ask_retrieval_limit: 5,
        }
    }
}
