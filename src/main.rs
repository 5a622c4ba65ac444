//! `mvctl` — a demonstration CLI that wires the `mindvault` library to
//! stand-in implementations of the three external collaborator traits
//! (readability, web search, LLM), so the ingestion-and-storage engine
//! can be exercised end-to-end without a real network dependency. This
//! binary is a harness, not a product surface: the real HTTP router,
//! chat front-end, and concrete provider wire formats are host concerns
//! (out of scope for this library).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use mindvault::{
    ClientError, FindRelationshipsRequest, ItemContext, Llm, LlmRelationship, Pipeline,
    QueryFacade, RawContent, RawContentType, Readability, ReadabilityResult, RelatedTopic,
    SearchResponse, SummarizeRequest, SummarizeResponse, SummarizeSearchRequest, VaultManager,
    VaultManagerConfig, WebSearch,
};

#[derive(Debug, Parser)]
#[command(name = "mvctl", about = "Demonstration CLI for the mindvault ingestion engine")]
struct Cli {
    #[arg(long, env = "MINDVAULT_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    #[arg(long, default_value_t = 1)]
    owner: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest a web link.
    IngestLink { url: String },
    /// Ingest a free-text note (may contain a `# Title` heading and `#hashtags`).
    IngestNote { text: String },
    /// Ingest an image file, optionally captioned.
    IngestImage {
        path: PathBuf,
        #[arg(long)]
        caption: Option<String>,
    },
    /// Ingest a short topic query routed through web search.
    IngestTopic {
        topic: String,
        #[arg(long)]
        lang: Option<String>,
    },
    /// List items, optionally filtered by tag.
    List {
        #[arg(long)]
        tag: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Fetch a single item by id.
    Get { id: String },
    /// Delete a single item by id.
    Delete { id: String },
    /// Full-text search.
    Search { query: String },
    /// List all known tags.
    Tags,
    /// Dump the graph snapshot (items + relationships).
    Graph,
    /// Ask a retrieval-augmented question over the vault.
    Ask { question: String },
    /// Print vault stats.
    Stats,
    /// Export the vault as a zip archive.
    Export { out: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = VaultManagerConfig { data_dir: cli.data_dir.clone(), ..Default::default() };
    let manager = Arc::new(VaultManager::new(cfg));
    let llm: Arc<dyn Llm> = Arc::new(DemoLlm);
    let pipeline = Pipeline::new(
        Arc::clone(&manager),
        Arc::new(DemoReadability),
        Arc::new(DemoWebSearch),
        Arc::clone(&llm),
    );
    let facade = QueryFacade::new(Arc::clone(&manager), llm);

    match cli.command {
        Command::IngestLink { url } => {
            let raw = RawContent {
                owner_id: cli.owner,
                content_type: RawContentType::Link,
                url: Some(url),
                ..Default::default()
            };
            print_json(&pipeline.process(raw).await?)?;
        }
        Command::IngestNote { text } => {
            let raw = RawContent {
                owner_id: cli.owner,
                content_type: RawContentType::Note,
                text: Some(text),
                ..Default::default()
            };
            print_json(&pipeline.process(raw).await?)?;
        }
        Command::IngestImage { path, caption } => {
            let bytes = std::fs::read(&path)?;
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("bin").to_string();
            let raw = RawContent {
                owner_id: cli.owner,
                content_type: RawContentType::Image,
                image_bytes: Some(bytes),
                image_ext: Some(ext),
                caption,
                ..Default::default()
            };
            print_json(&pipeline.process(raw).await?)?;
        }
        Command::IngestTopic { topic, lang } => {
            let raw = RawContent {
                owner_id: cli.owner,
                content_type: RawContentType::Topic,
                text: Some(topic),
                language_hint: lang,
                ..Default::default()
            };
            print_json(&pipeline.process(raw).await?)?;
        }
        Command::List { tag, limit, offset } => {
            let items = facade.list(cli.owner, limit, offset, tag.as_deref()).await?;
            print_json(&items)?;
        }
        Command::Get { id } => {
            print_json(&facade.get(cli.owner, &id).await?)?;
        }
        Command::Delete { id } => {
            let deleted = facade.delete(cli.owner, &id).await?;
            println!("{{\"deleted\": {deleted}}}");
        }
        Command::Search { query } => {
            let hits: Vec<_> = facade
                .search(cli.owner, &query)
                .await?
                .into_iter()
                .map(|h| serde_json::json!({"item": h.item, "snippet": h.snippet, "score": h.score}))
                .collect();
            print_json(&hits)?;
        }
        Command::Tags => {
            print_json(&facade.tags(cli.owner).await?)?;
        }
        Command::Graph => {
            let graph = facade.graph(cli.owner).await?;
            print_json(&serde_json::json!({"items": graph.items, "relationships": graph.relationships}))?;
        }
        Command::Ask { question } => {
            print_json(&facade.ask(cli.owner, &question).await?)?;
        }
        Command::Stats => {
            print_json(&facade.stats(cli.owner).await?)?;
        }
        Command::Export { out } => {
            let bytes = facade.export(cli.owner).await?;
            std::fs::write(&out, bytes)?;
            println!("wrote {}", out.display());
        }
    }

    manager.close().await?;
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Extracts a naive "title" from a URL and a fixed filler body. A real
/// deployment would fetch the page and run a readability parser.
struct DemoReadability;

#[async_trait]
impl Readability for DemoReadability {
    async fn extract(&self, url: &str) -> std::result::Result<ReadabilityResult, ClientError> {
        let title = url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .split('/')
            .next()
            .map(|s| s.to_string());
        Ok(ReadabilityResult {
            title,
            text_content: format!("Demonstration extraction for {url}."),
            excerpt: Some(format!("Demonstration extraction for {url}.")),
            ..Default::default()
        })
    }
}

/// Echoes the topic back as a single canned "abstract". A real deployment
/// would call an actual search API.
struct DemoWebSearch;

#[async_trait]
impl WebSearch for DemoWebSearch {
    async fn search(&self, topic: &str) -> std::result::Result<SearchResponse, ClientError> {
        Ok(SearchResponse {
            heading: Some(topic.to_string()),
            abstract_text: Some(format!("{topic} is a topic with no configured search provider.")),
            abstract_url: None,
            source: Some("demo".to_string()),
            related_topics: vec![RelatedTopic { text: format!("More about {topic}"), url: None }],
        })
    }
}

/// Deterministic stand-in for a real LLM provider: titles are the first
/// few words of the input, summaries are truncated text, tags are empty
/// unless the caller already supplied some. Exists purely so `mvctl` runs
/// without network access; it has no bearing on the enrichment contract
/// itself, which is defined entirely by the trait.
struct DemoLlm;

#[async_trait]
impl Llm for DemoLlm {
    async fn summarize(&self, req: SummarizeRequest) -> std::result::Result<SummarizeResponse, ClientError> {
        Ok(SummarizeResponse {
            title: first_words(&req.text, 8),
            summary: first_words(&req.text, 30),
            tags: req.existing_tags.into_iter().take(3).collect(),
            related_topics: vec![],
        })
    }

    async fn summarize_search_results(
        &self,
        req: SummarizeSearchRequest,
    ) -> std::result::Result<SummarizeResponse, ClientError> {
        Ok(SummarizeResponse {
            title: req.topic.clone(),
            summary: first_words(&req.formatted_results, 30),
            tags: vec!["search".to_string()],
            related_topics: vec![],
        })
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
        context: &[ItemContext],
    ) -> std::result::Result<String, ClientError> {
        let titles: Vec<&str> = context.iter().map(|c| c.title.as_str()).collect();
        Ok(format!("Based on {} item(s): {}", titles.len(), titles.join(", ")))
    }
}

fn first_words(text: &str, n: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().take(n).collect();
    let joined = words.join(" ");
    if joined.is_empty() {
        "Untitled".to_string()
    } else {
        joined
    }
}
