//! Journal MCP server implementation

use anyhow::Result;
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerInfo},
    tool, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use recollect::core::filter::SearchFilters;
use recollect::search::embedding::HarmonicEmbedder;
use recollect::search::engine::RetrievalEngine;
use recollect::store::db::JournalStore;
use recollect::RetrievalError;

/// Parameters for journal_search tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Natural language search query (e.g., "rainy afternoons in Lisbon")
    #[schemars(description = "Natural language search query")]
    pub query: String,
    /// Earliest calendar day to include
    #[schemars(description = "Earliest calendar day, YYYY-MM-DD")]
    #[serde(default)]
    pub date_from: Option<String>,
    /// Latest calendar day to include (the whole day counts)
    #[schemars(description = "Latest calendar day (inclusive), YYYY-MM-DD")]
    #[serde(default)]
    pub date_to: Option<String>,
    #[schemars(description = "Only entries written in this city (case-insensitive)")]
    #[serde(default)]
    pub city: Option<String>,
    #[schemars(description = "Only starred (true) or unstarred (false) entries")]
    #[serde(default)]
    pub starred: Option<bool>,
    #[schemars(description = "Only entries carrying at least one of these tags")]
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Maximum number of results to return (default: 5)
    #[schemars(description = "Maximum number of results (default: 5)")]
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    5
}

/// Parameters for journal_find_similar tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SimilarParams {
    /// UUID of the source entry
    #[schemars(description = "UUID of the source journal entry")]
    pub uuid: String,
    /// Maximum number of results to return (default: 5)
    #[schemars(description = "Maximum number of results (default: 5)")]
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Search hit for JSON output
#[derive(Debug, Serialize)]
struct SearchHitJson {
    uuid: Uuid,
    text: String,
    created_at: String,
    city: Option<String>,
    starred: bool,
    tags: Vec<String>,
    score: f64,
    matched_by: &'static str,
}

/// Similarity hit for JSON output
#[derive(Debug, Serialize)]
struct SimilarHitJson {
    uuid: Uuid,
    text: String,
    created_at: String,
    city: Option<String>,
    tags: Vec<String>,
    similarity: f32,
}

/// Journal MCP Service
#[derive(Clone)]
pub struct JournalService {
    db_path: PathBuf,
    tool_router: ToolRouter<Self>,
}

impl JournalService {
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path,
            tool_router: Self::tool_router(),
        }
    }

    fn get_engine(&self) -> Result<RetrievalEngine<HarmonicEmbedder>, McpError> {
        let store = JournalStore::open(&self.db_path).map_err(|e| {
            McpError::internal_error(format!("Failed to open store: {}", e), None)
        })?;
        Ok(RetrievalEngine::new(store, HarmonicEmbedder::new()))
    }
}

fn tool_error(err: RetrievalError) -> McpError {
    match err {
        RetrievalError::InvalidFilter(_) => McpError::invalid_params(err.to_string(), None),
        _ => McpError::internal_error(err.to_string(), None),
    }
}

#[tool_router]
impl JournalService {
    /// Hybrid search over journal entries
    #[tool(description = "Search journal entries with hybrid semantic + keyword ranking. Results are ordered by fused relevance and tagged with whether each entry matched by meaning, by keyword, or both. Optional filters: date range, city, starred, tags.")]
    async fn journal_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let engine = self.get_engine()?;
        // Clamp limit: max 100 (DoS prevention)
        let limit = params.0.limit.max(1).min(100);

        let filters = SearchFilters {
            date_from: params.0.date_from,
            date_to: params.0.date_to,
            city: params.0.city,
            starred: params.0.starred,
            tags: params.0.tags,
        };

        let hits = engine
            .search(&params.0.query, &filters, limit)
            .map_err(tool_error)?;

        if hits.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(
                "No matching entries. Broaden the query or relax the filters.",
            )]));
        }

        let json_results: Vec<SearchHitJson> = hits
            .into_iter()
            .map(|hit| SearchHitJson {
                uuid: hit.entry.uuid,
                text: hit.entry.text,
                created_at: hit.entry.created_at.to_rfc3339(),
                city: hit.entry.city,
                starred: hit.entry.starred,
                tags: hit.entry.tags,
                score: hit.score,
                matched_by: match (hit.matched_semantic, hit.matched_lexical) {
                    (true, true) => "meaning + keyword",
                    (true, false) => "meaning",
                    _ => "keyword",
                },
            })
            .collect();

        let output = serde_json::to_string_pretty(&json_results).map_err(|e| {
            McpError::internal_error(format!("JSON serialization failed: {}", e), None)
        })?;

        Ok(CallToolResult::success(vec![Content::text(output)]))
    }

    /// Nearest neighbors of one entry
    #[tool(description = "Find journal entries semantically similar to one source entry. Returns nearest neighbors by embedding distance; the source entry is never included.")]
    async fn journal_find_similar(
        &self,
        params: Parameters<SimilarParams>,
    ) -> Result<CallToolResult, McpError> {
        let source = Uuid::parse_str(params.0.uuid.trim()).map_err(|_| {
            McpError::invalid_params(format!("'{}' is not a valid UUID", params.0.uuid), None)
        })?;

        let engine = self.get_engine()?;
        let limit = params.0.limit.max(1).min(100);

        let hits = engine.find_similar(source, limit).map_err(tool_error)?;

        if hits.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(
                "No similar entries. The source entry may be missing or not embedded yet.",
            )]));
        }

        let json_results: Vec<SimilarHitJson> = hits
            .into_iter()
            .map(|hit| SimilarHitJson {
                uuid: hit.entry.uuid,
                text: hit.entry.text,
                created_at: hit.entry.created_at.to_rfc3339(),
                city: hit.entry.city,
                tags: hit.entry.tags,
                similarity: hit.similarity,
            })
            .collect();

        let output = serde_json::to_string_pretty(&json_results).map_err(|e| {
            McpError::internal_error(format!("JSON serialization failed: {}", e), None)
        })?;

        Ok(CallToolResult::success(vec![Content::text(output)]))
    }

    /// Store statistics
    #[tool(description = "Get journal store statistics: entry count, embedding coverage, tag and media counts.")]
    async fn journal_status(&self) -> Result<CallToolResult, McpError> {
        let engine = self.get_engine()?;
        let stats = engine.store().stats().map_err(tool_error)?;

        let output = serde_json::to_string_pretty(&stats).map_err(|e| {
            McpError::internal_error(format!("JSON serialization failed: {}", e), None)
        })?;

        Ok(CallToolResult::success(vec![Content::text(output)]))
    }
}

impl ServerHandler for JournalService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Personal journal retrieval server. Provides hybrid semantic + keyword search and similar-entry lookup over imported journal entries.".to_string(),
            ),
            ..Default::default()
        }
    }
}

/// Run the MCP server
pub async fn run_mcp_server(db_path: PathBuf) -> Result<()> {
    use tokio::io::{stdin, stdout};

    let service = JournalService::new(db_path);
    let transport = (stdin(), stdout());
    let server = service.serve(transport).await?;
    server.waiting().await?;

    Ok(())
}
