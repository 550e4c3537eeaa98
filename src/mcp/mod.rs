//! MCP Server for journal retrieval
//!
//! Provides AI-native access to hybrid search and similar-entry lookup.

mod server;

pub use server::run_mcp_server;
