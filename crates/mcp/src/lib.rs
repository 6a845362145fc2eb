//! DL MCP server.
//!
//! Serves document `search`/`fetch` and sandboxed filesystem tools over the
//! MCP streamable HTTP transport. Every request to `/mcp` must carry a bearer
//! token accepted by [`MultiAudienceVerifier`](dlmcp_auth::jwt::MultiAudienceVerifier).

pub mod app;
pub mod config;
mod server;

pub use config::{Cli, ConfigError, ServerConfig};
pub use server::DlServer;
