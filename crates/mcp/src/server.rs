//! The MCP tool surface.
//!
//! Successful tool calls return pretty-printed JSON. Failures return
//! `{"error": <code>, "message": <text>}` as a tool error.

use std::sync::Arc;

use dlmcp_documents::DocumentStore;
use dlmcp_filesystem::{ContentMode, FsError, Sandbox, WriteOptions};
use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{Implementation, ServerCapabilities, ServerInfo},
    schemars::{self, JsonSchema},
    tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};

const INSTRUCTIONS: &str = "search liefert Resultate als JSON-Array (id,title,url). \
fetch liefert das vollständige Dokument mit text und metadata.";

/// Parameters for `search`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Case-insensitive text to look for; empty matches every document.
    #[serde(default)]
    pub query: String,
}

/// Parameters for `fetch`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct FetchParams {
    /// Document id as returned by `search`.
    pub id: String,
}

/// Parameters for `list`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListParams {
    /// Directory relative to the sandbox root.
    #[serde(default = "current_dir")]
    pub path: String,
    /// Glob matched against entry names (default `*`).
    pub pattern: Option<String>,
}

/// Parameters for tools that take a single path.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct PathParams {
    /// Path relative to the sandbox root.
    pub path: String,
}

/// How content is carried in `read` and `write`.
#[derive(Clone, Copy, Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Decoded text.
    #[default]
    Text,
    /// Standard base64.
    Binary,
}

impl From<Mode> for ContentMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Text => ContentMode::Text,
            Mode::Binary => ContentMode::Binary,
        }
    }
}

/// Parameters for `read`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadParams {
    /// File path relative to the sandbox root.
    pub path: String,
    #[serde(default)]
    pub mode: Mode,
    /// Text encoding label (default `utf-8`).
    pub encoding: Option<String>,
}

/// Parameters for `write`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteParams {
    /// File path relative to the sandbox root.
    pub path: String,
    /// Text, or base64 in binary mode.
    pub content: String,
    #[serde(default)]
    pub mode: Mode,
    /// Text encoding label (default `utf-8`).
    pub encoding: Option<String>,
    /// Append instead of overwriting.
    #[serde(default)]
    pub append: bool,
}

/// Parameters for `mkdir`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct MkdirParams {
    /// Directory path relative to the sandbox root.
    pub path: String,
    /// Succeed if the directory already exists (default true).
    #[serde(default = "yes")]
    pub exist_ok: bool,
}

/// Parameters for `delete`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteParams {
    /// Path relative to the sandbox root.
    pub path: String,
    /// Required to delete a non-empty directory.
    #[serde(default)]
    pub recursive: bool,
}

/// Parameters for `move` and `copy`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct TransferParams {
    /// Source path relative to the sandbox root.
    pub source: String,
    /// Destination path relative to the sandbox root.
    pub destination: String,
    /// Replace an existing destination.
    #[serde(default)]
    pub overwrite: bool,
}

fn current_dir() -> String {
    ".".into()
}

fn yes() -> bool {
    true
}

/// Error payload of a failed tool call.
#[derive(Debug, Serialize)]
struct ToolError<'a> {
    error: &'a str,
    message: String,
}

fn tool_error(code: &str, message: impl std::fmt::Display) -> String {
    let payload = ToolError {
        error: code,
        message: message.to_string(),
    };
    serde_json::to_string(&payload)
        .unwrap_or_else(|_| format!("{{\"error\":\"{code}\"}}"))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| tool_error("internal_error", e))
}

fn fs_reply<T: Serialize>(tool: &'static str, result: Result<T, FsError>) -> Result<String, String> {
    match result {
        Ok(value) => to_json(&value),
        Err(e) => {
            if matches!(e, FsError::Io(_)) {
                tracing::warn!(tool, code = e.code(), error = %e, "tool failed");
            } else {
                tracing::debug!(tool, code = e.code(), error = %e, "tool rejected request");
            }
            Err(tool_error(e.code(), &e))
        }
    }
}

/// MCP server with document search and sandboxed filesystem tools.
#[derive(Debug, Clone)]
pub struct DlServer {
    sandbox: Sandbox,
    documents: Arc<DocumentStore>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl DlServer {
    pub fn new(sandbox: Sandbox, documents: Arc<DocumentStore>) -> Self {
        Self {
            sandbox,
            documents,
            tool_router: Self::tool_router(),
        }
    }

    /// Search the document store.
    #[tool(description = "Search documents by text. Returns {results: [{id, title, url}]}")]
    async fn search(&self, Parameters(params): Parameters<SearchParams>) -> Result<String, String> {
        to_json(&self.documents.search(&params.query))
    }

    /// Fetch one document by id.
    #[tool(
        description = "Fetch a full document by id. Returns {id, title, text, url, metadata}"
    )]
    async fn fetch(&self, Parameters(params): Parameters<FetchParams>) -> Result<String, String> {
        match self.documents.fetch(&params.id) {
            Ok(doc) => to_json(&doc),
            Err(e) => Err(tool_error(e.code(), &e)),
        }
    }

    #[tool(
        description = "List the entries of a directory whose names match a glob pattern (non-recursive)"
    )]
    async fn list(&self, Parameters(params): Parameters<ListParams>) -> Result<String, String> {
        let pattern = params.pattern.as_deref().unwrap_or("*");
        fs_reply("list", self.sandbox.list(&params.path, pattern).await)
    }

    #[tool(description = "Report whether a path exists, its type, size and modification time")]
    async fn stat(&self, Parameters(params): Parameters<PathParams>) -> Result<String, String> {
        fs_reply("stat", self.sandbox.stat(&params.path).await)
    }

    #[tool(description = "Read a file as text in a given encoding, or as base64 in binary mode")]
    async fn read(&self, Parameters(params): Parameters<ReadParams>) -> Result<String, String> {
        let result = self
            .sandbox
            .read(&params.path, params.mode.into(), params.encoding.as_deref())
            .await;
        fs_reply("read", result)
    }

    #[tool(
        description = "Write or append text or base64 content to a file, creating parent directories"
    )]
    async fn write(&self, Parameters(params): Parameters<WriteParams>) -> Result<String, String> {
        let options = WriteOptions {
            mode: params.mode.into(),
            encoding: params.encoding,
            append: params.append,
        };
        let result = self.sandbox.write(&params.path, &params.content, &options).await;
        fs_reply("write", result)
    }

    #[tool(description = "Create a directory and any missing parents")]
    async fn mkdir(&self, Parameters(params): Parameters<MkdirParams>) -> Result<String, String> {
        fs_reply("mkdir", self.sandbox.mkdir(&params.path, params.exist_ok).await)
    }

    #[tool(
        description = "Delete a file or empty directory; non-empty directories need recursive=true"
    )]
    async fn delete(&self, Parameters(params): Parameters<DeleteParams>) -> Result<String, String> {
        fs_reply("delete", self.sandbox.delete(&params.path, params.recursive).await)
    }

    #[tool(
        name = "move",
        description = "Move or rename a file or directory; an existing destination needs overwrite=true"
    )]
    async fn move_path(
        &self,
        Parameters(params): Parameters<TransferParams>,
    ) -> Result<String, String> {
        let result = self
            .sandbox
            .move_path(&params.source, &params.destination, params.overwrite)
            .await;
        fs_reply("move", result)
    }

    #[tool(
        description = "Copy a file or directory tree; an existing destination needs overwrite=true"
    )]
    async fn copy(&self, Parameters(params): Parameters<TransferParams>) -> Result<String, String> {
        let result = self
            .sandbox
            .copy(&params.source, &params.destination, params.overwrite)
            .await;
        fs_reply("copy", result)
    }
}

#[tool_handler]
impl ServerHandler for DlServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "dl-mcp".into(),
                title: Some("DL MCP Server".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    fn server() -> (TempDir, DlServer) {
        let tmp = TempDir::new().unwrap();
        let sandbox = Sandbox::new(tmp.path()).unwrap();
        (tmp, DlServer::new(sandbox, Arc::new(DocumentStore::demo())))
    }

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    fn transfer(source: &str, destination: &str, overwrite: bool) -> Parameters<TransferParams> {
        Parameters(TransferParams {
            source: source.into(),
            destination: destination.into(),
            overwrite,
        })
    }

    #[tokio::test]
    async fn search_and_fetch() {
        let (_tmp, server) = server();
        let found = server
            .search(Parameters(SearchParams {
                query: "portal".into(),
            }))
            .await
            .unwrap();
        assert_eq!(parse(&found)["results"][0]["id"], "doc-admin");

        let doc = server
            .fetch(Parameters(FetchParams {
                id: "doc-admin".into(),
            }))
            .await
            .unwrap();
        assert_eq!(parse(&doc)["metadata"]["source"], "demo");
    }

    #[tokio::test]
    async fn fetch_unknown_is_structured_error() {
        let (_tmp, server) = server();
        let err = server
            .fetch(Parameters(FetchParams { id: "nope".into() }))
            .await
            .unwrap_err();
        assert_eq!(parse(&err)["error"], "not_found");
    }

    #[tokio::test]
    async fn escape_is_reported_by_code() {
        let (_tmp, server) = server();
        let err = server
            .read(Parameters(ReadParams {
                path: "../../etc/passwd".into(),
                mode: Mode::Text,
                encoding: None,
            }))
            .await
            .unwrap_err();
        let err = parse(&err);
        assert_eq!(err["error"], "path_outside_base");
        assert!(err["message"].as_str().unwrap().contains("../../etc/passwd"));
    }

    #[tokio::test]
    async fn write_then_list() {
        let (_tmp, server) = server();
        let empty = server
            .list(Parameters(ListParams {
                path: ".".into(),
                pattern: None,
            }))
            .await
            .unwrap();
        assert_eq!(parse(&empty), json!({"path": ".", "exists": true, "items": []}));

        server
            .write(Parameters(WriteParams {
                path: "docs/hello.txt".into(),
                content: "hi".into(),
                mode: Mode::Text,
                encoding: None,
                append: false,
            }))
            .await
            .unwrap();

        let listing = server
            .list(Parameters(ListParams {
                path: "docs".into(),
                pattern: Some("*.txt".into()),
            }))
            .await
            .unwrap();
        let listing = parse(&listing);
        assert_eq!(listing["items"][0]["path"], "docs/hello.txt");
        assert_eq!(listing["items"][0]["type"], "file");
        assert_eq!(listing["items"][0]["size"], 2);
    }

    #[tokio::test]
    async fn move_needs_overwrite() {
        let (tmp, server) = server();
        std::fs::write(tmp.path().join("a"), "a").unwrap();
        std::fs::write(tmp.path().join("b"), "b").unwrap();

        let err = server.move_path(transfer("a", "b", false)).await.unwrap_err();
        assert_eq!(parse(&err)["error"], "destination_exists");

        let moved = parse(&server.move_path(transfer("a", "b", true)).await.unwrap());
        assert_eq!(moved["overwritten"], true);
        assert!(!tmp.path().join("a").exists());
    }

    #[tokio::test]
    async fn delete_missing_reports_not_deleted() {
        let (_tmp, server) = server();
        let result = server
            .delete(Parameters(DeleteParams {
                path: "ghost".into(),
                recursive: false,
            }))
            .await
            .unwrap();
        assert_eq!(parse(&result)["deleted"], false);
    }

    #[tokio::test]
    async fn binary_mode_through_tools() {
        let (_tmp, server) = server();
        server
            .write(Parameters(WriteParams {
                path: "b.bin".into(),
                content: "3q2+7w==".into(),
                mode: Mode::Binary,
                encoding: None,
                append: false,
            }))
            .await
            .unwrap();
        let read = server
            .read(Parameters(ReadParams {
                path: "b.bin".into(),
                mode: Mode::Binary,
                encoding: None,
            }))
            .await
            .unwrap();
        let read = parse(&read);
        assert_eq!(read["content"], "3q2+7w==");
        assert_eq!(read["mode"], "binary");
    }

    #[test]
    fn params_defaults() {
        let mkdir: MkdirParams = serde_json::from_value(json!({"path": "d"})).unwrap();
        assert!(mkdir.exist_ok);
        let list: ListParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(list.path, ".");
        let read: ReadParams = serde_json::from_value(json!({"path": "f"})).unwrap();
        assert!(matches!(read.mode, Mode::Text));
    }

    #[test]
    fn server_info() {
        let (_tmp, server) = server();
        let info = server.get_info();
        assert_eq!(info.server_info.name, "dl-mcp");
        assert!(info.instructions.unwrap().starts_with("search liefert"));
    }
}
