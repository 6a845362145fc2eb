//! Searchable in-memory document store.
//!
//! Backs the `search` and `fetch` tools. The store is immutable once built,
//! so it can be shared freely between requests.

use serde::Serialize;
use thiserror::Error;

/// Errors from document lookups.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DocumentError {
    #[error("document not found: {0}")]
    NotFound(String),
}

impl DocumentError {
    /// Stable error code for protocol-level mapping.
    pub fn code(&self) -> &'static str {
        match self {
            DocumentError::NotFound(_) => "not_found",
        }
    }
}

/// A stored document.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub url: String,
    pub text: String,
}

/// One search hit: the document without its body.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResults {
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Serialize)]
pub struct Metadata {
    pub source: String,
}

/// A full document as returned by `fetch`.
#[derive(Debug, Serialize)]
pub struct FetchedDocument {
    pub id: String,
    pub title: String,
    pub text: String,
    pub url: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    source: String,
    documents: Vec<Document>,
}

impl DocumentStore {
    /// A store whose fetched documents report `source` in their metadata.
    pub fn new(source: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            source: source.into(),
            documents,
        }
    }

    /// The built-in demo corpus.
    pub fn demo() -> Self {
        Self::new(
            "demo",
            vec![
                Document {
                    id: "doc-start".into(),
                    title: "Startseite".into(),
                    url: "https://example.local/start".into(),
                    text: "Willkommen auf der DL Landing. Diese Seite zeigt Hero/Text/Links als Blöcke."
                        .into(),
                },
                Document {
                    id: "doc-admin".into(),
                    title: "Admin-Portal".into(),
                    url: "https://example.local/admin".into(),
                    text: "RBAC (OWNER/ADMIN/EDITOR/VIEWER), Audit-Logs, Block-Baukasten.".into(),
                },
            ],
        )
    }

    /// Case-insensitive substring match over title and text, in store order.
    /// The query is used as given, surrounding whitespace included; only
    /// the empty query matches every document.
    pub fn search(&self, query: &str) -> SearchResults {
        let needle = query.to_lowercase();
        let results = self
            .documents
            .iter()
            .filter(|doc| {
                needle.is_empty()
                    || format!("{} {}", doc.title, doc.text)
                        .to_lowercase()
                        .contains(&needle)
            })
            .map(|doc| SearchHit {
                id: doc.id.clone(),
                title: doc.title.clone(),
                url: doc.url.clone(),
            })
            .collect();
        SearchResults { results }
    }

    pub fn fetch(&self, id: &str) -> Result<FetchedDocument, DocumentError> {
        let doc = self
            .documents
            .iter()
            .find(|doc| doc.id == id)
            .ok_or_else(|| DocumentError::NotFound(id.to_string()))?;
        Ok(FetchedDocument {
            id: doc.id.clone(),
            title: doc.title.clone(),
            text: doc.text.clone(),
            url: doc.url.clone(),
            metadata: Metadata {
                source: self.source.clone(),
            },
        })
    }
}
