//! Knowledge base: the curated markdown documents that ground generation
//!
//! - `loader` reads the documents into a single `Context`
//! - `ingest` converts Jupyter notebooks into documents
//! - `authoring` builds a document from a guided interview

pub mod authoring;
pub mod ingest;
pub mod loader;

use std::path::PathBuf;

pub use authoring::TopicDraft;
pub use ingest::{ingest_notebook, notebook_to_markdown};
pub use loader::{Context, KnowledgeBaseLoader, KnowledgeDocument};

/// Error type for producing knowledge documents
#[derive(Debug)]
pub enum KnowledgeError {
    /// Reading or writing a file failed
    Io { path: PathBuf, source: std::io::Error },
    /// A notebook could not be decoded
    Notebook { path: PathBuf, source: serde_json::Error },
    /// The path is missing or not a `.ipynb` file
    UnsupportedFile(PathBuf),
    /// A topic name that is not a plain file name
    InvalidSlug(String),
    /// An interactive prompt failed (e.g. no terminal attached)
    Prompt(dialoguer::Error),
}

impl std::fmt::Display for KnowledgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KnowledgeError::Io { path, source } => write!(f, "I/O error on {}: {}", path.display(), source),
            KnowledgeError::Notebook { path, source } => {
                write!(f, "Invalid notebook {}: {}", path.display(), source)
            }
            KnowledgeError::UnsupportedFile(path) => {
                write!(f, "Skipping {}: file not found or not .ipynb", path.display())
            }
            KnowledgeError::InvalidSlug(slug) => {
                write!(f, "Invalid topic name '{}': use a plain file name without path separators", slug)
            }
            KnowledgeError::Prompt(e) => write!(f, "Prompt error: {}", e),
        }
    }
}

impl std::error::Error for KnowledgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KnowledgeError::Io { source, .. } => Some(source),
            KnowledgeError::Notebook { source, .. } => Some(source),
            KnowledgeError::Prompt(e) => Some(e),
            KnowledgeError::UnsupportedFile(_) | KnowledgeError::InvalidSlug(_) => None,
        }
    }
}

impl From<dialoguer::Error> for KnowledgeError {
    fn from(e: dialoguer::Error) -> Self {
        KnowledgeError::Prompt(e)
    }
}
