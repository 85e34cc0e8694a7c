//! Knowledge base loading
//!
//! Reads every markdown document in a directory (non-recursive) and joins
//! them into one `Context` string. Documents are ordered by file name so the
//! resulting text, and therefore its content hash, is reproducible.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// A single markdown document read from the knowledge base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeDocument {
    /// File name, e.g. `phase_plots.md`
    pub name: String,
    pub content: String,
}

impl KnowledgeDocument {
    /// Render the document with its provenance header
    fn render(&self) -> String {
        format!("--- Context from {} ---\n{}\n", self.name, self.content)
    }
}

/// Concatenated knowledge base text supplied to the model for grounding
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Context(String);

impl Context {
    /// Wrap an already-assembled context string
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Join documents in the order given, each preceded by its header
    pub fn from_documents(documents: &[KnowledgeDocument]) -> Self {
        let parts: Vec<String> = documents.iter().map(KnowledgeDocument::render).collect();
        Self(parts.join("\n"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Length in characters (not bytes)
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }
}

impl std::fmt::Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads markdown documents from a fixed directory
#[derive(Debug, Clone)]
pub struct KnowledgeBaseLoader {
    dir: PathBuf,
}

impl KnowledgeBaseLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every document, sorted by file name.
    ///
    /// A missing directory yields no documents; an unreadable file is skipped
    /// with a warning.
    pub fn documents(&self) -> Vec<KnowledgeDocument> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Knowledge base not found, continuing without context");
                return Vec::new();
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "Failed to read directory entry");
                    None
                }
            })
            .filter(|path| path.is_file() && path.extension().map(|e| e == "md").unwrap_or(false))
            .collect();
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match std::fs::read_to_string(&path) {
                Ok(content) => documents.push(KnowledgeDocument { name, content }),
                Err(e) => warn!(file = %path.display(), error = %e, "Failed to read knowledge document, skipping"),
            }
        }

        debug!(dir = %self.dir.display(), documents = documents.len(), "Knowledge base loaded");
        documents
    }

    /// Load the directory into a single context string
    pub fn load(&self) -> Context {
        Context::from_documents(&self.documents())
    }
}
