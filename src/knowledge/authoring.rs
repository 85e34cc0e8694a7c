//! Guided authoring of knowledge base topics
//!
//! Asks the user for a topic name, title, description and a code example,
//! previews the rendered markdown and saves it on confirmation.

use std::path::{Path, PathBuf};

use dialoguer::{Confirm, Input};
use tracing::info;

use super::KnowledgeError;

/// A knowledge topic assembled from interview answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDraft {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub code: String,
}

impl TopicDraft {
    /// File name for the topic, always ending in `.md`
    pub fn file_name(&self) -> String {
        let slug = self.slug.trim();
        if slug.ends_with(".md") {
            slug.to_string()
        } else {
            format!("{}.md", slug)
        }
    }

    /// Render the topic as a markdown document
    pub fn render(&self) -> String {
        format!(
            "# {}\n\n{}\n\n```python\n{}\n```\n",
            self.title, self.description, self.code
        )
    }

    /// Write the rendered topic into `kb_dir`, creating the directory if needed
    pub fn save(&self, kb_dir: &Path) -> Result<PathBuf, KnowledgeError> {
        validate_slug(&self.slug)?;
        std::fs::create_dir_all(kb_dir).map_err(|e| KnowledgeError::Io {
            path: kb_dir.to_path_buf(),
            source: e,
        })?;
        let path = kb_dir.join(self.file_name());
        std::fs::write(&path, self.render()).map_err(|e| KnowledgeError::Io {
            path: path.clone(),
            source: e,
        })?;
        info!(path = %path.display(), "Knowledge topic saved");
        Ok(path)
    }
}

/// A slug names one file directly inside the knowledge base
pub fn validate_slug(slug: &str) -> Result<(), KnowledgeError> {
    let slug = slug.trim();
    if slug.is_empty() || slug == "." || slug == ".." || slug.contains(['/', '\\']) {
        return Err(KnowledgeError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

/// Read lines until an empty one
fn read_block(prompt: &str) -> Result<String, KnowledgeError> {
    println!("\n{} (press Enter on an empty line to finish):", prompt);
    let mut lines = Vec::new();
    loop {
        let line: String = Input::new()
            .allow_empty(true)
            .interact_text()?;
        if line.is_empty() {
            break;
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

/// Run the interview and save the topic into `kb_dir` if the user confirms.
///
/// Returns the saved path, or `None` when the draft was discarded.
pub fn interview(kb_dir: &Path) -> Result<Option<PathBuf>, KnowledgeError> {
    println!("\n--- yt Agent Knowledge Base Builder ---");
    println!("A few questions will build a new topic for the agent.");

    let slug: String = Input::new()
        .with_prompt("Topic/Filename (e.g. 'phase_plots')")
        .validate_with(|input: &String| validate_slug(input).map_err(|e| e.to_string()))
        .interact_text()?;
    let title: String = Input::new()
        .with_prompt("Title of this topic (e.g. 'Creating Phase Plots')")
        .interact_text()?;
    let description = read_block("Description")?;
    let code = read_block("Code example")?;

    let draft = TopicDraft {
        slug,
        title,
        description,
        code,
    };

    println!("\nPreview of {}:\n", draft.file_name());
    println!("--------------------------------------------------");
    println!("{}", draft.render());
    println!("--------------------------------------------------");

    let save = Confirm::new()
        .with_prompt("Save this file?")
        .default(false)
        .interact()?;

    if save {
        let path = draft.save(kb_dir)?;
        println!("Saved to {}", path.display());
        Ok(Some(path))
    } else {
        println!("Discarded.");
        Ok(None)
    }
}
