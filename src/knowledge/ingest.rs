//! Jupyter notebook ingestion
//!
//! Converts `.ipynb` files into markdown knowledge documents: markdown cells
//! are kept verbatim, code cells become fenced Python blocks.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use super::KnowledgeError;

#[derive(Debug, Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    #[serde(default)]
    cell_type: String,
    #[serde(default)]
    source: CellSource,
}

/// nbformat allows the source as either a list of lines or a single string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CellSource {
    Lines(Vec<String>),
    Text(String),
}

impl Default for CellSource {
    fn default() -> Self {
        CellSource::Text(String::new())
    }
}

impl CellSource {
    fn joined(&self) -> String {
        match self {
            CellSource::Lines(lines) => lines.concat(),
            CellSource::Text(text) => text.clone(),
        }
    }
}

/// Capitalize the first letter of every alphabetic run, lowercase the rest
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
        } else {
            out.push(c);
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

/// Render notebook JSON as a markdown document titled after `stem`
pub fn notebook_to_markdown(stem: &str, notebook_json: &str) -> Result<String, serde_json::Error> {
    let notebook: Notebook = serde_json::from_str(notebook_json)?;

    let mut lines = vec![format!(
        "# {} (Imported from Notebook)\n",
        title_case(&stem.replace('_', " "))
    )];

    for cell in &notebook.cells {
        let source = cell.source.joined();
        if source.trim().is_empty() {
            continue;
        }
        match cell.cell_type.as_str() {
            "markdown" => {
                lines.push(source);
                lines.push("\n".to_string());
            }
            "code" => {
                lines.push("```python".to_string());
                lines.push(source);
                lines.push("```\n".to_string());
            }
            _ => {}
        }
    }

    Ok(lines.join("\n"))
}

/// Convert one notebook into `{stem}.md` inside `output_dir`.
///
/// Returns the path of the written document.
pub fn ingest_notebook(notebook_path: &Path, output_dir: &Path) -> Result<PathBuf, KnowledgeError> {
    if notebook_path.extension().map(|e| e != "ipynb").unwrap_or(true) || !notebook_path.is_file() {
        return Err(KnowledgeError::UnsupportedFile(notebook_path.to_path_buf()));
    }

    let raw = std::fs::read_to_string(notebook_path).map_err(|e| KnowledgeError::Io {
        path: notebook_path.to_path_buf(),
        source: e,
    })?;

    let stem = notebook_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let markdown = notebook_to_markdown(&stem, &raw).map_err(|e| KnowledgeError::Notebook {
        path: notebook_path.to_path_buf(),
        source: e,
    })?;

    std::fs::create_dir_all(output_dir).map_err(|e| KnowledgeError::Io {
        path: output_dir.to_path_buf(),
        source: e,
    })?;

    let output_path = output_dir.join(format!("{}.md", stem));
    std::fs::write(&output_path, markdown).map_err(|e| KnowledgeError::Io {
        path: output_path.clone(),
        source: e,
    })?;

    info!(notebook = %notebook_path.display(), output = %output_path.display(), "Notebook ingested");
    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTEBOOK: &str = r###"{
        "cells": [
            {"cell_type": "markdown", "source": ["## Slices\n", "Make a slice."]},
            {"cell_type": "code", "source": ["import yt\n", "ds = yt.load('x')"]},
            {"cell_type": "code", "source": ["   \n"]},
            {"cell_type": "raw", "source": "ignored"}
        ],
        "nbformat": 4
    }"###;

    #[test]
    fn test_notebook_to_markdown() {
        let md = notebook_to_markdown("slice_plots", NOTEBOOK).unwrap();
        assert_eq!(
            md,
            "# Slice Plots (Imported from Notebook)\n\n## Slices\nMake a slice.\n\n\n```python\nimport yt\nds = yt.load('x')\n```\n"
        );
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("phase plots"), "Phase Plots");
        assert_eq!(title_case("HELLO world2go"), "Hello World2Go");
    }

    #[test]
    fn test_ingest_writes_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let nb = dir.path().join("volume_render.ipynb");
        std::fs::write(&nb, NOTEBOOK).unwrap();
        let kb = dir.path().join("kb");

        let out = ingest_notebook(&nb, &kb).unwrap();
        assert_eq!(out, kb.join("volume_render.md"));
        let written = std::fs::read_to_string(out).unwrap();
        assert!(written.starts_with("# Volume Render (Imported from Notebook)"));
    }

    #[test]
    fn test_ingest_rejects_non_notebooks() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "x").unwrap();

        assert!(matches!(
            ingest_notebook(&txt, dir.path()),
            Err(KnowledgeError::UnsupportedFile(_))
        ));
        assert!(matches!(
            ingest_notebook(&dir.path().join("missing.ipynb"), dir.path()),
            Err(KnowledgeError::UnsupportedFile(_))
        ));
    }

    #[test]
    fn test_ingest_reports_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let nb = dir.path().join("broken.ipynb");
        std::fs::write(&nb, "{not json").unwrap();

        assert!(matches!(
            ingest_notebook(&nb, dir.path()),
            Err(KnowledgeError::Notebook { .. })
        ));
    }
}
