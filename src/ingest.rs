//! Turns the files a search run wrote into [`Summary`] records.
//!
//! The worker writes one markdown file per paper into the session's output
//! directory, plus metadata files whose names start with `_`
//! (`_session_info.json`, `_comparative_analysis.md`, ...). Only the paper
//! files become summaries.
//!
//! Directory handling lives in [`ingest`]; the markdown scraping lives in
//! [`parse_artifact`] and only ever sees raw text.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::models::Summary;

/// File names starting with this are session metadata, not papers.
pub const RESERVED_PREFIX: &str = "_";

/// Name of the analysis file the worker writes on `analyze`.
pub const ANALYSIS_FILE: &str = "_comparative_analysis.md";

const AUTHORS_MARKER: &str = "**Authors:**";
const UNKNOWN: &str = "Unknown";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cannot list output directory {}: {source}", path.display())]
    ListDirectory { path: PathBuf, source: io::Error },

    #[error("cannot read artifact {}: {source}", path.display())]
    ReadArtifact { path: PathBuf, source: io::Error },

    #[error("artifact {} is not UTF-8 text", path.display())]
    NotText { path: PathBuf },
}

/// Metadata scraped from one result artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMeta {
    pub title: String,
    pub authors: String,
}

/// Extract title and authors from a paper's markdown.
///
/// The title is the first line with one leading `#` heading marker removed.
/// The authors are whatever follows `**Authors:**` on the first line that
/// starts with it.
pub fn parse_artifact(text: &str) -> ArtifactMeta {
    let title = text
        .lines()
        .next()
        .map(|first| {
            let first = first.trim();
            first.strip_prefix('#').unwrap_or(first).trim().to_string()
        })
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string());

    let authors = text
        .lines()
        .find_map(|line| line.strip_prefix(AUTHORS_MARKER))
        .map(|rest| rest.trim().to_string())
        .unwrap_or_else(|| UNKNOWN.to_string());

    ArtifactMeta { title, authors }
}

/// Read every paper artifact in `output_dir` into a summary for `session_id`.
///
/// One unreadable or non-text artifact fails the whole call; nothing is
/// returned for the other files in that case. Order follows directory
/// enumeration and is not stable across platforms.
pub fn ingest(output_dir: &Path, session_id: &str) -> Result<Vec<Summary>, IngestError> {
    let entries = fs::read_dir(output_dir).map_err(|source| IngestError::ListDirectory {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let mut summaries = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|source| IngestError::ListDirectory {
            path: output_dir.to_path_buf(),
            source,
        })?;

        if entry.file_name().to_string_lossy().starts_with(RESERVED_PREFIX) {
            continue;
        }

        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|source| IngestError::ReadArtifact {
                path: path.clone(),
                source,
            })?;
        if file_type.is_dir() {
            tracing::debug!("Skipping directory {}", path.display());
            continue;
        }

        let content = read_text(&path)?;
        let meta = parse_artifact(&content);

        summaries.push(Summary {
            id: Uuid::new_v4().to_string(),
            query_id: session_id.to_string(),
            title: meta.title,
            authors: meta.authors,
            file_path: path.to_string_lossy().into_owned(),
            content,
        });
    }

    tracing::debug!(
        "Ingested {} artifact(s) from {}",
        summaries.len(),
        output_dir.display()
    );
    Ok(summaries)
}

fn read_text(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path).map_err(|source| IngestError::ReadArtifact {
        path: path.to_path_buf(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|_| IngestError::NotText {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_title_and_authors() {
        let meta = parse_artifact("# Paper One\n\n**Authors:** Jane Doe\n\nBody text.");
        assert_eq!(meta.title, "Paper One");
        assert_eq!(meta.authors, "Jane Doe");
    }

    #[test]
    fn missing_authors_line_is_unknown() {
        let meta = parse_artifact("# Lonely Paper\n\nNo author line here.");
        assert_eq!(meta.authors, "Unknown");
    }

    #[test]
    fn authors_marker_must_start_the_line() {
        let meta = parse_artifact("# T\nSee **Authors:** below\n**Authors:**   A. Smith, B. Jones  \n");
        assert_eq!(meta.authors, "A. Smith, B. Jones");
    }

    #[test]
    fn only_one_heading_marker_is_stripped() {
        assert_eq!(parse_artifact("## Section").title, "# Section");
        assert_eq!(parse_artifact("#Tight").title, "Tight");
        assert_eq!(parse_artifact("Plain title\n").title, "Plain title");
    }

    #[test]
    fn windows_line_endings_are_tolerated() {
        let meta = parse_artifact("# Paper\r\n**Authors:** Jane Doe\r\n");
        assert_eq!(meta.title, "Paper");
        assert_eq!(meta.authors, "Jane Doe");
    }

    #[test]
    fn empty_text_has_unknown_fields() {
        let meta = parse_artifact("");
        assert_eq!(meta.title, "Unknown");
        assert_eq!(meta.authors, "Unknown");
    }

    #[test]
    fn ingest_reads_one_paper() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# Paper One\n**Authors:** Jane Doe\n").unwrap();

        let summaries = ingest(dir.path(), "session-1").unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].title, "Paper One");
        assert_eq!(summaries[0].authors, "Jane Doe");
        assert_eq!(summaries[0].query_id, "session-1");
        assert!(summaries[0].file_path.ends_with("a.md"));
        assert!(summaries[0].content.contains("**Authors:**"));
    }

    #[test]
    fn ingest_skips_reserved_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("_session_info.json"), "{}").unwrap();
        fs::write(dir.path().join(ANALYSIS_FILE), "# Analysis").unwrap();
        fs::write(dir.path().join("paper1.md"), "# P1").unwrap();
        fs::create_dir(dir.path().join("pdfs")).unwrap();

        let summaries = ingest(dir.path(), "s").unwrap();

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].title, "P1");
    }

    #[test]
    fn ingest_assigns_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# A").unwrap();
        fs::write(dir.path().join("b.md"), "# B").unwrap();

        let summaries = ingest(dir.path(), "s").unwrap();

        assert_eq!(summaries.len(), 2);
        assert_ne!(summaries[0].id, summaries[1].id);
    }

    #[test]
    fn ingest_fails_on_binary_artifact() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "# A").unwrap();
        fs::write(dir.path().join("b.pdf"), [0xff, 0xfe, 0x00, 0x81]).unwrap();

        let err = ingest(dir.path(), "s").unwrap_err();
        assert!(matches!(err, IngestError::NotText { .. }));
    }

    #[test]
    fn ingest_fails_on_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = ingest(&dir.path().join("nope"), "s").unwrap_err();
        assert!(matches!(err, IngestError::ListDirectory { .. }));
    }
}
