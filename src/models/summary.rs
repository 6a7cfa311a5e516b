use serde::{Deserialize, Serialize};

/// One paper extracted from a search session's output directory.
///
/// Summaries are written in bulk when a search run is ingested and are never
/// modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Summary {
    pub id: String,
    /// The session this paper belongs to.
    pub query_id: String,
    pub title: String,
    /// Author line as written by the worker, or `"Unknown"`.
    pub authors: String,
    /// Location of the artifact the summary was read from.
    pub file_path: String,
    /// Full markdown text of the artifact.
    pub content: String,
}
