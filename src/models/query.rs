use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One research search session and its lifecycle state.
///
/// A query is created in [`QueryStatus::Processing`] when a search starts and
/// only the session lifecycle manager moves it afterwards. Queries are never
/// deleted by the service; output directories and rows are retained until an
/// operator removes them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Query {
    /// Opaque session token (v4 UUID rendered as text).
    pub id: String,
    /// Free-form research topic.
    pub query: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub status: QueryStatus,
    /// Number of papers requested from the search backend.
    pub num_papers: u32,
    /// Summarization backend the external worker should use.
    pub provider: String,
}

/// The status of a search session.
///
/// ```text
/// processing ──► completed ──► analyzing ──► completed
///     │                            │
///     └──────► failed ◄────────────┘
/// ```
///
/// `Failed` is terminal; a new session must be created to retry. Nothing
/// ever returns to `Processing`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Processing,
    Analyzing,
    Completed,
    Failed,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "processing" => Some(Self::Processing),
            "analyzing" => Some(Self::Analyzing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether a background workflow may still change this status.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Processing | Self::Analyzing)
    }

    /// Whether `self -> next` is an edge of the session state machine.
    pub fn can_transition_to(&self, next: QueryStatus) -> bool {
        use QueryStatus::*;
        matches!(
            (self, next),
            (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Analyzing)
                | (Analyzing, Completed)
                | (Analyzing, Failed)
        )
    }
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a search request, as forwarded to the external worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default = "default_num_results")]
    pub num_results: u32,
    #[serde(default)]
    pub sort_by_date: bool,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_full_text")]
    pub full_text: bool,
}

fn default_num_results() -> u32 {
    3
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_full_text() -> bool {
    true
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            num_results: default_num_results(),
            sort_by_date: false,
            provider: default_provider(),
            full_text: default_full_text(),
        }
    }
}

/// Input for inserting a new query row.
#[derive(Debug, Clone)]
pub struct CreateQueryInput {
    pub query: String,
    pub num_papers: u32,
    pub provider: String,
}

impl From<&SearchParams> for CreateQueryInput {
    fn from(params: &SearchParams) -> Self {
        Self {
            query: params.query.clone(),
            num_papers: params.num_results,
            provider: params.provider.clone(),
        }
    }
}

/// Result of asking the store to move a query to a new status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The status was changed; carries the updated query.
    Applied(Query),
    /// No query has this id.
    NotFound,
    /// The edge is not part of the state machine; carries the current status.
    Rejected(QueryStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [QueryStatus; 4] = [
        QueryStatus::Processing,
        QueryStatus::Analyzing,
        QueryStatus::Completed,
        QueryStatus::Failed,
    ];

    #[test]
    fn status_round_trips_through_its_storage_name() {
        for status in ALL {
            assert_eq!(QueryStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(QueryStatus::from_str("active"), None);
    }

    #[test]
    fn failed_is_terminal() {
        for next in ALL {
            assert!(!QueryStatus::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn nothing_returns_to_processing() {
        for from in ALL {
            assert!(!from.can_transition_to(QueryStatus::Processing));
        }
    }

    #[test]
    fn analysis_only_starts_from_completed() {
        assert!(QueryStatus::Completed.can_transition_to(QueryStatus::Analyzing));
        assert!(!QueryStatus::Processing.can_transition_to(QueryStatus::Analyzing));
        assert!(!QueryStatus::Analyzing.can_transition_to(QueryStatus::Analyzing));
    }

    #[test]
    fn search_request_defaults_match_the_public_api() {
        let params: SearchParams = serde_json::from_str(r#"{"query":"graph neural networks"}"#).unwrap();
        assert_eq!(params.num_results, 3);
        assert!(!params.sort_by_date);
        assert_eq!(params.provider, "deepseek");
        assert!(params.full_text);
    }

    #[test]
    fn created_at_is_serialized_as_timestamp() {
        let query = Query {
            id: "abc".to_string(),
            query: "topic".to_string(),
            created_at: Utc::now(),
            status: QueryStatus::Processing,
            num_papers: 3,
            provider: "deepseek".to_string(),
        };
        let value = serde_json::to_value(&query).unwrap();
        assert!(value.get("timestamp").is_some());
        assert_eq!(value["status"], "processing");
    }
}
