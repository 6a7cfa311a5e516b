use serde::{Deserialize, Serialize};

/// Request body for starting a comparative analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub session_id: String,
}

/// Acknowledgement that an analysis was started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub message: String,
    pub session_id: String,
}

/// State of a session's comparative analysis file.
///
/// Serialized as `{"status": "pending"}` or
/// `{"status": "completed", "content": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisResponse {
    Pending,
    Completed { content: String },
}
