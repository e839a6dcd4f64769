//! Per-enquiry extraction progress records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Extraction progress state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsingState {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ParsingState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Extraction progress for one enquiry, written by the ingestion entry point
/// around the LLM call and served read-only over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingRecord {
    pub enquiry_id: Uuid,
    pub status: ParsingState,
    pub message: Option<String>,
    pub parsed_payload: Option<serde_json::Value>,
    pub error_details: Option<String>,
    pub updated_at: DateTime<Utc>,
}
