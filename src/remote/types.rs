//! DTOs for Cloudflare API responses.

use serde_json::Value;

/// Standard `{success, errors, result}` envelope.
#[derive(Debug, serde::Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,

    #[serde(default)]
    pub errors: Vec<ApiError>,

    pub result: Option<T>,

    #[serde(default)]
    pub result_info: Option<ResultInfo>,
}

impl<T> ApiEnvelope<T> {
    pub fn error_summary(&self) -> String {
        summarize_errors(&self.errors)
    }
}

pub(super) fn summarize_errors(errors: &[ApiError]) -> String {
    if errors.is_empty() {
        return "unknown error".to_string();
    }
    errors
        .iter()
        .map(|e| format!("{}: {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ApiError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct ResultInfo {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ApiNamespace {
    pub id: String,
    pub title: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ApiKey {
    pub name: String,

    #[serde(default)]
    pub expiration: Option<i64>,

    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Error list of a failed response, whatever its `result` shape.
#[derive(Debug, Default, serde::Deserialize)]
pub(super) struct ErrorBody {
    #[serde(default)]
    pub(super) errors: Vec<ApiError>,
}
