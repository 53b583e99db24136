//! Request and response bodies exchanged over HTTP.

use arias_telemetry::MetricsSnapshot;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /download`. Every field is optional on the wire so that
/// policy, not deserialisation, decides what a missing field means.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadBody {
    /// Location to download.
    pub url: Option<String>,
    /// Target bucket; the configured default when absent.
    pub bucket: Option<String>,
    /// Object key template (`{filename}`, `{name}`, `{ext}`).
    pub name: Option<String>,
    /// URL notified with the terminal task status.
    pub callback: Option<String>,
}

/// Body returned when a download is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Identifier to poll with `GET /status/{id}`.
    pub id: Uuid,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    /// Always `ok`; unhealthy states answer with a problem document instead.
    pub status: &'static str,
    /// Build identifier reported by telemetry.
    pub build: String,
    /// Task counters at the time of the request.
    pub tasks: MetricsSnapshot,
}

/// RFC 9457 problem document returned for every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    /// URI reference identifying the problem type.
    pub kind: String,
    /// Short, human-readable summary of the issue.
    pub title: String,
    /// HTTP status code associated with the error.
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Detailed diagnostic message when available.
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn download_body_tolerates_missing_fields() -> Result<(), serde_json::Error> {
        let body: DownloadBody = serde_json::from_value(json!({"url": "https://e.com/a"}))?;
        assert_eq!(body.url.as_deref(), Some("https://e.com/a"));
        assert_eq!(body.bucket, None);
        assert_eq!(serde_json::from_value::<DownloadBody>(json!({}))?, DownloadBody::default());
        Ok(())
    }

    #[test]
    fn problem_omits_missing_detail() -> Result<(), serde_json::Error> {
        let problem = ProblemDetails {
            kind: "/problems/not-found".to_string(),
            title: "resource not found".to_string(),
            status: 404,
            detail: None,
        };
        assert_eq!(
            serde_json::to_value(&problem)?,
            json!({"type": "/problems/not-found", "title": "resource not found", "status": 404})
        );
        Ok(())
    }
}
