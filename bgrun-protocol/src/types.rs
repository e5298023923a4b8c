//! JSON value types carried by the control protocol and the tombstone file

use serde::{Deserialize, Serialize};

/// Process status, as returned by STATUS and persisted in `status.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub pid: i32,
    pub running: bool,
    pub exit_code: Option<i32>,
    pub started_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    pub command: Vec<String>,
    pub has_vty: bool,
}

/// Rendered terminal viewport, as returned by GET_SCREEN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenSnapshot {
    pub rows: usize,
    pub cols: usize,
    pub cursor_row: usize,
    pub cursor_col: usize,
    pub lines: Vec<String>,
}

/// Terminal export output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Text,
    Markdown,
    Html,
}

fn default_end_line() -> i32 {
    -1
}

/// EXPORT request payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub format: ExportFormat,
    #[serde(default)]
    pub include_scrollback: bool,
    #[serde(default)]
    pub start_line: i32,
    #[serde(default = "default_end_line")]
    pub end_line: i32,
    #[serde(default)]
    pub preserve_trailing_spaces: bool,
}

impl ExportRequest {
    /// Request covering the whole selection in the given format
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            include_scrollback: false,
            start_line: 0,
            end_line: -1,
            preserve_trailing_spaces: false,
        }
    }
}

/// EXPORT_RESPONSE payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResult {
    pub format: ExportFormat,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_report_roundtrip() {
        let status = StatusReport {
            pid: 4321,
            running: false,
            exit_code: Some(42),
            started_at: "2025-01-01T00:00:00Z".to_string(),
            ended_at: Some("2025-01-01T00:00:05Z".to_string()),
            command: vec!["sleep".to_string(), "5".to_string()],
            has_vty: false,
        };

        let json = serde_json::to_string(&status).unwrap();
        let parsed: StatusReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, status);
    }

    #[test]
    fn test_status_report_running_omits_ended_at() {
        let status = StatusReport {
            pid: 1,
            running: true,
            exit_code: None,
            started_at: "2025-01-01T00:00:00Z".to_string(),
            ended_at: None,
            command: vec!["cat".to_string()],
            has_vty: true,
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("ended_at"));
        assert!(json.contains("\"exit_code\":null"));

        let parsed: StatusReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.ended_at, None);
    }

    #[test]
    fn test_export_format_strings() {
        assert_eq!(
            serde_json::to_string(&ExportFormat::Text).unwrap(),
            "\"text\""
        );
        assert_eq!(
            serde_json::to_string(&ExportFormat::Markdown).unwrap(),
            "\"markdown\""
        );
        assert_eq!(
            serde_json::to_string(&ExportFormat::Html).unwrap(),
            "\"html\""
        );
    }

    #[test]
    fn test_export_request_defaults() {
        let req: ExportRequest = serde_json::from_str(r#"{"format":"markdown"}"#).unwrap();
        assert_eq!(req.format, ExportFormat::Markdown);
        assert!(!req.include_scrollback);
        assert_eq!(req.start_line, 0);
        assert_eq!(req.end_line, -1);
        assert!(!req.preserve_trailing_spaces);
    }

    #[test]
    fn test_screen_snapshot_roundtrip() {
        let snap = ScreenSnapshot {
            rows: 24,
            cols: 80,
            cursor_row: 3,
            cursor_col: 7,
            lines: vec!["hello".to_string(); 24],
        };
        let json = serde_json::to_vec(&snap).unwrap();
        let parsed: ScreenSnapshot = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed, snap);
    }
}
