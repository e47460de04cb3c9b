//! Biomarker Tools - report loaders consumed by the evaluation core
//!
//! Loaders are organized by storage layout:
//! - descriptions: one JSON description document per patient and feature,
//!   plus free-text documents found by patient prefix
//! - tables: one JSON document mapping every patient of a cohort to a report

pub mod descriptions;
pub mod tables;

use serde::{Deserialize, Serialize};

pub use descriptions::{load_description, load_patient_document, DescriptionSource};
pub use tables::{ReportTable, TableError};

/// Tool execution result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }

    /// Collapse into the text handed to a prompt.
    ///
    /// Failures become an `Error: ...` sentinel instead of being dropped, so a
    /// missing report still shows up in the patient's prompt.
    pub fn into_text(self) -> String {
        if self.success {
            self.output
        } else {
            let error = self.error.unwrap_or_else(|| "Unknown error".to_string());
            if error.starts_with("Error:") {
                error
            } else {
                format!("Error: {}", error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_text() {
        assert_eq!(ToolResult::success("report").into_text(), "report");
    }

    #[test]
    fn test_error_text_gets_sentinel_prefix() {
        assert_eq!(
            ToolResult::error("disk on fire").into_text(),
            "Error: disk on fire"
        );
        assert_eq!(
            ToolResult::error("Error: already prefixed").into_text(),
            "Error: already prefixed"
        );
    }

    #[test]
    fn test_serializes_for_agent_transcripts() {
        let json = serde_json::to_value(ToolResult::error("missing")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "missing");
    }
}
