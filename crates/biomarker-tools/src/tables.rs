//! Whole-cohort report tables
//!
//! A table is a single JSON object mapping patient ids to reports. Non-string
//! values are rendered as pretty JSON.

use crate::ToolResult;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Failed to read report table {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Report table {path} is not a JSON object: {message}")]
    Format { path: PathBuf, message: String },
}

#[derive(Debug, Clone)]
pub struct ReportTable {
    path: PathBuf,
    reports: HashMap<String, String>,
}

impl ReportTable {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref().to_path_buf();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| TableError::Io {
                path: path.clone(),
                source,
            })?;
        let table = Self::from_json(&path, &content)?;
        info!("Loaded {} reports from {}", table.len(), path.display());
        Ok(table)
    }

    fn from_json(path: &Path, content: &str) -> Result<Self, TableError> {
        let value: Value = serde_json::from_str(content).map_err(|e| TableError::Format {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let Value::Object(map) = value else {
            return Err(TableError::Format {
                path: path.to_path_buf(),
                message: "top-level value must be an object".to_string(),
            });
        };

        let reports = map
            .into_iter()
            .map(|(patient, report)| {
                let text = match report {
                    Value::String(s) => s,
                    other => serde_json::to_string_pretty(&other).unwrap_or_default(),
                };
                (patient, text)
            })
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            reports,
        })
    }

    pub fn get(&self, patient_id: &str) -> ToolResult {
        match self.reports.get(patient_id) {
            Some(report) => ToolResult::success(report.clone()),
            None => ToolResult::error(format!(
                "Error: Patient {} not found in {}",
                patient_id,
                self.path.display()
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup() {
        let table = ReportTable::from_json(
            Path::new("clinical.json"),
            r#"{"MW_B_001": "Age 71, former smoker.", "MW_B_002": {"stage": "T2"}}"#,
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("MW_B_001").output, "Age 71, former smoker.");
        assert!(table.get("MW_B_002").output.contains("\"stage\": \"T2\""));

        let missing = table.get("MW_B_404");
        assert!(!missing.success);
        assert!(missing.into_text().contains("Patient MW_B_404 not found"));
    }

    #[test]
    fn test_rejects_non_object() {
        let err = ReportTable::from_json(Path::new("bad.json"), "[1, 2]").unwrap_err();
        assert!(matches!(err, TableError::Format { .. }));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clinical.json");
        std::fs::write(&path, r#"{"P1": "report"}"#).unwrap();

        let table = tokio_test::block_on(ReportTable::load(&path)).unwrap();
        assert_eq!(table.get("P1").output, "report");

        let missing = tokio_test::block_on(ReportTable::load(dir.path().join("nope.json")));
        assert!(matches!(missing, Err(TableError::Io { .. })));
    }
}
