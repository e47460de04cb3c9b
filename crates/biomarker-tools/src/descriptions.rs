//! Per-patient report documents
//!
//! Two layouts are supported:
//! - `{root}/{subdir}/{patient}_{feature}_description.json`, a JSON object
//!   holding the report text under a family-specific field
//! - `{root}/{subdir}/{patient}*`, a free-text document whose file name
//!   starts with the patient id

use crate::ToolResult;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

/// Where and how one family of description documents is stored
#[derive(Debug, Clone)]
pub struct DescriptionSource {
    /// Root of all report data
    pub root: PathBuf,
    /// Family directory below the root (e.g. "heatmaps/descriptions")
    pub subdir: String,
    /// JSON field carrying the report text ("description" or "summary")
    pub text_field: String,
    /// Optional JSON field with a numeric score shown in the heading
    pub score_field: Option<String>,
    /// Heading prefix (e.g. "Heatmap Description")
    pub title: String,
    /// Noun used in error messages (e.g. "feature", "pathway")
    pub kind: String,
    /// Render the feature name in upper case in the heading
    pub uppercase_feature: bool,
}

impl DescriptionSource {
    pub fn new(
        root: impl Into<PathBuf>,
        subdir: impl Into<String>,
        text_field: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            subdir: subdir.into(),
            text_field: text_field.into(),
            score_field: None,
            title: title.into(),
            kind: "feature".to_string(),
            uppercase_feature: false,
        }
    }

    pub fn with_score_field(mut self, field: impl Into<String>) -> Self {
        self.score_field = Some(field.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn uppercase_feature(mut self) -> Self {
        self.uppercase_feature = true;
        self
    }

    pub fn directory(&self) -> PathBuf {
        self.root.join(&self.subdir)
    }

    pub fn path_for(&self, patient_id: &str, feature: &str) -> PathBuf {
        self.directory()
            .join(format!("{}_{}_description.json", patient_id, feature))
    }
}

/// Load one description document and render it as report text
pub async fn load_description(
    source: &DescriptionSource,
    patient_id: &str,
    feature: &str,
) -> ToolResult {
    let path = source.path_for(patient_id, feature);
    debug!("Loading description {}", path.display());

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ToolResult::error(format!(
                "Error: {} not found for patient {} and {} {}. Path: {}",
                source.title,
                patient_id,
                source.kind,
                feature,
                path.display()
            ));
        }
        Err(e) => {
            return ToolResult::error(format!(
                "Error loading {} for patient {} and {} {}: {}",
                source.title, patient_id, source.kind, feature, e
            ));
        }
    };

    let data: Value = match serde_json::from_str(&content) {
        Ok(data) => data,
        Err(e) => {
            return ToolResult::error(format!(
                "Error loading {} for patient {} and {} {}: {}",
                source.title, patient_id, source.kind, feature, e
            ));
        }
    };

    let fallback = format!("No {} found in the file", source.text_field);
    let text = data
        .get(&source.text_field)
        .and_then(Value::as_str)
        .unwrap_or(&fallback);

    let feature_label = if source.uppercase_feature {
        feature.to_uppercase()
    } else {
        feature.to_string()
    };

    let heading = match &source.score_field {
        Some(field) => {
            let score = match data.get(field) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => "N/A".to_string(),
            };
            format!(
                "{} for {} - {} (Score: {})",
                source.title, patient_id, feature_label, score
            )
        }
        None => format!("{} for {} - {}", source.title, patient_id, feature_label),
    };

    ToolResult::success(format!("{}:\n\n{}", heading, text))
}

/// Load the first document in `{root}/{subdir}` whose file name starts with the patient id
pub async fn load_patient_document(
    source: &DescriptionSource,
    patient_id: &str,
) -> ToolResult {
    let directory = source.directory();

    let mut entries = match tokio::fs::read_dir(&directory).await {
        Ok(entries) => entries,
        Err(e) => {
            return ToolResult::error(format!(
                "Error: {} directory unavailable at {}: {}",
                source.title,
                directory.display(),
                e
            ));
        }
    };

    let mut candidates = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(patient_id) {
            candidates.push(entry.path());
        }
    }
    // read_dir order is platform dependent
    candidates.sort();

    let Some(path) = candidates.into_iter().next() else {
        return ToolResult::error(format!(
            "Error: {} not found for patient {}.",
            source.title, patient_id
        ));
    };

    match tokio::fs::read_to_string(&path).await {
        Ok(content) => ToolResult::success(format!(
            "{} for {}:\n\n{}",
            source.title, patient_id, content
        )),
        Err(e) => ToolResult::error(format!(
            "Error reading {} for patient {}: {}",
            source.title, patient_id, e
        )),
    }
}
