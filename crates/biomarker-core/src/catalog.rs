//! Report catalog
//!
//! A closed namespace of report tools looked up by name. Names are opaque:
//! nothing in the core parses them for meaning.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::EvalError;
use crate::patient::PatientId;

/// A generator of one natural-language report per patient
#[async_trait]
pub trait ReportTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Produce the report. Errors are turned into sentinel text by the catalog.
    async fn report(&self, patient_id: &PatientId) -> Result<String>;
}

/// Adapter registering a plain function as a report tool
pub struct FnReportTool<F> {
    name: String,
    func: F,
}

impl<F> FnReportTool<F>
where
    F: Fn(&PatientId) -> String + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> ReportTool for FnReportTool<F>
where
    F: Fn(&PatientId) -> String + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn report(&self, patient_id: &PatientId) -> Result<String> {
        Ok((self.func)(patient_id))
    }
}

/// A tool handed out by [`ReportCatalog::resolve`]. Never fails.
#[derive(Clone)]
pub struct CatalogTool {
    tool: Arc<dyn ReportTool>,
}

impl CatalogTool {
    pub fn name(&self) -> &str {
        self.tool.name()
    }

    pub async fn report(&self, patient_id: &PatientId) -> String {
        match self.tool.report(patient_id).await {
            Ok(text) => text,
            Err(e) => {
                debug!("Tool {} failed for {}: {}", self.tool.name(), patient_id, e);
                format!(
                    "Error: {} failed for patient {}: {}",
                    self.tool.name(),
                    patient_id,
                    e
                )
            }
        }
    }
}

/// Registry of report tools
pub struct ReportCatalog {
    tools: HashMap<String, Arc<dyn ReportTool>>,
}

impl ReportCatalog {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. The first registration of a name wins.
    pub fn register(&mut self, tool: Arc<dyn ReportTool>) -> bool {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            warn!("Report tool {} already registered, keeping the first one", name);
            return false;
        }
        self.tools.insert(name, tool);
        true
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F) -> bool
    where
        F: Fn(&PatientId) -> String + Send + Sync + 'static,
    {
        self.register(Arc::new(FnReportTool::new(name, func)))
    }

    pub fn resolve(&self, name: &str) -> Result<CatalogTool, EvalError> {
        self.tools
            .get(name)
            .map(|tool| CatalogTool { tool: tool.clone() })
            .ok_or_else(|| EvalError::UnknownTool(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Generate tool descriptions for an outer search prompt
    pub fn generate_description(&self) -> String {
        if self.tools.is_empty() {
            return "No report tools available.".to_string();
        }

        let mut desc = String::from("Available report tools:\n\n");
        for name in self.names() {
            let description = self.tools[name].description();
            if description.is_empty() {
                desc.push_str(&format!("- {}\n", name));
            } else {
                desc.push_str(&format!("- {}: {}\n", name, description));
            }
        }
        desc
    }
}

impl Default for ReportCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingTool;

    #[async_trait]
    impl ReportTool for FailingTool {
        fn name(&self) -> &str {
            "load_broken_report"
        }

        async fn report(&self, _patient_id: &PatientId) -> Result<String> {
            anyhow::bail!("bucket unreachable")
        }
    }

    #[test]
    fn test_resolve_unknown_tool() {
        let catalog = ReportCatalog::new();
        let err = catalog.resolve("load_missing_report").err().unwrap();
        assert!(matches!(err, EvalError::UnknownTool(name) if name == "load_missing_report"));
    }

    #[test]
    fn test_register_fn_and_resolve() {
        let mut catalog = ReportCatalog::new();
        assert!(catalog.register_fn("load_echo_report", |p| format!("report for {}", p)));
        assert!(!catalog.register_fn("load_echo_report", |_| "second".to_string()));

        let tool = catalog.resolve("load_echo_report").unwrap();
        let text = tokio_test::block_on(tool.report(&"P1".into()));
        assert_eq!(text, "report for P1");
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_tool_becomes_sentinel() {
        let mut catalog = ReportCatalog::new();
        catalog.register(Arc::new(FailingTool));

        let text = catalog
            .resolve("load_broken_report")
            .unwrap()
            .report(&"P7".into())
            .await;
        assert!(text.starts_with("Error: load_broken_report failed for patient P7"));
        assert!(text.contains("bucket unreachable"));
    }

    #[test]
    fn test_description_lists_sorted_names() {
        let mut catalog = ReportCatalog::new();
        assert_eq!(catalog.generate_description(), "No report tools available.");
        catalog.register_fn("load_b_report", |_| String::new());
        catalog.register_fn("load_a_report", |_| String::new());
        assert_eq!(
            catalog.generate_description(),
            "Available report tools:\n\n- load_a_report\n- load_b_report\n"
        );
    }
}
