//! Tools exposed to the outer search agent
//!
//! The agent drives the search by name: it seeds itself from the cache, then
//! evaluates candidate pairs one at a time.

use anyhow::Result;
use async_trait::async_trait;
use biomarker_tools::ToolResult;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::EvalError;
use crate::evaluator::{CohortEvaluator, CohortMode};
use crate::seed::SeedInspector;

#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn args_schema(&self) -> &str;
    async fn execute(&self, args: &HashMap<String, String>) -> Result<ToolResult>;
}

/// Zero-shot fitness of a candidate pair
pub struct EvaluatePairTool {
    evaluator: Arc<CohortEvaluator>,
}

impl EvaluatePairTool {
    pub fn new(evaluator: Arc<CohortEvaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl AgentTool for EvaluatePairTool {
    fn name(&self) -> &str {
        "evaluate_report_pair"
    }

    fn description(&self) -> &str {
        "Evaluate how well two patient reports predict long vs short survival. Returns accuracy, \
         the confusion matrix and the model's reasoning for one example per quadrant. Pairs are \
         ordered and results are cached."
    }

    fn args_schema(&self) -> &str {
        r#"{"tool1": "name of the first report tool", "tool2": "name of the second report tool", "mode": "optional: per-patient, batched or cohort-context"}"#
    }

    async fn execute(&self, args: &HashMap<String, String>) -> Result<ToolResult> {
        let tool1 = args
            .get("tool1")
            .ok_or_else(|| anyhow::anyhow!("'tool1' argument required"))?;
        let tool2 = args
            .get("tool2")
            .ok_or_else(|| anyhow::anyhow!("'tool2' argument required"))?;
        let mode = match args.get("mode") {
            Some(mode) => Some(mode.parse::<CohortMode>().map_err(|e| anyhow::anyhow!(e))?),
            None => None,
        };

        info!("Agent requested evaluation of {} + {}", tool1, tool2);
        match self.evaluator.evaluate(tool1, tool2, mode).await {
            Ok(report) => Ok(ToolResult::success(report)),
            Err(EvalError::UnknownTool(name)) => {
                warn!("Agent asked for unknown report tool {}", name);
                Ok(ToolResult::error(format!(
                    "Unknown report tool '{}'. Available tools:\n{}",
                    name,
                    self.evaluator.catalog().names().join("\n")
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Cache summary the agent reads before proposing candidates
pub struct SeedTool {
    inspector: SeedInspector,
}

impl SeedTool {
    pub fn new(inspector: SeedInspector) -> Self {
        Self { inspector }
    }
}

#[async_trait]
impl AgentTool for SeedTool {
    fn name(&self) -> &str {
        "seed_genetic_algorithm"
    }

    fn description(&self) -> &str {
        "List every report pair evaluated so far, best accuracy first. Call this before \
         proposing new pairs so that nothing is evaluated twice."
    }

    fn args_schema(&self) -> &str {
        "{}"
    }

    async fn execute(&self, _args: &HashMap<String, String>) -> Result<ToolResult> {
        Ok(ToolResult::success(self.inspector.summarize()?))
    }
}

/// Registry of agent tools
pub struct AgentToolRegistry {
    tools: HashMap<String, Arc<dyn AgentTool>>,
}

impl AgentToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Both agent tools wired to one evaluator
    pub fn standard(evaluator: Arc<CohortEvaluator>, inspector: SeedInspector) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SeedTool::new(inspector)));
        registry.register(Arc::new(EvaluatePairTool::new(evaluator)));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn AgentTool>> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub async fn execute(&self, name: &str, args: &HashMap<String, String>) -> ToolResult {
        let Some(tool) = self.get(name) else {
            return ToolResult::error(format!("Unknown agent tool: {}", name));
        };
        match tool.execute(args).await {
            Ok(result) => result,
            Err(e) => ToolResult::error(format!("{} failed: {}", name, e)),
        }
    }

    /// Tool section of the search agent's prompt, tools sorted by name
    pub fn generate_description(&self) -> String {
        if self.tools.is_empty() {
            return "No report pair search tools available.".to_string();
        }

        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();

        let mut desc = format!(
            "Report pair search tools ({}). Each evaluation scores an ordered pair of \
             report tools against the survival ground truth and is cached under \
             <tool1>_<tool2>.\n\n",
            names.len()
        );
        for name in names {
            let tool = &self.tools[name];
            desc.push_str(&format!(
                "- {}\n  Purpose: {}\n  Args: {}\n\n",
                tool.name(),
                tool.description(),
                tool.args_schema()
            ));
        }
        desc
    }
}

impl Default for AgentToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
