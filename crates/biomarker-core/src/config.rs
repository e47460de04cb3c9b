use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::evaluator::{CohortMode, EvaluatorSettings};
use crate::llm::{ChatCompletionsBackend, CompletionBackend, PredictEndpointBackend};
use crate::patient::{AliasResolver, IdentifierResolver, IdentityResolver, Side};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendKind {
    /// OpenAI-compatible chat completions
    OpenAi,
    /// `instances`/`predictions` endpoint
    Predict,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub llm_backend: BackendKind,
    pub llm_api_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_timeout: Duration,
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,

    pub batch_size: usize,
    pub default_mode: CohortMode,

    pub ground_truth_path: PathBuf,
    pub reports_dir: PathBuf,
    pub cache_path: PathBuf,
    /// Optional `{spatial_id: cohort_id}` table for heatmap reports
    pub id_aliases_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            llm_backend: match or("LLM_BACKEND", "openai").to_lowercase().as_str() {
                "predict" => BackendKind::Predict,
                "openai" => BackendKind::OpenAi,
                other => anyhow::bail!("LLM_BACKEND must be openai or predict, got {}", other),
            },
            llm_api_url: or("LLM_API_URL", "http://localhost:8080/v1"),
            llm_api_key: var("LLM_API_KEY").filter(|k| !k.is_empty()),
            llm_model: or("LLM_MODEL", "medgemma-27b"),
            llm_timeout: Duration::from_secs(
                or("LLM_TIMEOUT_SECS", "120")
                    .parse()
                    .context("LLM_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            llm_max_tokens: or("LLM_MAX_TOKENS", "2000")
                .parse()
                .context("LLM_MAX_TOKENS must be a positive integer")?,
            llm_temperature: or("LLM_TEMPERATURE", "0.0")
                .parse()
                .context("LLM_TEMPERATURE must be a number")?,

            batch_size: or("EVAL_BATCH_SIZE", "10")
                .parse()
                .context("EVAL_BATCH_SIZE must be a positive integer")?,
            default_mode: or("EVAL_MODE", "cohort-context")
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("EVAL_MODE is invalid")?,

            ground_truth_path: or("GROUND_TRUTH_PATH", "data/ground_truth.json").into(),
            reports_dir: or("REPORTS_DIR", "data/reports").into(),
            cache_path: or("CACHE_PATH", "local_db.json").into(),
            id_aliases_path: var("ID_ALIASES_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn evaluator_settings(&self) -> EvaluatorSettings {
        EvaluatorSettings {
            batch_size: self.batch_size,
            max_tokens: self.llm_max_tokens,
            temperature: self.llm_temperature,
            default_mode: self.default_mode,
        }
    }

    pub fn build_backend(&self) -> Result<Arc<dyn CompletionBackend>> {
        let backend: Arc<dyn CompletionBackend> = match self.llm_backend {
            BackendKind::OpenAi => Arc::new(ChatCompletionsBackend::new(
                &self.llm_api_url,
                self.llm_api_key.clone(),
                &self.llm_model,
                self.llm_timeout,
            )?),
            BackendKind::Predict => Arc::new(PredictEndpointBackend::new(
                &self.llm_api_url,
                self.llm_api_key.clone(),
                self.llm_timeout,
            )?),
        };
        Ok(backend)
    }

    /// Resolver mapping cohort ids into the heatmap namespace
    pub fn heatmap_resolver(&self) -> Result<Arc<dyn IdentifierResolver>> {
        match &self.id_aliases_path {
            Some(path) => {
                let aliases = AliasResolver::load_from_file(path, Side::Left)
                    .with_context(|| format!("Failed to load id aliases from {}", path.display()))?;
                Ok(Arc::new(aliases))
            }
            None => Ok(Arc::new(IdentityResolver)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.llm_backend, BackendKind::OpenAi);
        assert_eq!(config.llm_model, "medgemma-27b");
        assert_eq!(config.llm_timeout, Duration::from_secs(120));
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.default_mode, CohortMode::CohortContext);
        assert_eq!(config.cache_path, PathBuf::from("local_db.json"));
        assert!(config.id_aliases_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("LLM_BACKEND", "Predict"),
            ("EVAL_MODE", "batched"),
            ("EVAL_BATCH_SIZE", "4"),
            ("LLM_API_KEY", ""),
        ])
        .unwrap();
        assert_eq!(config.llm_backend, BackendKind::Predict);
        assert_eq!(config.default_mode, CohortMode::Batched);
        assert_eq!(config.evaluator_settings().batch_size, 4);
        assert!(config.llm_api_key.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(config(&[("LLM_TIMEOUT_SECS", "soon")]).is_err());
        assert!(config(&[("LLM_BACKEND", "carrier-pigeon")]).is_err());
        assert!(config(&[("EVAL_MODE", "sideways")]).is_err());
    }
}
