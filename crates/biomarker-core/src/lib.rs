//! Biomarker Core Library
//!
//! Zero-shot fitness evaluation of patient report pairs: a report catalog,
//! LLM backends, prediction parsing, cohort evaluation and a persistent
//! result cache for an outer search over candidate pairs.

pub mod agent_tools;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod llm;
pub mod metrics;
pub mod parser;
pub mod patient;
pub mod prompts;
pub mod report;
pub mod seed;
pub mod tools;

// Re-export key types for convenience
pub use agent_tools::{AgentTool, AgentToolRegistry, EvaluatePairTool, SeedTool};
pub use cache::{cache_key, CacheEntry, ResultCache};
pub use catalog::{CatalogTool, ReportCatalog, ReportTool};
pub use config::Config;
pub use error::{BackendError, CacheError, EvalError, PredictionParseError};
pub use evaluator::{CohortEvaluator, CohortMode, EvaluatorSettings};
pub use llm::{CompletionBackend, GenerationParams};
pub use metrics::{ConfusionMatrix, Metrics};
pub use parser::{ParsedPrediction, PredictionParser};
pub use patient::{GroundTruth, IdentifierResolver, PatientId, SurvivalLabel};
pub use seed::SeedInspector;
pub use tools::standard_catalog;
