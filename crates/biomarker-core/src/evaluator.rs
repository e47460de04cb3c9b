//! Cohort evaluation of a candidate report pair
//!
//! For every ground-truth patient both tools are run, a prompt is built and
//! sent to the backend, and the parsed answers are scored against the label.
//! Tool and backend failures degrade to per-patient errors; only an unknown
//! tool name aborts an evaluation.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cache::{cache_key, CacheEntry, ResultCache};
use crate::catalog::{CatalogTool, ReportCatalog};
use crate::error::{truncate_chars, BackendError, EvalError, RAW_PREVIEW_CHARS};
use crate::llm::{CompletionBackend, GenerationParams};
use crate::parser::PredictionParser;
use crate::patient::{GroundTruth, PatientId, SurvivalLabel};
use crate::prompts::{
    batched_prompt, cohort_summary_prompt, patient_prompt, CohortContext,
    COHORT_SYSTEM_INSTRUCTION, PATIENT_SYSTEM_INSTRUCTION, SUMMARY_MAX_TOKENS,
    SUMMARY_SYSTEM_INSTRUCTION, SUMMARY_TEMPERATURE,
};
use crate::report::{EvaluationReport, FailureKind, PatientPrediction, Prediction};

/// How prompts are laid out for one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CohortMode {
    /// One prompt per patient
    PerPatient,
    /// One prompt for the whole cohort
    Batched,
    /// One prompt per patient, preceded by cohort summaries of both tools
    #[default]
    CohortContext,
}

impl CohortMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CohortMode::PerPatient => "per-patient",
            CohortMode::Batched => "batched",
            CohortMode::CohortContext => "cohort-context",
        }
    }
}

impl fmt::Display for CohortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CohortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "per-patient" => Ok(CohortMode::PerPatient),
            "batched" => Ok(CohortMode::Batched),
            "cohort-context" => Ok(CohortMode::CohortContext),
            other => Err(format!(
                "Unknown cohort mode '{}' (expected per-patient, batched or cohort-context)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    pub batch_size: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    pub default_mode: CohortMode,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_tokens: 2000,
            temperature: 0.0,
            default_mode: CohortMode::default(),
        }
    }
}

pub struct CohortEvaluator {
    catalog: Arc<ReportCatalog>,
    backend: Arc<dyn CompletionBackend>,
    cache: Arc<ResultCache>,
    ground_truth: GroundTruth,
    parser: PredictionParser,
    settings: EvaluatorSettings,
    rng: Mutex<StdRng>,
}

impl CohortEvaluator {
    pub fn new(
        catalog: Arc<ReportCatalog>,
        backend: Arc<dyn CompletionBackend>,
        cache: Arc<ResultCache>,
        ground_truth: GroundTruth,
        settings: EvaluatorSettings,
    ) -> Result<Self, EvalError> {
        if ground_truth.is_empty() {
            return Err(EvalError::GroundTruth("ground truth cohort is empty".to_string()));
        }

        Ok(Self {
            catalog,
            backend,
            cache,
            ground_truth,
            parser: PredictionParser::new()?,
            settings: EvaluatorSettings {
                batch_size: settings.batch_size.max(1),
                ..settings
            },
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Make example selection reproducible
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn catalog(&self) -> &ReportCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn default_mode(&self) -> CohortMode {
        self.settings.default_mode
    }

    /// Evaluate the ordered pair `(tool1, tool2)` and return the report text.
    ///
    /// A pair already in the cache returns the stored report without any
    /// backend call.
    pub async fn evaluate(
        &self,
        tool1: &str,
        tool2: &str,
        mode: Option<CohortMode>,
    ) -> Result<String, EvalError> {
        let first = self.catalog.resolve(tool1)?;
        let second = self.catalog.resolve(tool2)?;
        let key = cache_key(tool1, tool2);

        if let Some(entry) = self.cache.get(&key)? {
            info!("Cache hit for {}", key);
            return Ok(entry.report);
        }

        let mode = mode.unwrap_or(self.settings.default_mode);
        let run_id = Uuid::new_v4();
        info!("Cache miss for {}, evaluating ({}, run {})", key, mode, run_id);

        let span = info_span!("evaluation", run = %run_id, pair = %key);
        self.run(&key, &first, &second, mode).instrument(span).await
    }

    async fn run(
        &self,
        key: &str,
        first: &CatalogTool,
        second: &CatalogTool,
        mode: CohortMode,
    ) -> Result<String, EvalError> {
        let cohort: Vec<(PatientId, SurvivalLabel)> = self
            .ground_truth
            .iter()
            .map(|(patient, label)| (patient.clone(), label))
            .collect();

        let reports1 = self.generate_reports(first, &cohort).await;
        let reports2 = self.generate_reports(second, &cohort).await;

        let predictions = match mode {
            CohortMode::PerPatient => {
                self.predict_per_patient(
                    first.name(),
                    second.name(),
                    &cohort,
                    &reports1,
                    &reports2,
                    None,
                )
                .await
            }
            CohortMode::CohortContext => {
                let context = CohortContext {
                    summary1: self.cohort_summary(first.name(), &reports1).await,
                    summary2: self.cohort_summary(second.name(), &reports2).await,
                };
                self.predict_per_patient(
                    first.name(),
                    second.name(),
                    &cohort,
                    &reports1,
                    &reports2,
                    Some(&context),
                )
                .await
            }
            CohortMode::Batched => {
                self.predict_batched(first.name(), second.name(), &cohort, &reports1, &reports2)
                    .await
            }
        };

        let report = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            EvaluationReport::build(&predictions, &mut *rng)
        };
        let text = report.render();
        let metrics = report.metrics();
        info!(
            "Evaluated {}: accuracy {:.2}%, precision {:.2}%, recall {:.2}%, specificity {:.2}% ({}/{} parsed)",
            key,
            metrics.accuracy,
            metrics.precision,
            metrics.recall,
            metrics.specificity,
            report.parsed(),
            report.total_patients
        );

        if report.is_backend_outage() {
            warn!(
                "Backend failed for every patient of {}, result not cached",
                key
            );
            return Ok(text);
        }

        let entry = CacheEntry::new(first.name(), second.name(), metrics, text.clone(), mode.as_str());
        if !self.cache.put(key, entry)? {
            // Another evaluation of the same pair finished first
            if let Some(stored) = self.cache.get(key)? {
                return Ok(stored.report);
            }
        }
        Ok(text)
    }

    async fn generate_reports(
        &self,
        tool: &CatalogTool,
        cohort: &[(PatientId, SurvivalLabel)],
    ) -> Vec<String> {
        info!("Generating {} reports for {} patients", tool.name(), cohort.len());
        let mut reports = Vec::with_capacity(cohort.len());
        for (patient, _) in cohort {
            reports.push(tool.report(patient).await);
        }
        reports
    }

    async fn cohort_summary(&self, tool_name: &str, reports: &[String]) -> String {
        debug!("Generating cohort summary for {}", tool_name);
        let refs: Vec<&str> = reports.iter().map(String::as_str).collect();
        let prompt = cohort_summary_prompt(tool_name, &refs);
        let params = GenerationParams::new(
            SUMMARY_SYSTEM_INSTRUCTION,
            SUMMARY_MAX_TOKENS,
            SUMMARY_TEMPERATURE,
        );

        match self.backend.complete(&prompt, &params).await {
            Ok(text) => {
                let text = text.trim();
                self.parser
                    .structured_reasoning(text)
                    .unwrap_or_else(|| text.to_string())
            }
            Err(e) => {
                warn!("Could not generate cohort summary for {}: {}", tool_name, e);
                format!("Summary generation failed for {}.", tool_name)
            }
        }
    }

    fn prediction_params(&self, system_instruction: &str) -> GenerationParams {
        GenerationParams::new(
            system_instruction,
            self.settings.max_tokens,
            self.settings.temperature,
        )
    }

    async fn predict_per_patient(
        &self,
        tool1: &str,
        tool2: &str,
        cohort: &[(PatientId, SurvivalLabel)],
        reports1: &[String],
        reports2: &[String],
        context: Option<&CohortContext>,
    ) -> Vec<PatientPrediction> {
        let prompts: Vec<String> = cohort
            .iter()
            .zip(reports1.iter().zip(reports2))
            .map(|((patient, _), (r1, r2))| {
                patient_prompt(patient, (tool1, r1.as_str()), (tool2, r2.as_str()), context)
            })
            .collect();
        let params = self.prediction_params(if context.is_some() {
            COHORT_SYSTEM_INSTRUCTION
        } else {
            PATIENT_SYSTEM_INSTRUCTION
        });

        let mut predictions = Vec::with_capacity(cohort.len());

        if self.backend.supports_batching() {
            let batch_size = self.settings.batch_size;
            for (chunk_index, (patients, chunk)) in cohort
                .chunks(batch_size)
                .zip(prompts.chunks(batch_size))
                .enumerate()
            {
                let outputs = self
                    .backend
                    .complete_batch(chunk, &params)
                    .await
                    .and_then(|outputs| {
                        if outputs.len() == chunk.len() {
                            Ok(outputs)
                        } else {
                            Err(BackendError::BatchLength {
                                expected: chunk.len(),
                                got: outputs.len(),
                            })
                        }
                    });

                match outputs {
                    Ok(outputs) => {
                        for ((patient, actual), raw) in patients.iter().zip(outputs) {
                            predictions.push(self.interpret(patient, *actual, raw));
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Backend failed for batch {} ({} patients): {}",
                            chunk_index,
                            patients.len(),
                            e
                        );
                        for (patient, actual) in patients {
                            predictions.push(PatientPrediction::backend_failed(
                                patient.clone(),
                                *actual,
                                format!("Backend error: {}", e),
                            ));
                        }
                    }
                }
            }
        } else {
            for ((patient, actual), prompt) in cohort.iter().zip(&prompts) {
                match self.backend.complete(prompt, &params).await {
                    Ok(raw) => predictions.push(self.interpret(patient, *actual, raw)),
                    Err(e) => {
                        warn!("Backend failed for patient {}: {}", patient, e);
                        predictions.push(PatientPrediction::backend_failed(
                            patient.clone(),
                            *actual,
                            format!("Backend error: {}", e),
                        ));
                    }
                }
            }
        }

        predictions
    }

    async fn predict_batched(
        &self,
        tool1: &str,
        tool2: &str,
        cohort: &[(PatientId, SurvivalLabel)],
        reports1: &[String],
        reports2: &[String],
    ) -> Vec<PatientPrediction> {
        let entries: Vec<(PatientId, String, String)> = cohort
            .iter()
            .zip(reports1.iter().zip(reports2))
            .map(|((patient, _), (r1, r2))| (patient.clone(), r1.clone(), r2.clone()))
            .collect();
        let prompt = batched_prompt(tool1, tool2, &entries);
        let params = self.prediction_params(PATIENT_SYSTEM_INSTRUCTION);

        let raw = match self.backend.complete(&prompt, &params).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Backend failed for batched cohort prompt: {}", e);
                return fail_all(cohort, FailureKind::Backend, &format!("Backend error: {}", e));
            }
        };

        let mut parsed = match self.parser.parse_batched(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Failed to parse batched response: {}", e);
                return fail_all(cohort, FailureKind::Parse, &e.to_string());
            }
        };

        cohort
            .iter()
            .map(|(patient, actual)| match parsed.remove(patient.as_str()) {
                Some(Ok(prediction)) => PatientPrediction::predicted(
                    patient.clone(),
                    *actual,
                    Prediction {
                        label: prediction.label,
                        reasoning: prediction.reasoning,
                        raw_response: raw.clone(),
                    },
                ),
                Some(Err(e)) => {
                    debug!("Failed to parse prediction for {}: {}", patient, e);
                    PatientPrediction::failed(patient.clone(), *actual, e.to_string())
                }
                None => PatientPrediction::failed(
                    patient.clone(),
                    *actual,
                    "No prediction for this patient in batched response",
                ),
            })
            .collect()
    }

    fn interpret(&self, patient: &PatientId, actual: SurvivalLabel, raw: String) -> PatientPrediction {
        match self.parser.parse(&raw) {
            Ok(parsed) => PatientPrediction::predicted(
                patient.clone(),
                actual,
                Prediction {
                    label: parsed.label,
                    reasoning: parsed.reasoning,
                    raw_response: raw,
                },
            ),
            Err(e) => {
                debug!(
                    "Failed to parse prediction for {}: {}",
                    patient,
                    truncate_chars(&raw, RAW_PREVIEW_CHARS)
                );
                PatientPrediction::failed(patient.clone(), actual, e.to_string())
            }
        }
    }
}

fn fail_all(
    cohort: &[(PatientId, SurvivalLabel)],
    kind: FailureKind,
    error: &str,
) -> Vec<PatientPrediction> {
    cohort
        .iter()
        .map(|(patient, actual)| PatientPrediction::failure(patient.clone(), *actual, kind, error))
        .collect()
}
