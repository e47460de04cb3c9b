//! Evaluation report rendering
//!
//! The rendered text is the only thing the outer search loop reads, so every
//! quadrant is always rendered, even when empty.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

use crate::metrics::{ConfusionMatrix, Metrics, Quadrant};
use crate::patient::{PatientId, SurvivalLabel};

/// Failed predictions listed individually before the rest are summarised
const MAX_LISTED_FAILURES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: SurvivalLabel,
    pub reasoning: String,
    pub raw_response: String,
}

/// Why no label was recovered for a patient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The backend call itself failed
    Backend,
    /// The backend answered but no label could be parsed
    Parse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Predicted(Prediction),
    Failed { kind: FailureKind, error: String },
}

/// The attempt made for one cohort patient
#[derive(Debug, Clone, PartialEq)]
pub struct PatientPrediction {
    pub patient_id: PatientId,
    pub actual: SurvivalLabel,
    pub outcome: Outcome,
}

impl PatientPrediction {
    pub fn predicted(patient_id: PatientId, actual: SurvivalLabel, prediction: Prediction) -> Self {
        Self {
            patient_id,
            actual,
            outcome: Outcome::Predicted(prediction),
        }
    }

    pub fn failed(patient_id: PatientId, actual: SurvivalLabel, error: impl Into<String>) -> Self {
        Self::failure(patient_id, actual, FailureKind::Parse, error)
    }

    pub fn backend_failed(
        patient_id: PatientId,
        actual: SurvivalLabel,
        error: impl Into<String>,
    ) -> Self {
        Self::failure(patient_id, actual, FailureKind::Backend, error)
    }

    pub fn failure(
        patient_id: PatientId,
        actual: SurvivalLabel,
        kind: FailureKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            patient_id,
            actual,
            outcome: Outcome::Failed {
                kind,
                error: error.into(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Example {
    pub patient_id: PatientId,
    pub reasoning: String,
}

#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub total_patients: usize,
    pub matrix: ConfusionMatrix,
    pub examples: BTreeMap<Quadrant, Example>,
    pub failures: Vec<(PatientId, String)>,
    pub backend_failures: usize,
}

impl EvaluationReport {
    /// Tally predictions and pick one random example per non-empty quadrant
    pub fn build<R: Rng + ?Sized>(predictions: &[PatientPrediction], rng: &mut R) -> Self {
        let mut matrix = ConfusionMatrix::default();
        let mut members: BTreeMap<Quadrant, Vec<&PatientPrediction>> = BTreeMap::new();
        let mut failures = Vec::new();
        let mut backend_failures = 0;

        for entry in predictions {
            match &entry.outcome {
                Outcome::Predicted(prediction) => {
                    let quadrant = matrix.record(prediction.label, entry.actual);
                    members.entry(quadrant).or_default().push(entry);
                }
                Outcome::Failed { kind, error } => {
                    if *kind == FailureKind::Backend {
                        backend_failures += 1;
                    }
                    failures.push((entry.patient_id.clone(), error.clone()));
                }
            }
        }

        let examples = members
            .into_iter()
            .filter_map(|(quadrant, entries)| {
                let chosen = entries.choose(rng)?;
                let Outcome::Predicted(prediction) = &chosen.outcome else {
                    return None;
                };
                Some((
                    quadrant,
                    Example {
                        patient_id: chosen.patient_id.clone(),
                        reasoning: prediction.reasoning.clone(),
                    },
                ))
            })
            .collect();

        Self {
            total_patients: predictions.len(),
            matrix,
            examples,
            failures,
            backend_failures,
        }
    }

    /// No label was recovered and the backend failed for every patient.
    /// Such a run says nothing about the pair.
    pub fn is_backend_outage(&self) -> bool {
        self.total_patients > 0
            && self.parsed() == 0
            && self.backend_failures == self.total_patients
    }

    pub fn parsed(&self) -> usize {
        self.matrix.total()
    }

    pub fn metrics(&self) -> Metrics {
        self.matrix.metrics()
    }

    pub fn render(&self) -> String {
        let m = &self.matrix;
        let mut out = String::new();

        out.push_str("Evaluation Results:\n");
        out.push_str(&format!("- Total patients: {}\n", self.total_patients));
        out.push_str(&format!("- Correct predictions: {}\n", m.correct()));
        out.push_str(&format!("- Parsed predictions: {}\n", self.parsed()));
        out.push_str(&format!("- Accuracy: {:.2}%\n\n", m.accuracy()));

        out.push_str("Confusion Matrix Statistics:\n");
        out.push_str(&format!("- True Positives (TP): {}\n", m.true_positives));
        out.push_str(&format!("- False Positives (FP): {}\n", m.false_positives));
        out.push_str(&format!("- True Negatives (TN): {}\n", m.true_negatives));
        out.push_str(&format!("- False Negatives (FN): {}\n\n", m.false_negatives));

        out.push_str("Performance Metrics:\n");
        out.push_str(&format!("- Precision: {:.2}%\n", m.precision()));
        out.push_str(&format!("- Recall (Sensitivity): {:.2}%\n", m.recall()));
        out.push_str(&format!("- Specificity: {:.2}%\n\n", m.specificity()));

        out.push_str("Example Cases with associated reasoning:\n");
        for quadrant in Quadrant::ALL {
            match self.examples.get(&quadrant) {
                Some(example) => {
                    out.push_str(&format!("\n{} Example:\n", quadrant.title()));
                    out.push_str(&format!(
                        "  Predicted: {}, Actual: {} {}\n",
                        quadrant.predicted().describe(),
                        quadrant.actual().describe(),
                        if quadrant.is_correct() { "✓" } else { "✗" }
                    ));
                    out.push_str(&format!("  Reasoning: {}\n", example.reasoning));
                }
                None => {
                    out.push_str(&format!(
                        "\n{} Example: No patients in this category\n",
                        quadrant.title()
                    ));
                }
            }
        }

        if !self.failures.is_empty() {
            out.push_str(&format!("\nFailed Predictions: {}\n", self.failures.len()));
            for (patient_id, error) in self.failures.iter().take(MAX_LISTED_FAILURES) {
                out.push_str(&format!("  - {}: {}\n", patient_id, error));
            }
            if self.failures.len() > MAX_LISTED_FAILURES {
                out.push_str(&format!(
                    "  ... and {} more\n",
                    self.failures.len() - MAX_LISTED_FAILURES
                ));
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn predicted(id: &str, label: SurvivalLabel, actual: SurvivalLabel) -> PatientPrediction {
        PatientPrediction::predicted(
            id.into(),
            actual,
            Prediction {
                label,
                reasoning: format!("because {}", id),
                raw_response: String::new(),
            },
        )
    }

    #[test]
    fn test_empty_quadrants_render_placeholder() {
        let predictions = vec![
            predicted("P1", SurvivalLabel::Long, SurvivalLabel::Long),
            predicted("P2", SurvivalLabel::Short, SurvivalLabel::Short),
        ];
        let report = EvaluationReport::build(&predictions, &mut StdRng::seed_from_u64(7));
        let text = report.render();

        assert!(text.contains("False Negative Example: No patients in this category"));
        assert!(text.contains("False Positive Example: No patients in this category"));
        assert!(text.contains(
            "\nTrue Positive Example:\n  Predicted: long survival, Actual: long survival ✓\n  Reasoning: because P1\n"
        ));
        assert!(text.contains("- Accuracy: 100.00%"));
        assert!(!text.contains("Failed Predictions"));
    }

    #[test]
    fn test_all_quadrants_empty() {
        let predictions = vec![PatientPrediction::failed(
            "P1".into(),
            SurvivalLabel::Long,
            "backend down",
        )];
        let report = EvaluationReport::build(&predictions, &mut StdRng::seed_from_u64(1));
        let text = report.render();

        for quadrant in Quadrant::ALL {
            assert!(text.contains(&format!(
                "{} Example: No patients in this category",
                quadrant.title()
            )));
        }
        assert!(text.contains("- Total patients: 1"));
        assert!(text.contains("- Parsed predictions: 0"));
        assert!(text.contains("- Accuracy: 0.00%"));
        assert!(text.contains("Failed Predictions: 1\n  - P1: backend down"));
    }

    #[test]
    fn test_example_selection_is_seeded() {
        let predictions: Vec<_> = (0..10)
            .map(|i| predicted(&format!("P{}", i), SurvivalLabel::Long, SurvivalLabel::Long))
            .collect();
        let a = EvaluationReport::build(&predictions, &mut StdRng::seed_from_u64(42));
        let b = EvaluationReport::build(&predictions, &mut StdRng::seed_from_u64(42));
        assert_eq!(a.render(), b.render());
    }

    #[test]
    fn test_backend_outage_detection() {
        let outage: Vec<_> = ["P1", "P2"]
            .iter()
            .map(|id| PatientPrediction::backend_failed((*id).into(), SurvivalLabel::Long, "down"))
            .collect();
        let report = EvaluationReport::build(&outage, &mut StdRng::seed_from_u64(3));
        assert_eq!(report.backend_failures, 2);
        assert!(report.is_backend_outage());

        // Unparseable answers are a real, if poor, result
        let mixed = vec![
            PatientPrediction::backend_failed("P1".into(), SurvivalLabel::Long, "down"),
            PatientPrediction::failed("P2".into(), SurvivalLabel::Short, "no label"),
        ];
        let report = EvaluationReport::build(&mixed, &mut StdRng::seed_from_u64(3));
        assert!(!report.is_backend_outage());
        assert!(!EvaluationReport::build(&[], &mut StdRng::seed_from_u64(3)).is_backend_outage());
    }

    #[test]
    fn test_failure_list_is_capped() {
        let predictions: Vec<_> = (0..8)
            .map(|i| PatientPrediction::failed(format!("P{}", i).into(), SurvivalLabel::Short, "x"))
            .collect();
        let text = EvaluationReport::build(&predictions, &mut StdRng::seed_from_u64(0)).render();
        assert!(text.contains("Failed Predictions: 8"));
        assert!(text.contains("  ... and 3 more"));
    }
}
