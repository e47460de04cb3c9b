//! Confusion matrix and derived metrics
//!
//! Long survival is the positive class. All rates are percentages and are 0
//! when their denominator is 0.

use serde::{Deserialize, Serialize};

use crate::patient::SurvivalLabel;

/// One cell of the confusion matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Quadrant {
    TruePositive,
    FalsePositive,
    TrueNegative,
    FalseNegative,
}

impl Quadrant {
    /// Rendering order in reports
    pub const ALL: [Quadrant; 4] = [
        Quadrant::TruePositive,
        Quadrant::FalsePositive,
        Quadrant::TrueNegative,
        Quadrant::FalseNegative,
    ];

    pub fn classify(predicted: SurvivalLabel, actual: SurvivalLabel) -> Self {
        match (predicted, actual) {
            (SurvivalLabel::Long, SurvivalLabel::Long) => Quadrant::TruePositive,
            (SurvivalLabel::Long, SurvivalLabel::Short) => Quadrant::FalsePositive,
            (SurvivalLabel::Short, SurvivalLabel::Short) => Quadrant::TrueNegative,
            (SurvivalLabel::Short, SurvivalLabel::Long) => Quadrant::FalseNegative,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Quadrant::TruePositive => "True Positive",
            Quadrant::FalsePositive => "False Positive",
            Quadrant::TrueNegative => "True Negative",
            Quadrant::FalseNegative => "False Negative",
        }
    }

    pub fn predicted(self) -> SurvivalLabel {
        match self {
            Quadrant::TruePositive | Quadrant::FalsePositive => SurvivalLabel::Long,
            Quadrant::TrueNegative | Quadrant::FalseNegative => SurvivalLabel::Short,
        }
    }

    pub fn actual(self) -> SurvivalLabel {
        match self {
            Quadrant::TruePositive | Quadrant::FalseNegative => SurvivalLabel::Long,
            Quadrant::TrueNegative | Quadrant::FalsePositive => SurvivalLabel::Short,
        }
    }

    pub fn is_correct(self) -> bool {
        matches!(self, Quadrant::TruePositive | Quadrant::TrueNegative)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionMatrix {
    pub fn record(&mut self, predicted: SurvivalLabel, actual: SurvivalLabel) -> Quadrant {
        let quadrant = Quadrant::classify(predicted, actual);
        match quadrant {
            Quadrant::TruePositive => self.true_positives += 1,
            Quadrant::FalsePositive => self.false_positives += 1,
            Quadrant::TrueNegative => self.true_negatives += 1,
            Quadrant::FalseNegative => self.false_negatives += 1,
        }
        quadrant
    }

    pub fn count(&self, quadrant: Quadrant) -> usize {
        match quadrant {
            Quadrant::TruePositive => self.true_positives,
            Quadrant::FalsePositive => self.false_positives,
            Quadrant::TrueNegative => self.true_negatives,
            Quadrant::FalseNegative => self.false_negatives,
        }
    }

    /// Number of parsed predictions
    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn correct(&self) -> usize {
        self.true_positives + self.true_negatives
    }

    pub fn accuracy(&self) -> f64 {
        percent(self.correct(), self.total())
    }

    pub fn precision(&self) -> f64 {
        percent(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        percent(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn specificity(&self) -> f64 {
        percent(self.true_negatives, self.true_negatives + self.false_positives)
    }

    pub fn metrics(&self) -> Metrics {
        Metrics {
            accuracy: self.accuracy(),
            precision: self.precision(),
            recall: self.recall(),
            specificity: self.specificity(),
        }
    }
}

/// Fitness bundle ranked by the search loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub specificity: f64,
}

fn percent(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SurvivalLabel::{Long, Short};

    #[test]
    fn test_empty_matrix_is_all_zero() {
        let matrix = ConfusionMatrix::default();
        assert_eq!(matrix.metrics(), Metrics::default());
    }

    #[test]
    fn test_metrics() {
        let mut matrix = ConfusionMatrix::default();
        for (predicted, actual) in [
            (Long, Long),
            (Long, Long),
            (Long, Short),
            (Short, Short),
            (Short, Long),
        ] {
            matrix.record(predicted, actual);
        }

        assert_eq!(matrix.total(), 5);
        assert_eq!(matrix.correct(), 3);
        assert!((matrix.accuracy() - 60.0).abs() < 1e-9);
        assert!((matrix.precision() - 200.0 / 3.0).abs() < 1e-9);
        assert!((matrix.recall() - 200.0 / 3.0).abs() < 1e-9);
        assert!((matrix.specificity() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_quadrant_labels() {
        for quadrant in Quadrant::ALL {
            assert_eq!(
                Quadrant::classify(quadrant.predicted(), quadrant.actual()),
                quadrant
            );
        }
        assert!(Quadrant::TrueNegative.is_correct());
        assert!(!Quadrant::FalseNegative.is_correct());
    }
}
