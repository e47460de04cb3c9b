//! Patients, identifier namespaces and ground truth
//!
//! The same patient may be known under several ids (e.g. a clinical id and a
//! sequencing id). Report tools pick the namespace they need through an
//! [`IdentifierResolver`] instead of hard-coding mappings.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

use crate::error::EvalError;

/// Opaque patient identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(String);

impl PatientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PatientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PatientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Binary survival outcome. `Long` (1) is the positive class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SurvivalLabel {
    Short,
    Long,
}

impl SurvivalLabel {
    pub fn describe(self) -> &'static str {
        match self {
            SurvivalLabel::Long => "long survival",
            SurvivalLabel::Short => "short survival",
        }
    }
}

impl TryFrom<u8> for SurvivalLabel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SurvivalLabel::Short),
            1 => Ok(SurvivalLabel::Long),
            other => Err(format!("label must be 0 or 1, got {}", other)),
        }
    }
}

impl From<SurvivalLabel> for u8 {
    fn from(label: SurvivalLabel) -> Self {
        match label {
            SurvivalLabel::Short => 0,
            SurvivalLabel::Long => 1,
        }
    }
}

/// Ground-truth labels for one evaluation run. The key set is the cohort.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroundTruth {
    labels: BTreeMap<PatientId, SurvivalLabel>,
}

impl GroundTruth {
    pub fn new(labels: impl IntoIterator<Item = (PatientId, SurvivalLabel)>) -> Self {
        Self {
            labels: labels.into_iter().collect(),
        }
    }

    /// Load a flat `{patient_id: 0|1}` document
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, EvalError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EvalError::GroundTruth(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
            .map_err(|e| EvalError::GroundTruth(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }

    pub fn label(&self, patient_id: &PatientId) -> Option<SurvivalLabel> {
        self.labels.get(patient_id).copied()
    }

    pub fn patients(&self) -> impl Iterator<Item = &PatientId> {
        self.labels.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PatientId, SurvivalLabel)> {
        self.labels.iter().map(|(id, label)| (id, *label))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Maps a raw patient id into the namespace a report source expects
pub trait IdentifierResolver: Send + Sync {
    fn normalize(&self, raw_id: &str) -> String;
}

/// Passes ids through unchanged
#[derive(Clone, Debug, Default)]
pub struct IdentityResolver;

impl IdentifierResolver for IdentityResolver {
    fn normalize(&self, raw_id: &str) -> String {
        raw_id.to_string()
    }
}

/// Bidirectional alias table resolving into one target namespace.
///
/// Built from pairs `(left, right)`. With `Side::Right` as target, a left id
/// maps to its right alias and a right id stays as is. Unknown ids pass
/// through unchanged.
#[derive(Clone, Debug, Default)]
pub struct AliasResolver {
    to_target: HashMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl AliasResolver {
    pub fn new<I, A, B>(pairs: I, target: Side) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        let to_target = pairs
            .into_iter()
            .map(|(left, right)| {
                let (left, right) = (left.into(), right.into());
                match target {
                    Side::Right => (left, right),
                    Side::Left => (right, left),
                }
            })
            .collect();
        Self { to_target }
    }

    /// Load a flat `{left: right}` JSON document
    pub fn load_from_file(path: impl AsRef<Path>, target: Side) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let pairs: BTreeMap<String, String> = serde_json::from_str(&content)?;
        Ok(Self::new(pairs, target))
    }

    pub fn len(&self) -> usize {
        self.to_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_target.is_empty()
    }
}

impl IdentifierResolver for AliasResolver {
    fn normalize(&self, raw_id: &str) -> String {
        self.to_target
            .get(raw_id)
            .cloned()
            .unwrap_or_else(|| raw_id.to_string())
    }
}

/// Drops a trailing sample suffix (e.g. "MW_B_001a" -> "MW_B_001")
#[derive(Clone, Debug)]
pub struct TrimSuffixResolver {
    suffix: String,
}

impl TrimSuffixResolver {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }
}

impl IdentifierResolver for TrimSuffixResolver {
    fn normalize(&self, raw_id: &str) -> String {
        raw_id
            .strip_suffix(self.suffix.as_str())
            .unwrap_or(raw_id)
            .to_string()
    }
}

/// Applies resolvers in order
#[derive(Default)]
pub struct ChainResolver {
    steps: Vec<Box<dyn IdentifierResolver>>,
}

impl ChainResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, resolver: impl IdentifierResolver + 'static) -> Self {
        self.steps.push(Box::new(resolver));
        self
    }
}

impl IdentifierResolver for ChainResolver {
    fn normalize(&self, raw_id: &str) -> String {
        self.steps
            .iter()
            .fold(raw_id.to_string(), |id, step| step.normalize(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_truth_from_json() {
        let truth = GroundTruth::from_json(r#"{"P2": 0, "P1": 1}"#).unwrap();
        assert_eq!(truth.len(), 2);
        assert_eq!(truth.label(&"P1".into()), Some(SurvivalLabel::Long));
        assert_eq!(truth.label(&"P2".into()), Some(SurvivalLabel::Short));
        // Iteration order is stable (sorted by id)
        let ids: Vec<&str> = truth.patients().map(|p| p.as_str()).collect();
        assert_eq!(ids, vec!["P1", "P2"]);
    }

    #[test]
    fn test_ground_truth_rejects_non_binary_labels() {
        assert!(GroundTruth::from_json(r#"{"P1": 2}"#).is_err());
        assert!(GroundTruth::from_json(r#"{"P1": "long"}"#).is_err());
    }

    #[test]
    fn test_alias_resolver_both_directions() {
        let pairs = vec![("CH_B_030", "MW_B_001"), ("CH_B_033", "MW_B_002")];

        let to_ch = AliasResolver::new(pairs.clone(), Side::Left);
        assert_eq!(to_ch.normalize("MW_B_001"), "CH_B_030");
        assert_eq!(to_ch.normalize("CH_B_033"), "CH_B_033");
        assert_eq!(to_ch.normalize("unknown"), "unknown");

        let to_mw = AliasResolver::new(pairs, Side::Right);
        assert_eq!(to_mw.normalize("CH_B_030"), "MW_B_001");
    }

    #[test]
    fn test_chain_resolver() {
        let chain = ChainResolver::new()
            .then(TrimSuffixResolver::new("a"))
            .then(AliasResolver::new(vec![("MW_B_001", "CH_B_030")], Side::Right));
        assert_eq!(chain.normalize("MW_B_001a"), "CH_B_030");
        assert_eq!(chain.normalize("MW_B_002"), "MW_B_002");
    }
}
