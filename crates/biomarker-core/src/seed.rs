//! Summary of previously evaluated pairs, read before a search run starts

use std::sync::Arc;

use crate::cache::ResultCache;
use crate::error::CacheError;

pub struct SeedInspector {
    cache: Arc<ResultCache>,
}

impl SeedInspector {
    pub fn new(cache: Arc<ResultCache>) -> Self {
        Self { cache }
    }

    /// Render every cached pair, best accuracy first
    pub fn summarize(&self) -> Result<String, CacheError> {
        let entries = self.cache.sorted_by_accuracy()?;
        if entries.is_empty() {
            return Ok("No pairs have been evaluated yet. The cache is empty, so every \
                       candidate pair still needs a first evaluation."
                .to_string());
        }

        let mut out = format!(
            "Previously evaluated pairs: {} (sorted by accuracy)\n\n",
            entries.len()
        );
        out.push_str("Rank | Tool 1 | Tool 2 | Accuracy | Precision | Recall | Specificity\n");
        for (rank, entry) in entries.iter().enumerate() {
            out.push_str(&format!(
                "{} | {} | {} | {:.2}% | {:.2}% | {:.2}% | {:.2}%\n",
                rank + 1,
                entry.tool1_name,
                entry.tool2_name,
                entry.accuracy,
                entry.precision,
                entry.recall,
                entry.specificity
            ));
        }

        let best = &entries[0];
        out.push_str(&format!(
            "\nBest pair so far: {} + {} ({:.2}% accuracy)\n",
            best.tool1_name, best.tool2_name, best.accuracy
        ));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;
    use crate::metrics::Metrics;

    #[test]
    fn test_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(ResultCache::open(dir.path().join("cache.json")).unwrap());
        let summary = SeedInspector::new(cache).summarize().unwrap();
        assert!(summary.starts_with("No pairs have been evaluated yet."));
    }

    #[test]
    fn test_sorted_table() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(ResultCache::open(dir.path().join("cache.json")).unwrap());
        let metrics = |accuracy| Metrics {
            accuracy,
            precision: 50.0,
            recall: 25.0,
            specificity: 75.0,
        };
        cache
            .put("a_b", CacheEntry::new("a", "b", metrics(55.0), "r", "batched"))
            .unwrap();
        cache
            .put("c_d", CacheEntry::new("c", "d", metrics(70.0), "r", "batched"))
            .unwrap();

        let summary = SeedInspector::new(cache).summarize().unwrap();
        let rows: Vec<&str> = summary.lines().filter(|l| l.contains(" | ")).collect();
        assert_eq!(rows[1], "1 | c | d | 70.00% | 50.00% | 25.00% | 75.00%");
        assert_eq!(rows[2], "2 | a | b | 55.00% | 50.00% | 25.00% | 75.00%");
        assert!(summary.contains("Best pair so far: c + d (70.00% accuracy)"));
    }
}
