use anyhow::{Context, Result};
use biomarker_core::{
    standard_catalog, CohortEvaluator, CohortMode, Config, GroundTruth, ResultCache,
    SeedInspector,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "Usage:
  biomarker-eval seed                                  summarize evaluated pairs
  biomarker-eval tools                                 list report tools
  biomarker-eval evaluate <tool1> <tool2> [--mode <m>] evaluate a pair
  biomarker-eval clear                                 clear the result cache

Modes: per-patient, batched, cohort-context";

enum Command {
    Seed,
    Tools,
    Evaluate {
        tool1: String,
        tool2: String,
        mode: Option<CohortMode>,
    },
    Clear,
}

fn parse_args(args: &[String]) -> Result<Command> {
    match args.first().map(String::as_str) {
        Some("seed") => Ok(Command::Seed),
        Some("tools") => Ok(Command::Tools),
        Some("clear") => Ok(Command::Clear),
        Some("evaluate") => {
            let (tool1, tool2) = match (args.get(1), args.get(2)) {
                (Some(t1), Some(t2)) => (t1.clone(), t2.clone()),
                _ => anyhow::bail!("evaluate needs two tool names\n\n{}", USAGE),
            };
            let mode = match args.get(3).map(String::as_str) {
                Some("--mode") => {
                    let value = args
                        .get(4)
                        .ok_or_else(|| anyhow::anyhow!("--mode needs a value\n\n{}", USAGE))?;
                    Some(value.parse().map_err(|e: String| anyhow::anyhow!(e))?)
                }
                Some(other) => anyhow::bail!("Unexpected argument '{}'\n\n{}", other, USAGE),
                None => None,
            };
            Ok(Command::Evaluate { tool1, tool2, mode })
        }
        _ => anyhow::bail!("{}", USAGE),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "biomarker=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;

    match command {
        Command::Tools => {
            let catalog = standard_catalog(&config.reports_dir, config.heatmap_resolver()?);
            println!("{}", catalog.generate_description());
        }
        Command::Seed => {
            let cache = Arc::new(ResultCache::open(&config.cache_path)?);
            println!("{}", SeedInspector::new(cache).summarize()?);
        }
        Command::Clear => {
            ResultCache::open(&config.cache_path)?.clear()?;
            println!("Cleared {}", config.cache_path.display());
        }
        Command::Evaluate { tool1, tool2, mode } => {
            info!("Configuration loaded");
            info!("  LLM API: {} ({:?})", config.llm_api_url, config.llm_backend);
            info!("  Model: {}", config.llm_model);
            info!("  Ground truth: {}", config.ground_truth_path.display());
            info!("  Cache: {}", config.cache_path.display());

            let ground_truth = GroundTruth::load_from_file(&config.ground_truth_path)
                .context("Failed to load ground truth")?;
            let catalog = standard_catalog(&config.reports_dir, config.heatmap_resolver()?);
            let cache = Arc::new(ResultCache::open(&config.cache_path)?);

            let evaluator = CohortEvaluator::new(
                Arc::new(catalog),
                config.build_backend()?,
                cache,
                ground_truth,
                config.evaluator_settings(),
            )?;

            let report = evaluator.evaluate(&tool1, &tool2, mode).await?;
            println!("{}", report);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_evaluate() {
        match parse_args(&args(&["evaluate", "a", "b", "--mode", "batched"])).unwrap() {
            Command::Evaluate { tool1, tool2, mode } => {
                assert_eq!((tool1.as_str(), tool2.as_str()), ("a", "b"));
                assert_eq!(mode, Some(CohortMode::Batched));
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["evaluate", "a"])).is_err());
        assert!(parse_args(&args(&["evaluate", "a", "b", "--mode"])).is_err());
        assert!(parse_args(&args(&["evaluate", "a", "b", "--fast"])).is_err());
        assert!(matches!(parse_args(&args(&["seed"])).unwrap(), Command::Seed));
    }
}
