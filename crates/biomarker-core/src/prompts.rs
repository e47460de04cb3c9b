//! Prompt templates

use crate::patient::PatientId;

/// System instruction for prompts that carry cohort summaries
pub const COHORT_SYSTEM_INSTRUCTION: &str = "You are a highly skilled biomedical researcher. \
    Your task is to predict relative patient survival. You will be given a summary of a \
    patient cohort, followed by a specific patient's data. Your prediction for the \
    individual must be based on comparing their data to the provided cohort context.";

/// System instruction for prompts without cohort context
pub const PATIENT_SYSTEM_INSTRUCTION: &str = "You are a highly skilled biomedical researcher. \
    Your task is to predict relative patient survival from the patient's data. This is a \
    research exercise, not a diagnosis.";

pub const SUMMARY_SYSTEM_INSTRUCTION: &str = "You are a helpful medical data summarizer.";
pub const SUMMARY_MAX_TOKENS: u32 = 1000;
pub const SUMMARY_TEMPERATURE: f32 = 0.2;

const REPORT_SEPARATOR: &str = "\n---\n";

const ANSWER_FORMAT: &str = r#"Very important ! Provide your answer in JSON format with two fields:
- "prediction": either "long survival" or "short survival"
- "reasoning": a brief explanation of your prediction (max 2-3 sentences)

```json
{
  "prediction": "long survival" or "short survival",
  "reasoning": "brief explanation"
}
```

For example:
```json
{
  "prediction": "long survival",
  "reasoning": "The patient has a high CDK12 expression and a low DC expression, which is associated with long survival."
}
```

or
```json
{
  "prediction": "short survival",
  "reasoning": "The patient has a low CDK12 expression and a high DC expression, which is associated with short survival."
}
```

Let's predict!
"#;

const TASK: &str = "predict whether this patient will belong to the upper 50% (long survival) \
or the lower 50% (short survival) of the survival distribution. This is a relative ranking \
within the cohort, not a diagnosis.\nHint: there is roughly a 50% chance of long survival \
and 50% chance of short survival.";

/// Cohort-level summaries of both tools, injected into every patient prompt
#[derive(Debug, Clone, PartialEq)]
pub struct CohortContext {
    pub summary1: String,
    pub summary2: String,
}

/// Ask for a summary of one tool's reports across the whole cohort
pub fn cohort_summary_prompt(tool_name: &str, reports: &[&str]) -> String {
    format!(
        "The following are {count} individual medical reports about '{tool}'.\n\
         Summarize the key findings for the entire cohort. Focus on the range of observations \
         (e.g., high vs. low values), any central tendency, and the overall clinical picture \
         for this specific feature. Keep the summary to 6-8 sentences.\n\
         ---\n\
         REPORTS:\n\
         {reports}\n\
         ---\n\
         COHORT SUMMARY:\n",
        count = reports.len(),
        tool = tool_name,
        reports = reports.join(REPORT_SEPARATOR),
    )
}

/// Prompt for one patient. Tool 1's report always comes first.
pub fn patient_prompt(
    patient_id: &PatientId,
    tool1: (&str, &str),
    tool2: (&str, &str),
    context: Option<&CohortContext>,
) -> String {
    let (tool1_name, report1) = tool1;
    let (tool2_name, report2) = tool2;
    let mut prompt = String::new();

    match context {
        Some(context) => {
            prompt.push_str(
                "You are a biomedical researcher making a comparative survival prediction.\n\n",
            );
            prompt.push_str("## Cohort-Level Context\n");
            prompt.push_str(
                "First, here are the summary characteristics for the entire patient cohort \
                 for the two features under consideration:\n\n",
            );
            prompt.push_str(&format!(
                "### Cohort Summary for Feature 1 ({}):\n{}\n\n",
                tool1_name, context.summary1
            ));
            prompt.push_str(&format!(
                "### Cohort Summary for Feature 2 ({}):\n{}\n\n---\n\n",
                tool2_name, context.summary2
            ));
            prompt.push_str("## Individual Patient Analysis\n");
            prompt.push_str(
                "Now, analyze the following specific patient in the context of the cohort \
                 summaries above.\n\n",
            );
        }
        None => {
            prompt.push_str("You are a biomedical researcher making a survival prediction.\n\n");
            prompt.push_str("## Individual Patient Analysis\n");
        }
    }

    prompt.push_str(&format!("### Patient Report for: {}\n", patient_id));
    prompt.push_str(&format!("- **Feature 1 ({})**: {}\n", tool1_name, report1));
    prompt.push_str(&format!("- **Feature 2 ({})**: {}\n\n---\n\n", tool2_name, report2));

    prompt.push_str("## Prediction Task\n");
    if context.is_some() {
        prompt.push_str(
            "Based on the individual patient's report **in comparison to the cohort context**, ",
        );
    } else {
        prompt.push_str("Based on the individual patient's report, ");
    }
    prompt.push_str(TASK);
    prompt.push_str("\n\n");
    prompt.push_str(ANSWER_FORMAT);
    prompt
}

/// One prompt covering several patients, answered by a single JSON object
/// keyed by patient id
pub fn batched_prompt(
    tool1_name: &str,
    tool2_name: &str,
    patients: &[(PatientId, String, String)],
) -> String {
    let mut prompt = String::from(
        "You are a biomedical researcher making comparative survival predictions for a \
         cohort of patients.\n\n## Patient Reports\n",
    );

    for (patient_id, report1, report2) in patients {
        prompt.push_str(&format!("\n### Patient Report for: {}\n", patient_id));
        prompt.push_str(&format!("- **Feature 1 ({})**: {}\n", tool1_name, report1));
        prompt.push_str(&format!("- **Feature 2 ({})**: {}\n", tool2_name, report2));
    }

    prompt.push_str("\n---\n\n## Prediction Task\nFor every patient above, ");
    prompt.push_str(TASK);
    prompt.push_str(
        "\n\nVery important ! Answer with a single JSON object keyed by patient id. Each \
         value has two fields:\n\
         - \"prediction\": either \"long survival\" or \"short survival\"\n\
         - \"reasoning\": a brief explanation (max 2-3 sentences)\n\n\
         For example:\n```json\n{\n",
    );
    let examples: Vec<String> = patients
        .iter()
        .take(2)
        .enumerate()
        .map(|(i, (patient_id, _, _))| {
            let label = if i == 0 { "long survival" } else { "short survival" };
            format!(
                "  \"{}\": {{\"prediction\": \"{}\", \"reasoning\": \"brief explanation\"}}",
                patient_id, label
            )
        })
        .collect();
    prompt.push_str(&examples.join(",\n"));
    prompt.push_str("\n}\n```\n\nLet's predict!\n");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_prompt_orders_tools() {
        let prompt = patient_prompt(
            &"P1".into(),
            ("load_a_report", "alpha"),
            ("load_b_report", "beta"),
            None,
        );
        let first = prompt.find("alpha").unwrap();
        let second = prompt.find("beta").unwrap();
        assert!(first < second);
        assert!(prompt.contains("\"prediction\": \"long survival\""));
        assert!(prompt.contains("\"prediction\": \"short survival\""));
        assert!(!prompt.contains("Cohort-Level Context"));
    }

    #[test]
    fn test_patient_prompt_with_context() {
        let context = CohortContext {
            summary1: "cohort one".to_string(),
            summary2: "cohort two".to_string(),
        };
        let prompt = patient_prompt(
            &"P1".into(),
            ("load_a_report", "alpha"),
            ("load_b_report", "beta"),
            Some(&context),
        );
        assert!(prompt.contains("### Cohort Summary for Feature 1 (load_a_report):\ncohort one"));
        assert!(prompt.contains("### Cohort Summary for Feature 2 (load_b_report):\ncohort two"));
        assert!(prompt.contains("in comparison to the cohort context"));
    }

    #[test]
    fn test_cohort_summary_prompt() {
        let prompt = cohort_summary_prompt("load_a_report", &["r1", "r2"]);
        assert!(prompt.starts_with("The following are 2 individual medical reports about 'load_a_report'."));
        assert!(prompt.contains("r1\n---\nr2"));
    }

    #[test]
    fn test_batched_prompt_lists_patients() {
        let patients = vec![
            (PatientId::from("P1"), "a1".to_string(), "b1".to_string()),
            (PatientId::from("P2"), "a2".to_string(), "b2".to_string()),
        ];
        let prompt = batched_prompt("t1", "t2", &patients);
        assert!(prompt.contains("### Patient Report for: P1"));
        assert!(prompt.contains("### Patient Report for: P2"));
        assert!(prompt.contains("\"P2\": {\"prediction\": \"short survival\""));
    }
}
