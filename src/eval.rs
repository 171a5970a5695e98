//! Evaluation run: query the service for every test case, judge the
//! answers on each requested metric, and write the CSV reports.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::cases::load_test_cases;
use crate::client::RagClient;
use crate::config::Config;
use crate::judge::{Judge, JudgeInput, Metric};
use crate::llm::LlmClient;
use crate::models::QueryResponse;
use crate::report::{EvaluationReport, MetricScore, Summary};

pub struct EvaluationOutcome {
    pub summary: Summary,
    pub detailed_path: PathBuf,
    pub summary_path: PathBuf,
}

/// Score every case in `cases_path` against the service at
/// `config.eval.endpoint`, once per metric in `metrics`.
///
/// A failed service query is logged and judged as an empty answer; a failed
/// judgement is recorded with score 0 and the error as reason. Neither stops
/// the run.
pub async fn run_evaluation(
    config: &Config,
    cases_path: &Path,
    metrics: &[Metric],
) -> Result<EvaluationOutcome> {
    let mut selected: Vec<Metric> = Vec::with_capacity(metrics.len());
    for metric in metrics {
        if !selected.contains(metric) {
            selected.push(*metric);
        }
    }
    if selected.is_empty() {
        bail!("at least one metric is required");
    }

    let cases = load_test_cases(cases_path)
        .with_context(|| format!("Failed to load test cases from {}", cases_path.display()))?;
    let client = RagClient::new(&config.eval.endpoint)?;
    let judge = Judge::new(LlmClient::new(config.llm.clone())?);
    let mut report =
        EvaluationReport::new(&config.eval.results_dir, config.eval.threshold, &selected)?;

    let names: Vec<String> = selected.iter().map(Metric::to_string).collect();
    println!("Evaluating {} test cases ({})", cases.len(), names.join(", "));

    for (i, case) in cases.iter().enumerate() {
        let id = i + 1;
        println!("\nTest Case {}:", id);
        println!("  Input: {}", case.input);

        let answer = match client.query(&case.input).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!(case = id, error = %e, "query failed, continuing with empty answer");
                QueryResponse {
                    response: String::new(),
                    contexts: Vec::new(),
                }
            }
        };

        let retrieved: Vec<String> = answer
            .contexts
            .iter()
            .map(|c| c.text_preview.clone())
            .collect();
        let input = JudgeInput {
            input: &case.input,
            actual_output: &answer.response,
            expected_output: &case.expected_output,
            reference_contexts: &case.reference_contexts,
            retrieved_contexts: &retrieved,
        };

        let mut scores = Vec::with_capacity(selected.len());
        for &metric in &selected {
            let (score, reason) = match judge.evaluate(metric, &input).await {
                Ok(verdict) => (verdict.score, verdict.reason),
                Err(e) => {
                    tracing::error!(case = id, %metric, error = %e, "judge failed");
                    (0.0, e.to_string())
                }
            };
            println!("  {}: {:.2} ({})", metric, score, reason);
            scores.push(MetricScore {
                metric,
                score,
                reason,
            });
        }

        report.add_result(
            id,
            &case.input,
            &case.expected_output,
            &answer.response,
            scores,
            &answer.contexts,
        );
    }

    let (detailed_path, summary_path) = report.save()?;
    let summary = report.summary();

    println!("\nSummary");
    println!("  total:          {}", summary.total_test_cases);
    println!("  average score:  {:.2}", summary.average_score);
    println!("  success rate:   {:.2}%", summary.success_rate);
    println!("  failed queries: {}", summary.failed_queries);
    println!("  passed/failed:  {}/{}", summary.passed_cases, summary.failed_cases);
    for metric in &summary.metrics {
        println!(
            "  {:<18} avg {:.2}, passed {}",
            metric.metric.to_string(),
            metric.average,
            metric.passed
        );
    }
    println!("Results saved to:");
    println!("  Summary:  {}", summary_path.display());
    println!("  Detailed: {}", detailed_path.display());

    Ok(EvaluationOutcome {
        summary,
        detailed_path,
        summary_path,
    })
}
