//! CSV evaluation reports.
//!
//! A report collects one [`DetailRecord`] per test case and writes two
//! files into the results directory, both stamped with the time the report
//! was created:
//!
//! - `detailed_results_<ts>.csv`: one row per case, with a score and a
//!   reason column for every metric judged
//! - `summary_results_<ts>.csv`: a single [`Summary`] row
//!
//! A case passes when every metric scores at or above the threshold.

use chrono::Local;
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};
use crate::judge::Metric;
use crate::models::ContextRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct MetricScore {
    pub metric: Metric,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetailRecord {
    pub test_case_id: usize,
    pub input_query: String,
    pub expected_output: String,
    pub actual_output: String,
    pub scores: Vec<MetricScore>,
    /// Mean of `scores`.
    pub score: f64,
    pub status: String,
    pub context_files: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSummary {
    pub metric: Metric,
    pub average: f64,
    pub passed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub timestamp: String,
    pub total_test_cases: usize,
    pub average_score: f64,
    pub success_rate: f64,
    pub failed_queries: usize,
    pub passed_cases: usize,
    pub failed_cases: usize,
    pub metrics: Vec<MetricSummary>,
}

pub struct EvaluationReport {
    results_dir: PathBuf,
    threshold: f64,
    metrics: Vec<Metric>,
    timestamp: String,
    records: Vec<DetailRecord>,
}

impl EvaluationReport {
    /// Creates `results_dir` if needed. `metrics` fixes the column layout.
    pub fn new(results_dir: &Path, threshold: f64, metrics: &[Metric]) -> Result<Self> {
        std::fs::create_dir_all(results_dir).map_err(|e| RagError::io(results_dir, e))?;
        Ok(Self {
            results_dir: results_dir.to_path_buf(),
            threshold,
            metrics: metrics.to_vec(),
            timestamp: Local::now().format("%Y%m%d_%H%M%S").to_string(),
            records: Vec::new(),
        })
    }

    pub fn records(&self) -> &[DetailRecord] {
        &self.records
    }

    pub fn add_result(
        &mut self,
        test_case_id: usize,
        input_query: &str,
        expected_output: &str,
        actual_output: &str,
        scores: Vec<MetricScore>,
        contexts: &[ContextRecord],
    ) {
        let score = mean(scores.iter().map(|s| s.score));
        let passed = !scores.is_empty() && scores.iter().all(|s| s.score >= self.threshold);
        let context_files = contexts
            .iter()
            .map(|c| c.file_name.as_str())
            .collect::<Vec<_>>()
            .join(";");

        self.records.push(DetailRecord {
            test_case_id,
            input_query: input_query.to_string(),
            expected_output: expected_output.to_string(),
            actual_output: actual_output.to_string(),
            scores,
            score,
            status: if passed { "PASS" } else { "FAIL" }.to_string(),
            context_files,
        });
    }

    pub fn summary(&self) -> Summary {
        let total = self.records.len();
        let passed = self.records.iter().filter(|r| r.status == "PASS").count();
        let success_rate = if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64 * 100.0
        };

        let metrics = self
            .metrics
            .iter()
            .map(|&metric| {
                let scores: Vec<f64> = self
                    .records
                    .iter()
                    .filter_map(|r| r.scores.iter().find(|s| s.metric == metric))
                    .map(|s| s.score)
                    .collect();
                MetricSummary {
                    metric,
                    average: round2(mean(scores.iter().copied())),
                    passed: scores.iter().filter(|&&s| s >= self.threshold).count(),
                }
            })
            .collect();

        Summary {
            timestamp: self.timestamp.clone(),
            total_test_cases: total,
            average_score: round2(mean(self.records.iter().map(|r| r.score))),
            success_rate: round2(success_rate),
            failed_queries: self
                .records
                .iter()
                .filter(|r| r.actual_output.is_empty())
                .count(),
            passed_cases: passed,
            failed_cases: total - passed,
            metrics,
        }
    }

    pub fn detail_headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = ["Test_Case_ID", "Input_Query", "Expected_Output", "Actual_Output"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        for metric in &self.metrics {
            headers.push(format!("{}_Score", metric.column()));
            headers.push(format!("{}_Reason", metric.column()));
        }
        headers.extend(["Score", "Status", "Context_Files"].iter().map(|h| h.to_string()));
        headers
    }

    pub fn summary_headers(&self) -> Vec<String> {
        let mut headers: Vec<String> = SUMMARY_HEADERS.iter().map(|h| h.to_string()).collect();
        for metric in &self.metrics {
            headers.push(format!("Average_{}", metric.column()));
            headers.push(format!("Passed_{}", metric.column()));
        }
        headers
    }

    /// Write both CSV files; returns `(detailed, summary)` paths.
    pub fn save(&self) -> Result<(PathBuf, PathBuf)> {
        let detailed = self
            .results_dir
            .join(format!("detailed_results_{}.csv", self.timestamp));
        let mut writer = csv::Writer::from_path(&detailed)?;
        writer.write_record(self.detail_headers())?;
        for record in &self.records {
            writer.write_record(self.detail_row(record))?;
        }
        writer.flush().map_err(|e| RagError::io(&detailed, e))?;

        let summary_path = self
            .results_dir
            .join(format!("summary_results_{}.csv", self.timestamp));
        let summary = self.summary();
        let mut row = vec![
            summary.timestamp.clone(),
            summary.total_test_cases.to_string(),
            format_score(summary.average_score),
            format_score(summary.success_rate),
            summary.failed_queries.to_string(),
            summary.passed_cases.to_string(),
            summary.failed_cases.to_string(),
        ];
        for metric in &summary.metrics {
            row.push(format_score(metric.average));
            row.push(metric.passed.to_string());
        }
        let mut writer = csv::Writer::from_path(&summary_path)?;
        writer.write_record(self.summary_headers())?;
        writer.write_record(row)?;
        writer.flush().map_err(|e| RagError::io(&summary_path, e))?;

        Ok((detailed, summary_path))
    }

    fn detail_row(&self, record: &DetailRecord) -> Vec<String> {
        let mut row = vec![
            record.test_case_id.to_string(),
            record.input_query.clone(),
            record.expected_output.clone(),
            record.actual_output.clone(),
        ];
        for metric in &self.metrics {
            match record.scores.iter().find(|s| s.metric == *metric) {
                Some(s) => {
                    row.push(format_score(s.score));
                    row.push(s.reason.clone());
                }
                None => row.extend([String::new(), String::new()]),
            }
        }
        row.push(format_score(record.score));
        row.push(record.status.clone());
        row.push(record.context_files.clone());
        row
    }
}

const SUMMARY_HEADERS: [&str; 7] = [
    "Timestamp",
    "Total_Test_Cases",
    "Average_Score",
    "Success_Rate",
    "Failed_Queries",
    "Passed_Cases",
    "Failed_Cases",
];

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn format_score(value: f64) -> String {
    format!("{:.2}", value)
}
