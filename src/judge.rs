//! LLM-as-judge scoring.
//!
//! The judge is asked for `{"score": 0-10, "reason": "..."}`; the score is
//! clamped and normalised to `[0, 1]`. Context relevancy is judged once per
//! retrieved context and averaged.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RagError, Result};
use crate::llm::{extract_json, LlmClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Metric {
    /// Actual output agrees with the expected output (G-Eval style).
    Correctness,
    /// Actual output is supported by the reference (or retrieved) context.
    Faithfulness,
    /// Actual output addresses the question.
    Relevancy,
    /// Each retrieved context is relevant to the question.
    #[value(name = "context_relevancy")]
    ContextRelevancy,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Correctness,
        Metric::Faithfulness,
        Metric::Relevancy,
        Metric::ContextRelevancy,
    ];

    /// Prefix used for this metric's report columns.
    pub fn column(&self) -> &'static str {
        match self {
            Metric::Correctness => "Correctness",
            Metric::Faithfulness => "Faithfulness",
            Metric::Relevancy => "Relevancy",
            Metric::ContextRelevancy => "Context_Relevancy",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Correctness => "correctness",
            Metric::Faithfulness => "faithfulness",
            Metric::Relevancy => "relevancy",
            Metric::ContextRelevancy => "context_relevancy",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub score: f64,
    pub reason: String,
}

/// Everything the judge may look at for one case.
pub struct JudgeInput<'a> {
    pub input: &'a str,
    pub actual_output: &'a str,
    pub expected_output: &'a str,
    /// Ground-truth passages from the test case; may be empty.
    pub reference_contexts: &'a [String],
    /// What the service retrieved for this question.
    pub retrieved_contexts: &'a [String],
}

impl JudgeInput<'_> {
    /// Faithfulness is checked against the reference passages when the case
    /// carries them, and against the retrieved ones otherwise.
    fn grounding(&self) -> &[String] {
        if self.reference_contexts.is_empty() {
            self.retrieved_contexts
        } else {
            self.reference_contexts
        }
    }
}

const CORRECTNESS_CRITERIA: &str =
    "Determine whether the actual output is factually correct based on the expected output.";
const CORRECTNESS_STEPS: &[&str] = &[
    "Check whether the facts in 'actual output' contradict any facts in 'expected output'",
    "Heavily penalize omission of detail",
    "Vague language, or contradicting OPINIONS, are OK",
];

pub struct Judge {
    client: LlmClient,
}

impl Judge {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    pub async fn evaluate(&self, metric: Metric, case: &JudgeInput<'_>) -> Result<Verdict> {
        if metric == Metric::ContextRelevancy {
            return self.context_relevancy(case).await;
        }
        self.ask(&build_prompt(metric, case)).await
    }

    async fn ask(&self, prompt: &str) -> Result<Verdict> {
        let reply = self.client.complete(None, prompt).await?;
        parse_verdict(&reply)
    }

    async fn context_relevancy(&self, case: &JudgeInput<'_>) -> Result<Verdict> {
        if case.retrieved_contexts.is_empty() {
            return Ok(Verdict {
                score: 0.0,
                reason: "no contexts were retrieved".to_string(),
            });
        }

        let mut total = 0.0;
        let mut reasons = Vec::with_capacity(case.retrieved_contexts.len());
        for (i, context) in case.retrieved_contexts.iter().enumerate() {
            let verdict = self.ask(&context_prompt(case.input, context)).await?;
            total += verdict.score;
            reasons.push(format!("[{}] {}", i + 1, verdict.reason));
        }

        Ok(Verdict {
            score: total / case.retrieved_contexts.len() as f64,
            reason: reasons.join(" "),
        })
    }
}

fn build_prompt(metric: Metric, case: &JudgeInput<'_>) -> String {
    let task = match metric {
        Metric::Correctness => {
            let steps = CORRECTNESS_STEPS
                .iter()
                .enumerate()
                .map(|(i, s)| format!("{}. {}", i + 1, s))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "Criteria: {}\n\nEvaluation steps:\n{}\n\nInput: {}\n\nExpected output: {}\n\nActual output: {}",
                CORRECTNESS_CRITERIA, steps, case.input, case.expected_output, case.actual_output
            )
        }
        Metric::Faithfulness => format!(
            "Criteria: Determine whether every claim in the actual output is supported by the \
             retrieval context. Unsupported or contradicting claims lower the score.\n\n\
             Retrieval context:\n{}\n\nActual output: {}",
            format_contexts(case.grounding()),
            case.actual_output
        ),
        Metric::Relevancy => format!(
            "Criteria: Determine whether the actual output directly answers the input. \
             Irrelevant or off-topic statements lower the score.\n\n\
             Input: {}\n\nActual output: {}",
            case.input, case.actual_output
        ),
        Metric::ContextRelevancy => {
            return context_prompt(case.input, &format_contexts(case.retrieved_contexts));
        }
    };
    wrap_task(&task)
}

fn context_prompt(input: &str, context: &str) -> String {
    wrap_task(&format!(
        "Criteria: Determine whether the retrieved context contains information that helps \
         answer the input. Unrelated passages lower the score.\n\n\
         Input: {}\n\nRetrieved context: {}",
        input, context
    ))
}

fn wrap_task(task: &str) -> String {
    format!(
        "You are an expert evaluator of question answering systems.\n\n{}\n\n\
         Score from 0 (worst) to 10 (best). Respond with only this JSON:\n\
         {{\"score\": <0-10>, \"reason\": \"<brief explanation>\"}}",
        task
    )
}

fn format_contexts(contexts: &[String]) -> String {
    if contexts.is_empty() {
        return "(none)".to_string();
    }
    contexts
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{}] {}", i + 1, c))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_verdict(reply: &str) -> Result<Verdict> {
    #[derive(Deserialize)]
    struct RawVerdict {
        score: f64,
        #[serde(default)]
        reason: String,
    }

    let raw: RawVerdict = serde_json::from_str(extract_json(reply)).map_err(|e| {
        RagError::Llm(format!(
            "Failed to parse judge response: {}. Response: {}",
            e, reply
        ))
    })?;

    if !raw.score.is_finite() {
        return Err(RagError::Llm(format!("judge returned no usable score: {}", reply)));
    }

    Ok(Verdict {
        score: raw.score.clamp(0.0, 10.0) / 10.0,
        reason: raw.reason,
    })
}
