//! # ragops CLI
//!
//! ## Usage
//!
//! ```bash
//! ragops --config ./config/ragops.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragops serve` | Build the index and start the HTTP API |
//! | `ragops index [--show]` | Rebuild the index once (or show the last one) and print counts |
//! | `ragops documents` | List documents in the data directory |
//! | `ragops query "<q>"` | Query a running service |
//! | `ragops generate` | Generate QA pairs from documents |
//! | `ragops evaluate` | Score service answers and write CSV reports |
//!
//! `OPENAI_API_KEY` and other secrets are read from the environment; a
//! `.env` file in the working directory is loaded first.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragops::config::{self, Config};
use ragops::judge::Metric;
use ragops::{client, eval, generate, index, ingest, server};

const DEFAULT_LOG_FILTER: &str = "ragops=info,tower_http=info";

/// Retrieval API and LLM-judged evaluation tooling for RAG pipelines.
#[derive(Parser)]
#[command(name = "ragops", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragops.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from the data directory and serve the HTTP API.
    Serve,

    /// Rebuild the index once and exit.
    Index {
        /// Print the last persisted generation instead of rebuilding.
        #[arg(long)]
        show: bool,
    },

    /// List the documents in the data directory.
    Documents,

    /// Send a question to a running service and print the answer.
    Query {
        question: String,

        /// Service base URL (defaults to `[eval].endpoint`).
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Generate question/answer pairs from a folder of documents.
    Generate {
        /// Folder to scan (defaults to `[eval].docs_dir`).
        #[arg(long)]
        docs: Option<PathBuf>,

        /// Output JSON file (defaults to `[eval].qa_output`).
        #[arg(long)]
        out: Option<PathBuf>,

        #[arg(long)]
        questions_per_chunk: Option<usize>,
    },

    /// Query the service for every test case and score the answers.
    Evaluate {
        /// JSON test cases (defaults to `[eval].qa_output`).
        #[arg(long)]
        cases: Option<PathBuf>,

        /// Metrics to judge; repeat or comma-separate for several.
        #[arg(
            long = "metric",
            value_enum,
            value_delimiter = ',',
            default_values_t = [Metric::Correctness],
            conflicts_with = "all_metrics"
        )]
        metrics: Vec<Metric>,

        /// Judge every metric.
        #[arg(long)]
        all_metrics: bool,

        #[arg(long)]
        endpoint: Option<String>,

        /// Pass threshold in [0, 1].
        #[arg(long)]
        threshold: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let cfg = config::load_config(&cli.config)?;
            server::run_server(&cfg).await?;
        }
        Commands::Index { show: false } => {
            let cfg = config::load_config(&cli.config)?;
            let index = index::build_index(&cfg).await?;
            println!("index rebuilt");
            print_index_summary(&index);
        }
        Commands::Index { show: true } => {
            let cfg = config::load_config(&cli.config)?;
            match index::load_latest(&cfg).await? {
                Some(index) => {
                    println!("index built {}", index.built_at.format("%Y-%m-%d %H:%M:%S UTC"));
                    print_index_summary(&index);
                }
                None => println!("No index has been built yet"),
            }
        }
        Commands::Documents => {
            let cfg = config::load_config(&cli.config)?;
            let docs = ingest::list_documents(&cfg.storage.data_dir)?;
            if docs.is_empty() {
                println!("No documents in {}", cfg.storage.data_dir.display());
            }
            for doc in docs {
                println!("{:<40} {:>10} bytes  {}", doc.name, doc.size, format_mtime(doc.last_modified));
            }
        }
        Commands::Query { question, endpoint } => {
            // The client only needs an endpoint, so a missing file is fine.
            let cfg = if cli.config.exists() {
                config::load_config(&cli.config)?
            } else {
                Config::minimal()
            };
            let endpoint = endpoint.unwrap_or(cfg.eval.endpoint);
            run_query(&endpoint, &question).await?;
        }
        Commands::Generate {
            docs,
            out,
            questions_per_chunk,
        } => {
            let mut cfg = config::load_config(&cli.config)?;
            if let Some(n) = questions_per_chunk {
                cfg.eval.questions_per_chunk = n;
            }
            let docs_dir = docs.unwrap_or_else(|| cfg.eval.docs_dir.clone());
            let out = out.unwrap_or_else(|| cfg.eval.qa_output.clone());

            let paths = generate::collect_document_paths(&docs_dir)?;
            println!("Found {} documents in {}", paths.len(), docs_dir.display());

            let generator = generate::QaGenerator::from_config(&cfg)?;
            let goldens = generator.generate(&paths).await?;
            let questions = generate::save_goldens(&out, &goldens)?;
            println!("Generated {} QA pairs", goldens.len());
            println!("  pairs:     {}", out.display());
            println!("  questions: {}", questions.display());
        }
        Commands::Evaluate {
            cases,
            metrics,
            all_metrics,
            endpoint,
            threshold,
        } => {
            let mut cfg = config::load_config(&cli.config)?;
            if let Some(endpoint) = endpoint {
                cfg.eval.endpoint = endpoint;
            }
            if let Some(threshold) = threshold {
                if !(0.0..=1.0).contains(&threshold) {
                    anyhow::bail!("--threshold must be in [0.0, 1.0]");
                }
                cfg.eval.threshold = threshold;
            }
            let metrics = if all_metrics { Metric::ALL.to_vec() } else { metrics };
            let cases = cases.unwrap_or_else(|| cfg.eval.qa_output.clone());
            eval::run_evaluation(&cfg, &cases, &metrics).await?;
        }
    }

    Ok(())
}

fn print_index_summary(index: &index::VectorIndex) {
    println!("  generation: {}", index.generation);
    println!("  documents:  {}", index.document_count);
    println!("  nodes:      {}", index.nodes.len());
}

async fn run_query(endpoint: &str, question: &str) -> anyhow::Result<()> {
    let client = client::RagClient::new(endpoint)?;
    let answer = client.query(question).await?;

    println!("{}", answer.response);
    if !answer.contexts.is_empty() {
        println!("\nContexts:");
    }
    for (i, ctx) in answer.contexts.iter().enumerate() {
        let score = ctx
            .score
            .map(|s| format!("{:.3}", s))
            .unwrap_or_else(|| "-".to_string());
        println!("{}. [{}] {}", i + 1, score, ctx.file_name);
        println!("   > {}", ctx.text_preview.replace('\n', " "));
    }
    Ok(())
}

fn format_mtime(secs: f64) -> String {
    chrono::DateTime::from_timestamp(secs as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}
