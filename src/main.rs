//! quaestio CLI - generate, review, and export medical exam questions.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quaestio::{
    Config, QuestionPipeline, QuestionStore, SpreadsheetExporter, provider,
};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "quaestio")]
#[command(version)]
#[command(about = "LLM pipeline for multiple-choice medical exam questions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the question pipeline over a focus list
    Run {
        /// Path to input focuses JSONL file
        #[arg(short, long)]
        input: PathBuf,

        /// Skip focuses already completed according to the stored state
        #[arg(long)]
        resume: bool,
    },

    /// Export stored questions to a spreadsheet
    Export {
        /// Output .xlsx path (default: from config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum number of rows to export
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show aggregate metrics from the store
    Stats,

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# quaestio configuration file

[provider]
kind = "openai"           # or "anthropic"
# api_key_env = "OPENAI_API_KEY"
concurrency = 5
timeout_secs = 30.0

[generation]
model = "gpt-4o"
temperature = 0.7
subtopics_per_focus = 50
difficulty = 2            # 1-3 (Bloom taxonomy)
max_review_rounds = 3
prompts_dir = "prompts"
concurrent_questions = 5
checkpoint_every = 10

[output]
database = "output/pipeline.db"
spreadsheet = "output/questions.xlsx"
include_rejected = false
"#;
    println!("{example}");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            config
                .resolve_api_key()
                .context("Failed to resolve API key")?;

            info!("Configuration is valid");
            info!("  Provider: {}", config.provider.kind.as_str());
            info!("  Model: {}", config.generation.model);
            info!("  Concurrency: {}", config.provider.concurrency);
            info!(
                "  Subtopics per focus: {}",
                config.generation.subtopics_per_focus
            );
            return Ok(());
        }

        Commands::Run { input, resume } => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            let provider = provider::from_config(&config).context("Failed to build provider")?;
            let store = QuestionStore::open(&config.output.database)
                .await
                .context("Failed to open question store")?;

            let focuses = QuestionPipeline::load_focuses(&input)
                .with_context(|| format!("Failed to load focuses from {input:?}"))?;

            let pipeline = QuestionPipeline::new(config, provider, store)
                .await
                .context("Failed to build pipeline")?;

            let metrics = pipeline.run(focuses, resume).await?;

            println!("\n=== Question Generation Complete ===");
            println!("Questions:   {}", metrics.total_questions);
            println!("Approved:    {}", metrics.approved);
            println!("Rejected:    {}", metrics.rejected);
            println!("Failed:      {}", metrics.failed);
            println!("Approval:    {:.1}%", metrics.approval_rate * 100.0);
            println!("Cost:        ${:.4}", metrics.total_cost);
            println!("Runtime:     {:.1}s", metrics.runtime_secs);
        }

        Commands::Export { output, limit } => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            let store = QuestionStore::open(&config.output.database)
                .await
                .context("Failed to open question store")?;

            let output = output.unwrap_or_else(|| config.output.spreadsheet.clone());
            let rows = SpreadsheetExporter::new()
                .include_rejected(config.output.include_rejected)
                .export(&store, &output, limit)
                .await?;

            println!("Exported {rows} questions to {output:?}");
        }

        Commands::Stats => {
            let config = Config::from_file(&cli.config)
                .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

            let store = QuestionStore::open(&config.output.database)
                .await
                .context("Failed to open question store")?;

            let metrics = store.batch_metrics().await?;
            println!("=== Batch Metrics ===");
            println!("Questions:   {}", metrics.total_questions);
            println!("Approved:    {}", metrics.approved);
            println!("Rejected:    {}", metrics.rejected);
            println!("Failed:      {}", metrics.failed);
            println!("Approval:    {:.1}%", metrics.approval_rate * 100.0);
            println!("Total cost:  ${:.4}", metrics.total_cost);

            let comparison = store.model_comparison().await?;
            if !comparison.is_empty() {
                println!("\n=== Model Comparison ===");
                for model in comparison {
                    println!(
                        "{:<24} n={:<5} approval={:>5.1}% agreement={:>5.1}% cost=${:.4} latency={:.2}s",
                        model.model,
                        model.questions,
                        model.approval_rate * 100.0,
                        model.agreement_rate * 100.0,
                        model.mean_cost,
                        model.mean_duration_secs,
                    );
                }
            }
        }
    }

    Ok(())
}
