//! lt-attention CLI: cross-attention analysis of tensification

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use lt_attention::{
    prepare_corpus, summarize, summary::print_summary, AnalysisConfig, AnalysisMode, ErrorPolicy,
    Experiment,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "lt-attention")]
#[command(about = "Cross-attention to syllable alignment for tensification studies")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge per-example feature grids into condition buckets
    Aggregate(AggregateArgs),
    /// Combine decoder dump shards into an aligned example corpus
    Prepare {
        /// Directory holding attentions_*.json shards
        #[arg(short, long)]
        shards: PathBuf,

        /// Output path for the aligned corpus JSON
        #[arg(short, long, default_value = "combined_attention_aligned_for_analysis.json")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct AggregateArgs {
    /// Path to aligned example corpus JSON
    #[arg(short, long, default_value = "combined_attention_aligned_for_analysis.json")]
    examples: PathBuf,

    /// Path to the stimulus reference table (TSV)
    #[arg(short, long, default_value = "stimuli.tsv")]
    reference: PathBuf,

    /// Output JSON file for bucket grids
    #[arg(short, long, default_value = "compare_lt_nonlt_attn.json")]
    output: PathBuf,

    /// Analysis to run
    #[arg(short, long, value_enum, default_value_t = AnalysisMode::Stimuli)]
    mode: AnalysisMode,

    /// Decoder layers (grid rows)
    #[arg(long, default_value_t = 4)]
    layers: usize,

    /// Attention heads per layer (grid columns)
    #[arg(long, default_value_t = 2)]
    heads: usize,

    /// Skip examples that cannot be processed and report them
    #[arg(long)]
    skip_invalid: bool,

    /// Only check that every example aligns and classifies
    #[arg(long)]
    validate_only: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Aggregate(args) => aggregate(args),
        Command::Prepare { shards, output } => {
            let corpus = prepare_corpus(&shards)?;
            corpus.save(&output)?;
            info!("Corpus saved to {}", output.display());
            Ok(())
        }
    }
}

fn aggregate(args: AggregateArgs) -> Result<()> {
    let config = AnalysisConfig {
        examples_path: args.examples,
        reference_path: args.reference,
        output_path: args.output,
        mode: args.mode,
        n_layers: args.layers,
        n_heads: args.heads,
        error_policy: if args.skip_invalid {
            ErrorPolicy::SkipAndReport
        } else {
            ErrorPolicy::FailFast
        },
    };

    println!("=== lt-attention: {} analysis ===", config.mode);
    println!("Examples:  {}", config.examples_path.display());
    println!("Reference: {}", config.reference_path.display());
    println!("Grid:      {} layers x {} heads", config.n_layers, config.n_heads);

    let experiment = Experiment::load(config)?;

    if args.validate_only {
        let report = experiment.validate();
        println!("\n=== Validation ===");
        println!("Checked: {}", report.checked);
        for (bucket, n) in &report.bucket_counts {
            println!("  {bucket:<18} {n:>5}");
        }
        for problem in &report.problems {
            println!("  ! {} ({}): {}", problem.token, problem.kind, problem.reason);
        }
        anyhow::ensure!(
            report.is_clean(),
            "{} of {} examples failed validation",
            report.problems.len(),
            report.checked
        );
        return Ok(());
    }

    let results = experiment.run()?;

    println!("\n=== Buckets ===");
    for (name, grid) in &results.buckets {
        print_summary(&summarize(name, grid));
    }
    if !results.skipped.is_empty() {
        println!("\nSkipped {} examples:", results.skipped.len());
        for skipped in &results.skipped {
            println!("  {} ({}): {}", skipped.token, skipped.kind, skipped.reason);
        }
    }

    let output = &experiment.config().output_path;
    results.save(output)?;
    info!("Results saved to {}", output.display());

    Ok(())
}
