use agentic_eval::config::Config;
use agentic_eval::discovery::discover;
use agentic_eval::logging;
use agentic_eval::pipeline::Orchestrator;
use agentic_eval::profile::ProfileRegistry;
use agentic_eval::reasoning::HttpReasoningClient;
use agentic_eval::report::{self, ReportFormat, RunReport};
use agentic_eval::retrieval::GuidelineIndex;
use agentic_eval::util::absolute_path;
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "agentic-eval",
    about = "Static analysis plus a two-stage model review, scored 0-100 per file",
    version
)]
struct Args {
    /// File or directory to evaluate
    path: PathBuf,

    /// Language profile: auto, python or csharp
    #[arg(long, default_value = "auto")]
    lang: String,

    /// Files evaluated in parallel (default from config, 4)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Skip guideline retrieval
    #[arg(long)]
    no_rag: bool,

    /// Export the report (.json or .csv)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file (default: ./agentic-eval.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Debug-level diagnostics on stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.workers = workers.max(1);
    }
    if args.no_rag {
        config.retrieval.enabled = false;
    }
    if let Some(output) = &args.output {
        ReportFormat::for_path(output)?;
    }

    let registry = ProfileRegistry::builtin();
    let language = match args.lang.trim().to_lowercase().as_str() {
        "" | "auto" => None,
        name => Some(name.to_string()),
    };
    let extensions = match &language {
        Some(name) => registry.by_name(name)?.extensions().to_vec(),
        None => registry.extensions(),
    };

    let files = discover(&args.path, &extensions, language.is_some())?;
    if files.is_empty() {
        println!(
            "No supported files found under {} ({}).",
            args.path.display(),
            extensions.join(", ")
        );
        return Ok(());
    }
    print!("{}", report::render_tree(&absolute_path(&args.path), &files));
    println!("{}\n", report::discovery_line(&files));

    let transport = HttpReasoningClient::new(config.llm.clone())
        .context("Failed to initialize reasoning client")?;
    let mut orchestrator =
        Orchestrator::from_config(&config, Arc::new(registry), Arc::new(transport))
            .with_language(language);
    if config.retrieval.enabled {
        let dir = config.retrieval.knowledge_base.clone();
        let index = tokio::task::spawn_blocking(move || GuidelineIndex::load(&dir)).await?;
        orchestrator = orchestrator.with_retriever(Arc::new(index));
    }

    eprintln!(
        "Evaluating {} file(s) with {} worker(s)...",
        files.len(),
        orchestrator.workers()
    );
    let started = Instant::now();
    let results = orchestrator.run(files).await;
    let report = RunReport::new(results, started.elapsed(), orchestrator.workers());

    print!("{}", report::render_console(&report));
    if let Some(output) = &args.output {
        report::export(&report, output)?;
        println!("Report saved to {}", output.display());
    }
    Ok(())
}
