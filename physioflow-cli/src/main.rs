//! Command-line front end for physioflow.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{AlignArgs, Cli, Command, RegressorArgs, RunArgs};
use physioflow::alignment::{write_regressor, Acquisition, ExperimentDesign, TimingBuilder, PRESET_NAMES};
use physioflow::config::{AnalysisCatalog, PipelineConfig};
use physioflow::events::LoggingEventSink;
use physioflow::observability::{init_tracing, LogFormat, SpanTimer};
use physioflow::pipeline::{Orchestrator, RunRequest, RunSummary};
use physioflow::stages::ScriptRunner;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = if cli.log_json { LogFormat::Json } else { LogFormat::Pretty };
    init_tracing(format)?;

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Align(args) => align(&args),
        Command::Regressor(args) => regressor(&args),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = PipelineConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let catalog = AnalysisCatalog::load(&args.models)
        .with_context(|| format!("loading {}", args.models.display()))?;

    let mut request = RunRequest::new(args.step)
        .with_subjects(args.subjects)
        .with_analyses(args.analyses)
        .with_n_procs(args.n_procs);
    if let Some(session) = args.session {
        request = request.with_session(session);
    }
    if let Some(group_model) = args.group_model {
        request = request.with_group_model(group_model);
    }

    let runner = Arc::new(ScriptRunner::from_config(&config));
    let orchestrator = Orchestrator::new(config, catalog, runner).with_sink(Arc::new(LoggingEventSink::debug()));

    let timer = SpanTimer::start("run");
    let summary = orchestrator.run(&request).await?;
    info!(run_id = %summary.run_id, elapsed_ms = timer.finish(), "Run finished");

    if let Some(path) = &args.summary_json {
        std::fs::write(path, summary.to_json()?)
            .with_context(|| format!("writing summary to {}", path.display()))?;
    }
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    for unit in &summary.units {
        match &unit.reason {
            Some(reason) => println!("  {} ses-{}: {} ({reason})", unit.subject, unit.session, unit.state),
            None => println!("  {} ses-{}: {}", unit.subject, unit.session, unit.state),
        }
    }
    if let Some(group) = &summary.group {
        println!(
            "  group {}/{}: {} ({} included, {} excluded)",
            group.analysis,
            group.group_model,
            group.status,
            group.included.len(),
            group.excluded.len()
        );
    }
    println!("==============================");
    println!(" All processing complete");
    println!(
        " {} completed, {} aborted, {} skipped",
        summary.completed(),
        summary.aborted(),
        summary.skipped()
    );
    println!("==============================");
}

fn align(args: &AlignArgs) -> Result<()> {
    let mut design = ExperimentDesign::preset(&args.design)
        .with_context(|| format!("unknown design '{}', expected one of {PRESET_NAMES:?}", args.design))?;
    if let Some(runs) = args.runs {
        design = design.with_runs(runs);
    }

    let mut builder = TimingBuilder::new(design, &args.era, &args.events, &args.output);
    if let Some(ratings) = &args.ratings {
        builder = builder.with_ratings(ratings).with_ratings_column(&args.ratings_column);
    }
    let report = builder.build()?;

    info!(
        files = report.files.len(),
        records = report.records,
        nan_records = report.nan_records,
        "Timing files written to {}", args.output.display()
    );
    for file in &report.files {
        println!("{}", file.display());
    }
    Ok(())
}

fn regressor(args: &RegressorArgs) -> Result<()> {
    let acquisition = Acquisition {
        lag: args.lag,
        volumes: args.volumes,
        tr: args.tr,
    };
    let volumes = write_regressor(&args.timing, &args.output, acquisition)?;
    info!(volumes, output = %args.output.display(), "Regressor written");
    Ok(())
}
