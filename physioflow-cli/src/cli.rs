use clap::{Args, Parser, Subcommand};
use physioflow::alignment::RATINGS_COLUMN;
use physioflow::config::{DEFAULT_ANALYSIS_MODELS, DEFAULT_MAIN_CONFIG};
use physioflow::pipeline::PipelineStep;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "fMRI analysis pipeline runner")]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a pipeline step for the selected subjects
    Run(RunArgs),
    /// Build timing files for one subject/session
    Align(AlignArgs),
    /// Convert a binned timing file into a per-volume magnitude series
    Regressor(RegressorArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// The processing step to execute
    #[arg(long)]
    pub step: PipelineStep,

    /// Subject ids to process; overrides subject lists in configs
    #[arg(long = "subject", num_args = 1..)]
    pub subjects: Vec<String>,

    /// Analysis models for 'glm', 'all' or 'group_analysis'
    #[arg(long = "analysis", num_args = 1..)]
    pub analyses: Vec<String>,

    /// Session number; every configured session when omitted
    #[arg(long)]
    pub session: Option<String>,

    /// Number of subjects to process in parallel
    #[arg(long, alias = "n_procs", default_value_t = 1)]
    pub n_procs: usize,

    /// Group analysis model ('group_analysis', or 'all' to aggregate afterwards)
    #[arg(long, alias = "group_model")]
    pub group_model: Option<String>,

    /// Path to the site configuration
    #[arg(long, default_value = DEFAULT_MAIN_CONFIG)]
    pub config: PathBuf,

    /// Path to the analysis catalog
    #[arg(long, default_value = DEFAULT_ANALYSIS_MODELS)]
    pub models: PathBuf,

    /// Write the run summary as JSON to this file
    #[arg(long)]
    pub summary_json: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AlignArgs {
    /// Experiment design preset
    #[arg(long)]
    pub design: String,

    /// Event-related analysis export
    #[arg(long)]
    pub era: PathBuf,

    /// Directory holding the behavioral `_events.tsv` files
    #[arg(long)]
    pub events: PathBuf,

    /// Directory receiving the timing files
    #[arg(long)]
    pub output: PathBuf,

    /// Override the number of runs
    #[arg(long)]
    pub runs: Option<usize>,

    /// Per-trial ratings export (comma-separated, with a header row)
    #[arg(long)]
    pub ratings: Option<PathBuf>,

    /// Ratings column to read
    #[arg(long, default_value = RATINGS_COLUMN)]
    pub ratings_column: String,
}

#[derive(Args, Debug)]
pub struct RegressorArgs {
    /// Binned timing file
    #[arg(long)]
    pub timing: PathBuf,

    /// Output series, one value per line
    #[arg(long)]
    pub output: PathBuf,

    /// Recording lag in seconds
    #[arg(long, default_value_t = 0.0)]
    pub lag: f64,

    /// Volumes acquired without lag
    #[arg(long, default_value_t = 300)]
    pub volumes: usize,

    /// Repetition time in seconds
    #[arg(long, default_value_t = 2.0)]
    pub tr: f64,
}
