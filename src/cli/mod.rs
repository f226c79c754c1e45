//! Command-line interface: training, prediction, serving and dataset helpers

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::data::{download_diamonds, generate_diamonds, load_diamonds, write_csv, DIAMONDS_URL};
use crate::error::DiamondError;
use crate::export::ModelRegistry;
use crate::inference::{ModelCache, ModelResolver, Predictor, ServeConfig};
use crate::preprocessing::{DiamondFeatures, FeatureSchema};
use crate::tracking::{FileTracker, TrackingUri};
use crate::training::{format_max_depth, parse_max_depth, train, TrainingConfig, WorkflowStage};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<16} {}", muted(key), val.white());
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

/// `--max-depth` value: a positive integer or `unbounded`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxDepth(pub Option<usize>);

fn parse_max_depth_arg(s: &str) -> Result<MaxDepth, String> {
    parse_max_depth(s).map(MaxDepth).map_err(|e| e.to_string())
}

#[derive(Parser)]
#[command(name = "diamond-price")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train, track and serve a diamond price regression model")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train the pipeline, persist it and log the run
    Train(TrainArgs),

    /// Predict the price of one diamond with the persisted model
    Predict(PredictArgs),

    /// Start the prediction web server
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Write a synthetic diamonds dataset
    GenerateData {
        #[arg(short, long, default_value = "5000")]
        rows: usize,

        #[arg(long, default_value = "42")]
        seed: u64,

        #[arg(short, long, default_value = crate::training::DEFAULT_DATA_PATH)]
        output: PathBuf,
    },

    /// Download the public diamonds dataset
    FetchData {
        #[arg(long, default_value = DIAMONDS_URL)]
        url: String,

        #[arg(short, long, default_value = crate::training::DEFAULT_DATA_PATH)]
        output: PathBuf,
    },

    /// List tracked runs of an experiment (file tracker only)
    Runs {
        #[arg(long)]
        tracking_uri: Option<String>,

        #[arg(long)]
        experiment: Option<String>,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// List registered models with their versions and aliases
    Models {
        /// Registry directory (default: MODEL_REGISTRY_DIR or mlruns/registry)
        #[arg(long)]
        registry_dir: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct TrainArgs {
    /// Dataset CSV (defaults to DIAMONDS_DATA_PATH or data/diamonds.csv)
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// Train on N generated rows instead of a CSV
    #[arg(long, conflicts_with = "data")]
    pub synthetic: Option<usize>,

    /// Tree depth limit, a positive integer or `unbounded`
    #[arg(long, value_parser = parse_max_depth_arg)]
    pub max_depth: Option<MaxDepth>,

    /// Fraction of rows held out for evaluation
    #[arg(long)]
    pub test_size: Option<f64>,

    #[arg(long)]
    pub random_state: Option<u64>,

    #[arg(long)]
    pub tracking_uri: Option<String>,

    #[arg(long)]
    pub experiment: Option<String>,

    #[arg(long)]
    pub run_name: Option<String>,

    /// Where to write the pipeline artifact
    #[arg(long)]
    pub model_path: Option<PathBuf>,

    /// Register the artifact under this model name
    #[arg(long)]
    pub register_model: Option<String>,

    /// Alias pointed at the registered version
    #[arg(long)]
    pub alias: Option<String>,
}

impl TrainArgs {
    /// Flags override the environment-backed defaults
    pub fn to_config(&self) -> TrainingConfig {
        let mut config = TrainingConfig::default();
        if let Some(MaxDepth(depth)) = self.max_depth {
            config.max_depth = depth;
        }
        if let Some(test_size) = self.test_size {
            config.test_size = test_size;
        }
        if let Some(seed) = self.random_state {
            config.random_state = seed;
        }
        if let Some(ref uri) = self.tracking_uri {
            config.tracking_uri = uri.clone();
        }
        if let Some(ref experiment) = self.experiment {
            config.experiment_name = experiment.clone();
        }
        if let Some(ref path) = self.model_path {
            config.model_path = path.clone();
        }
        if let Some(ref path) = self.data {
            config.data_path = path.clone();
        }
        if let Some(ref alias) = self.alias {
            config.alias = alias.clone();
        }
        config.run_name = self.run_name.clone();
        config.register_model = self.register_model.clone();
        config
    }
}

#[derive(clap::Args, Debug)]
pub struct PredictArgs {
    /// Artifact to load (defaults to MODEL_PATH)
    #[arg(long)]
    pub model_path: Option<PathBuf>,

    /// Resolve through the model registry first
    #[arg(long)]
    pub use_registry: bool,

    #[arg(long)]
    pub model_uri: Option<String>,

    #[arg(long, default_value = "0.7")]
    pub carat: f64,
    #[arg(long, default_value = "Premium")]
    pub cut: String,
    #[arg(long, default_value = "G")]
    pub color: String,
    #[arg(long, default_value = "VS2")]
    pub clarity: String,
    #[arg(long, default_value = "61.5")]
    pub depth: f64,
    #[arg(long, default_value = "57.0")]
    pub table: f64,
    #[arg(long, default_value = "5.5")]
    pub x: f64,
    #[arg(long, default_value = "5.5")]
    pub y: f64,
    #[arg(long, default_value = "3.4")]
    pub z: f64,
}

impl PredictArgs {
    pub fn features(&self) -> DiamondFeatures {
        DiamondFeatures {
            carat: self.carat,
            cut: self.cut.clone(),
            color: self.color.clone(),
            clarity: self.clarity.clone(),
            depth: self.depth,
            table: self.table,
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }

    pub fn serve_config(&self) -> ServeConfig {
        let mut config = ServeConfig::default();
        if let Some(ref path) = self.model_path {
            config.model_path = path.clone();
        }
        if self.use_registry {
            config.use_registry = true;
        }
        if let Some(ref uri) = self.model_uri {
            config.model_uri = uri.clone();
        }
        config
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(args: &TrainArgs) -> anyhow::Result<()> {
    let config = args.to_config();
    config.validate()?;
    section("Train");

    step_run("Loading data");
    let start = Instant::now();
    let df = match args.synthetic {
        Some(n) => generate_diamonds(n, config.random_state)?,
        None => load_diamonds(&config.data_path)?,
    };
    step_done(&format!("{} rows × {} cols in {:?}", df.height(), df.width(), start.elapsed()));

    step_run(&format!(
        "Training tree (max_depth={})",
        format_max_depth(config.max_depth).cyan()
    ));
    let report = train(config.clone(), &df).map_err(training_failure)?;
    step_done(&format!("{:.2}s", report.elapsed_secs));

    println!();
    for (name, value) in report.metrics.as_pairs() {
        println!("  {:<16} {}", muted(name), format!("{:.4}", value).white().bold());
    }
    kv("Train / test", &format!("{} / {}", report.n_train, report.n_test));
    kv("Artifact", &report.model_path.display().to_string());
    match (&report.run_id, report.final_stage) {
        (Some(run_id), WorkflowStage::Logged) => kv("Run", run_id),
        _ => {
            let reason = report.tracking_error.as_deref().unwrap_or("unknown error");
            println!("  {:<16} {}", muted("Tracking"), format!("not logged ({})", reason).yellow());
        }
    }
    if let (Some(name), Some(version)) = (&config.register_model, report.registered_version) {
        kv("Registered", &format!("models:/{}/{} @{}", name, version, config.alias));
    }
    println!();
    Ok(())
}

/// Data contract failures get a pointer at the expected dataset layout
fn training_failure(err: DiamondError) -> anyhow::Error {
    if err.is_data_error() {
        anyhow::anyhow!(
            "{}\n  expected columns: {}, price",
            err,
            FeatureSchema::diamonds()
                .fields()
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    } else {
        err.into()
    }
}

pub fn cmd_predict(args: &PredictArgs) -> anyhow::Result<()> {
    let features = args.features();
    let predictor = Predictor::new(ModelResolver::new(args.serve_config(), ModelCache::new().into()));

    section("Predict");
    let (price, source) = predictor.predict_one(&features)?;
    kv("Model", &source.to_string());
    println!("  {:<16} {}", muted("Price"), format!("${:.2}", price).white().bold());
    println!();
    Ok(())
}

pub fn cmd_generate_data(rows: usize, seed: u64, output: &Path) -> anyhow::Result<()> {
    section("Generate data");
    step_run(&format!("Generating {} rows", rows));
    let mut df = generate_diamonds(rows, seed)?;
    write_csv(&mut df, output)?;
    step_done(&output.display().to_string());
    println!();
    Ok(())
}

pub fn cmd_fetch_data(url: &str, output: &Path) -> anyhow::Result<()> {
    section("Fetch data");
    step_run(&format!("Downloading {}", url));
    let bytes = download_diamonds(url, output)?;
    step_done(&format!("{} bytes to {}", bytes, output.display()));
    println!();
    Ok(())
}

pub fn cmd_runs(tracking_uri: Option<&str>, experiment: Option<&str>, limit: usize) -> anyhow::Result<()> {
    let defaults = TrainingConfig::default();
    let uri = TrackingUri::parse(tracking_uri.unwrap_or(&defaults.tracking_uri))?;
    let experiment = experiment.unwrap_or(&defaults.experiment_name);
    let root = match uri {
        TrackingUri::File(root) => root,
        TrackingUri::Http(url) => anyhow::bail!("listing runs needs a file tracker; browse {} instead", url),
    };

    let tracker = FileTracker::open(&root)?;
    let runs = tracker.list_runs(experiment)?;
    section(&format!("Runs of {}", experiment));
    if runs.is_empty() {
        println!("  {}", dim("no runs recorded"));
    }
    for run in runs.iter().take(limit) {
        let metrics = run
            .metrics
            .iter()
            .map(|(k, v)| format!("{}={:.3}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "  {} {:<9} {} {}",
            accent(&run.run_id[..run.run_id.len().min(8)]),
            run.status.to_string(),
            dim(&run.start_time.format("%Y-%m-%d %H:%M:%S").to_string()),
            metrics
        );
    }
    println!();
    Ok(())
}

pub fn cmd_models(registry_dir: Option<&Path>) -> anyhow::Result<()> {
    let default_dir = ServeConfig::default().registry_dir;
    let registry = ModelRegistry::open_existing(registry_dir.unwrap_or(&default_dir))?;

    section(&format!("Models in {}", registry.root().display()));
    let models = registry.list_models();
    if models.is_empty() {
        println!("  {}", dim("no models registered"));
    }
    for name in &models {
        println!("  {} {}", accent(name), model_summary(&registry, name));
    }
    println!();
    Ok(())
}

/// `v1 v2 v3  @champion=v3` style line for one registered model
fn model_summary(registry: &ModelRegistry, name: &str) -> String {
    let versions = registry
        .list_versions(name)
        .iter()
        .map(|v| format!("v{}", v))
        .collect::<Vec<_>>()
        .join(" ");
    let aliases = registry
        .aliases(name)
        .iter()
        .map(|(alias, version)| format!("@{}=v{}", alias, version))
        .collect::<Vec<_>>()
        .join(" ");
    if aliases.is_empty() {
        versions
    } else {
        format!("{}  {}", versions, aliases)
    }
}

pub fn cmd_serve(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    use crate::server::{run_server, ServerConfig};

    let mut config = ServerConfig::default();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    section("Serve");
    kv("Form", &format!("http://{}:{}/", config.host, config.port));
    kv("API", &format!("http://{}:{}/api", config.host, config.port));
    kv("Model", &config.serve.model_path.display().to_string());
    println!("  {}", dim("ctrl+c to stop"));
    println!();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_server(config))
}

/// Dispatch a parsed command line
pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Train(args) => cmd_train(&args),
        Commands::Predict(args) => cmd_predict(&args),
        Commands::Serve { host, port } => cmd_serve(host, port),
        Commands::GenerateData { rows, seed, output } => cmd_generate_data(rows, seed, &output),
        Commands::FetchData { url, output } => cmd_fetch_data(&url, &output),
        Commands::Runs { tracking_uri, experiment, limit } => {
            cmd_runs(tracking_uri.as_deref(), experiment.as_deref(), limit)
        }
        Commands::Models { registry_dir } => cmd_models(registry_dir.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train_flags() {
        let cli = Cli::try_parse_from([
            "diamond-price",
            "train",
            "--max-depth",
            "unbounded",
            "--test-size",
            "0.25",
            "--register-model",
            "diamonds_price_model",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        let config = args.to_config();
        assert_eq!(config.max_depth, None);
        assert_eq!(config.test_size, 0.25);
        assert_eq!(config.register_model.as_deref(), Some("diamonds_price_model"));
    }

    #[test]
    fn test_zero_depth_rejected() {
        assert!(Cli::try_parse_from(["diamond-price", "train", "--max-depth", "0"]).is_err());
    }

    #[test]
    fn test_predict_defaults() {
        let cli = Cli::try_parse_from(["diamond-price", "predict", "--carat", "1.1"]).unwrap();
        let Commands::Predict(args) = cli.command else {
            panic!("expected predict");
        };
        let features = args.features();
        assert_eq!(features.carat, 1.1);
        assert_eq!(features.cut, "Premium");
        assert_eq!(features.z, 3.4);
    }

    #[test]
    fn test_models_command() {
        let cli = Cli::try_parse_from(["diamond-price", "models", "--registry-dir", "reg"]).unwrap();
        let Commands::Models { registry_dir } = cli.command else {
            panic!("expected models");
        };
        assert_eq!(registry_dir, Some(PathBuf::from("reg")));

        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_models(Some(dir.path())).is_err());
    }

    #[test]
    fn test_training_failure_hint() {
        let err = training_failure(DiamondError::SchemaMismatch("missing columns [clarity]".into()));
        assert!(err.to_string().contains("expected columns: carat"));

        let err = training_failure(DiamondError::TrackerUnavailable("down".into()));
        assert!(!err.to_string().contains("expected columns"));
    }

    #[test]
    fn test_synthetic_conflicts_with_data() {
        let parsed = Cli::try_parse_from([
            "diamond-price",
            "train",
            "--data",
            "a.csv",
            "--synthetic",
            "100",
        ]);
        assert!(parsed.is_err());
    }
}
