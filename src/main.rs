use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use quarter_settle::core::engine::{BatchProgress, BatchResult, SettlementEngine};
use quarter_settle::core::Quarter;
use quarter_settle::stores::FileStore;

#[derive(Serialize, Deserialize, Default)]
struct Config {
    data_dir: String,
}

#[derive(Parser)]
#[command(name = "qsettle", about = "Quarterly settlement for a construction ledger")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration file
    Init {
        #[arg(long)]
        data_dir: PathBuf,
    },
    /// Close a quarter for the given projects and carry balances forward
    Settle {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        quarter: String,
        /// Project ids, processed in order
        #[arg(required = true)]
        projects: Vec<String>,
    },
    /// Carry balances forward without locking the quarter
    Transition {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        quarter: String,
        /// Project ids, processed in order
        #[arg(required = true)]
        projects: Vec<String>,
    },
}

#[derive(Debug)]
enum CliError {
    MissingConfig,
    InvalidConfig(String),
    InvalidQuarter(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::MissingConfig => write!(f, "config.toml file not found"),
            CliError::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            CliError::InvalidQuarter(msg) => write!(f, "invalid quarter: {msg}"),
        }
    }
}

impl std::error::Error for CliError {}

fn load_config(path: &PathBuf) -> Result<Config, CliError> {
    let data = fs::read_to_string(path).map_err(|_| CliError::MissingConfig)?;
    let cfg: Config = toml::from_str(&data).map_err(|e| CliError::InvalidConfig(e.to_string()))?;
    if cfg.data_dir.is_empty() {
        return Err(CliError::InvalidConfig("data_dir is missing".to_string()));
    }
    Ok(cfg)
}

fn save_config(path: &PathBuf, cfg: &Config) {
    if let Ok(data) = toml::to_string(cfg) {
        let _ = fs::write(path, data);
    }
}

enum Operation {
    Settle,
    Transition,
}

async fn run_batch(
    config_path: &PathBuf,
    operation: Operation,
    year: i32,
    quarter: &str,
    projects: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = load_config(config_path)?;
    let quarter: Quarter = quarter.parse().map_err(CliError::InvalidQuarter)?;
    let engine = SettlementEngine::new(FileStore::new(&cfg.data_dir));

    let bar = ProgressBar::new(projects.len() as u64);
    bar.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos}/{len} {msg}",
    )?);
    let on_progress = |progress: BatchProgress| {
        bar.set_position(progress.current as u64);
        bar.set_message(progress.current_project);
    };

    let result = match operation {
        Operation::Settle => engine.settle(&projects, year, quarter, on_progress).await,
        Operation::Transition => {
            engine
                .transition(&projects, year, quarter, on_progress)
                .await
        }
    };
    bar.finish_and_clear();
    print_result(&result, year, quarter);
    Ok(())
}

fn print_result(result: &BatchResult, year: i32, quarter: Quarter) {
    for settled in &result.success {
        println!(
            "{}: {quarter}/{year} done, carried into {}/{}",
            settled.project_name, settled.next_quarter, settled.next_year
        );
    }
    for failure in &result.failed {
        println!("{}: FAILED - {}", failure.project_id, failure.error);
    }
    println!(
        "{} succeeded, {} failed",
        result.success.len(),
        result.failed.len()
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Init { data_dir } => {
            let cfg = Config {
                data_dir: data_dir.display().to_string(),
            };
            save_config(&cli.config, &cfg);
            println!("wrote {}", cli.config.display());
        }
        Commands::Settle {
            year,
            quarter,
            projects,
        } => {
            run_batch(&cli.config, Operation::Settle, year, &quarter, projects).await?;
        }
        Commands::Transition {
            year,
            quarter,
            projects,
        } => {
            run_batch(&cli.config, Operation::Transition, year, &quarter, projects).await?;
        }
    }
    Ok(())
}
