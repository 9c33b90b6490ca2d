//! Burst clustering command line tool
//!
//! # Commands
//!
//! - `run` - cluster a trace in one process, or act as rank 0 of a TCP run
//! - `worker` - one non-zero rank of a TCP run
//! - `simulate` - a multi-rank run inside one process
//! - `estimate` - k-distance curves for choosing epsilon
//! - `check-config` - validate the configuration and print it
//!
//! # Configuration
//!
//! Read from, in order:
//! 1. `--config` / `BURSTS_CONFIG` (path to TOML file)
//! 2. `./burst-clustering.toml` in current directory
//! 3. Default configuration
//!
//! `BURSTS_*` environment variables and command line flags override the file.
//!
//! # Example Usage
//!
//! ```bash
//! # Single process
//! burst-clustering run --input trace.jsonl --output out/app
//!
//! # Two ranks over TCP
//! BURSTS_RANKS=2 burst-clustering run --input trace.jsonl --output out/app &
//! BURSTS_RANKS=2 burst-clustering worker --rank 1 --input trace.jsonl
//! ```

mod output;

use burst_clustering::distributed::{LocalTransport, TcpTransport, Transport};
use burst_clustering::engine::RecordSource;
use burst_clustering::extraction::JsonLinesSource;
use burst_clustering::metrics::gather_metrics;
use burst_clustering::{AnalysisConfig, ClusteringReport, TraceRecord};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{error, info};

const DEFAULT_CONFIG_FILE: &str = "burst-clustering.toml";

// =============================================================================
// CLI Definition
// =============================================================================

/// Burst clustering - structure detection in HPC execution traces
#[derive(Parser)]
#[command(name = "burst-clustering")]
#[command(version)]
#[command(about = "Reconstruct computation bursts from a trace and cluster them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "BURSTS_CONFIG")]
    config: Option<PathBuf>,

    /// Override the DBSCAN neighbourhood radius
    #[arg(long, global = true)]
    epsilon: Option<f64>,

    /// Override the DBSCAN core-point threshold
    #[arg(long, global = true)]
    min_points: Option<u64>,

    /// Write Prometheus metrics to this file when done
    #[arg(long, global = true)]
    metrics: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster a trace (rank 0 when several ranks are configured)
    Run {
        /// JSON lines trace records
        #[arg(short, long)]
        input: PathBuf,

        /// Output prefix, `<prefix>.bursts.csv` and `<prefix>.stats.csv` are written
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Contribute one non-zero rank to a TCP run
    Worker {
        /// Rank of this process
        #[arg(short, long)]
        rank: usize,

        /// JSON lines trace records
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Run several ranks in this process
    Simulate {
        /// Number of ranks
        #[arg(short, long)]
        ranks: usize,

        /// JSON lines trace records
        #[arg(short, long)]
        input: PathBuf,

        /// Output prefix
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Compute k-distance curves of the complete bursts
    Estimate {
        /// JSON lines trace records
        #[arg(short, long)]
        input: PathBuf,

        /// First k
        #[arg(long, default_value_t = 1)]
        k_begin: usize,

        /// Last k
        #[arg(long, default_value_t = 10)]
        k_end: usize,

        /// CSV output path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Validate configuration file and print the effective settings
    CheckConfig,
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

// =============================================================================
// Setup
// =============================================================================

fn load_config(cli: &Cli) -> CliResult<AnalysisConfig> {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_file_with_env(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            AnalysisConfig::from_file_with_env(DEFAULT_CONFIG_FILE)?
        }
        None => AnalysisConfig::from_env(),
    };

    if let Some(epsilon) = cli.epsilon {
        config
            .clustering
            .parameters
            .insert("epsilon".to_string(), toml::Value::Float(epsilon));
    }
    if let Some(min_points) = cli.min_points {
        config
            .clustering
            .parameters
            .insert("min_points".to_string(), toml::Value::Integer(min_points as i64));
    }

    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &AnalysisConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}

fn read_records(path: &Path) -> CliResult<Vec<TraceRecord>> {
    let mut source = JsonLinesSource::open(path)?;
    let mut records = Vec::new();
    while let Some(record) = source.next_record()? {
        records.push(record);
    }
    Ok(records)
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn write_report(prefix: &Path, report: &ClusteringReport) -> CliResult<()> {
    let bursts = with_suffix(prefix, ".bursts.csv");
    let stats = with_suffix(prefix, ".stats.csv");
    output::write_bursts(&bursts, report)?;
    output::write_statistics(&stats, report)?;

    info!(
        bursts = %bursts.display(),
        statistics = %stats.display(),
        clusters = report.partition.cluster_count(),
        "Results written"
    );
    println!(
        "{}: {} bursts, {} clusters{}",
        report.algorithm,
        report.bursts.len(),
        report.partition.cluster_count(),
        if report.partition.has_noise() { " + noise" } else { "" }
    );
    Ok(())
}

// =============================================================================
// CLI Command Handlers
// =============================================================================

fn cmd_run(config: &AnalysisConfig, input: &Path, output: &Path) -> CliResult<()> {
    let mut clustering = config.builder().with_rank(0, config.distributed.ranks).build()?;
    let mut source = JsonLinesSource::open(input)?;

    let report = if config.distributed.ranks > 1 {
        let mut transport =
            TcpTransport::bind_collector(config.distributed.collector_address.as_str(), config.distributed.ranks)?;
        clustering.run(&mut source, Some(&mut transport))?
    } else {
        clustering.run(&mut source, None)?
    };

    match report {
        Some(report) => write_report(output, &report),
        None => Err("collector produced no report".into()),
    }
}

fn cmd_worker(config: &AnalysisConfig, rank: usize, input: &Path) -> CliResult<()> {
    let ranks = config.distributed.ranks;
    let mut clustering = config.builder().with_rank(rank, ranks).build()?;
    let mut source = JsonLinesSource::open(input)?;

    let mut transport = TcpTransport::worker(
        config.distributed.collector_address.as_str(),
        rank,
        ranks,
        config.distributed.connect_policy(),
    )?;
    clustering.run(&mut source, Some(&mut transport))?;

    info!(rank, "Worker finished");
    Ok(())
}

fn cmd_simulate(config: &AnalysisConfig, ranks: usize, input: &Path, output: &Path) -> CliResult<()> {
    if ranks == 0 {
        return Err("at least one rank is required".into());
    }
    let records = read_records(input)?;

    let mut transports = LocalTransport::cluster(ranks);
    let mut collector = transports.remove(0);

    let workers: Vec<_> = transports
        .into_iter()
        .map(|mut transport| {
            let builder = config.builder().with_rank(transport.rank(), ranks);
            let mut source = records.clone().into_iter();
            thread::spawn(move || -> burst_clustering::Result<()> {
                builder.build()?.run(&mut source, Some(&mut transport))?;
                Ok(())
            })
        })
        .collect();

    let mut clustering = config.builder().with_rank(0, ranks).build()?;
    let mut source = records.into_iter();
    let report = clustering.run(&mut source, Some(&mut collector));
    drop(collector);

    for (i, worker) in workers.into_iter().enumerate() {
        match worker.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(rank = i + 1, error = %e, "Worker failed"),
            Err(_) => error!(rank = i + 1, "Worker panicked"),
        }
    }

    match report? {
        Some(report) => write_report(output, &report),
        None => Err("collector produced no report".into()),
    }
}

fn cmd_estimate(config: &AnalysisConfig, input: &Path, k_begin: usize, k_end: usize, output: &Path) -> CliResult<()> {
    let mut clustering = config.builder().with_rank(0, 1).build()?;
    let mut source = JsonLinesSource::open(input)?;
    clustering.extract(&mut source)?;

    let curves = clustering.k_distance_profile(k_begin, k_end)?;
    output::write_k_distances(output, &curves)?;
    println!(
        "k-distance curves for k = {}..={} over {} points written to {}",
        k_begin,
        k_end,
        clustering.data().complete_bursts().len(),
        output.display()
    );
    Ok(())
}

fn cmd_check_config(config: &AnalysisConfig) -> CliResult<()> {
    println!("Configuration is valid!");
    println!();
    println!("Extraction:");
    println!("  Running state: {}", config.extraction.running_state);
    println!("  Duration filter: {}", config.extraction.duration_filter);
    println!("  Normalize: {}", config.extraction.normalize);
    println!();
    println!("Clustering:");
    println!("  Algorithm: {}", config.clustering.algorithm);
    for (key, value) in config.clustering.parameter_map() {
        println!("  {}: {}", key, value);
    }
    println!();
    println!("Parameters:");
    for parameter in &config.parameters {
        println!("  {} (event types {:?})", parameter.name(), parameter.event_types());
    }
    println!();
    println!("Distributed:");
    println!("  Ranks: {}", config.distributed.ranks);
    println!("  Collector: {}", config.distributed.collector_address);

    // Resolve the backend as well, catching unknown algorithms and bad keys
    config.builder().build()?;
    Ok(())
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if let Commands::CheckConfig = &cli.command {
        return cmd_check_config(&config);
    }

    init_tracing(&config);
    info!("Starting burst-clustering v{}", env!("CARGO_PKG_VERSION"));

    let result = match &cli.command {
        Commands::Run { input, output } => cmd_run(&config, input, output),
        Commands::Worker { rank, input } => cmd_worker(&config, *rank, input),
        Commands::Simulate { ranks, input, output } => cmd_simulate(&config, *ranks, input, output),
        Commands::Estimate {
            input,
            k_begin,
            k_end,
            output,
        } => cmd_estimate(&config, input, *k_begin, *k_end, output),
        Commands::CheckConfig => Ok(()),
    };

    if let Some(path) = &cli.metrics {
        std::fs::write(path, gather_metrics())?;
    }

    if let Err(e) = &result {
        error!(error = %e, "Analysis failed");
    }
    result
}
