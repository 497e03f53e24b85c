//! load-job-cache - Command-line interface for the job cache loader
//!
//! Resolves the files a job needs, stages them into a timestamped directory
//! on every output path and promotes that directory once all copies landed.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use jobcache_core::config::Config;
use jobcache_core::utils::staging_dir_name;
use jobcache_core::{create_mode, CacheLoadRequest, Connectors, Launcher, LoadReport, ModeOptions};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// load-job-cache - stage a job cache into Hadoop-compatible filesystems
#[derive(Parser)]
#[command(name = "load-job-cache")]
#[command(author, version, about = "Stage a job cache into Hadoop-compatible filesystems", long_about = None)]
struct Cli {
    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show progress bar during operations
    #[arg(long, global = true)]
    progress: bool,

    /// Configuration file to use instead of the default location
    #[arg(long, global = true, env = "JOB_CACHE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy the job cache to every output path
    Load(LoadArgs),

    /// Show or initialize configuration
    Config {
        /// Show current configuration
        #[arg(long, conflicts_with_all = ["init", "path"])]
        show: bool,

        /// Write the default configuration file if it does not exist
        #[arg(long, conflicts_with_all = ["show", "path"])]
        init: bool,

        /// Show configuration file path
        #[arg(long, conflicts_with_all = ["show", "init"])]
        path: bool,
    },
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// Comma separated destination roots (paths or URIs)
    #[arg(long, value_delimiter = ',', required = true)]
    output_paths: Vec<String>,

    /// Strategy used to find the files to load (classpath, directory)
    #[arg(long, default_value = "classpath")]
    load_mode: String,

    /// Replicas requested for every cached file [default: 3]
    #[arg(long = "cache-replication-cnt", value_name = "N")]
    replication: Option<u16>,

    /// Promote the staging directory after loading [default: true]
    #[arg(long = "finalize-load", value_name = "BOOL", action = ArgAction::Set)]
    finalize: Option<bool>,

    /// Worker threads copying files [default: 30]
    #[arg(long = "executor-thread-cnt", value_name = "N")]
    threads: Option<usize>,

    /// Comma separated cluster configuration directories
    #[arg(long, value_delimiter = ',', env = "JOB_CACHE_CONF_DIRS")]
    hadoop_conf_dirs: Vec<PathBuf>,

    /// Directory below the staging directory; also the promoted alias
    #[arg(long)]
    sub_dir: Option<String>,

    /// Staging directory name [default: jobCache_<UTC timestamp>]
    #[arg(long)]
    timestamp_dir: Option<String>,

    /// Alias promoted when no sub directory is given [default: current]
    #[arg(long)]
    cache_alias: Option<String>,

    /// Colon separated classpath (classpath mode)
    #[arg(long, env = "CLASSPATH")]
    classpath: Option<String>,

    /// Directory relative classpath entries resolve against (classpath mode)
    #[arg(long)]
    classpath_base_dir: Option<PathBuf>,

    /// Directory whose files are loaded (directory mode)
    #[arg(long)]
    directory: Option<PathBuf>,

    /// Include files in subdirectories (directory mode)
    #[arg(long)]
    recursive: bool,

    /// Print the load report as JSON
    #[arg(long)]
    json: bool,
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let result = run();

    match result {
        Ok(_) => process::exit(0),
        Err(e) => {
            error!("Error: {:#}", e);

            let exit_code = map_error_to_exit_code(&e);
            process::exit(exit_code);
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Load(args) => {
            let config = load_config(cli.config.as_deref())?;
            let report = run_load(args.json, build_launcher(args, &config, cli.progress)?)?;
            info!(
                "Job cache {} loaded: {} copies, {} bytes, promoted on {} targets",
                report.staging_dir,
                report.copied,
                report.bytes,
                report.promoted.len()
            );
        }

        Commands::Config { show, init, path } => {
            let explicit = cli.config.is_some();
            let config_path = match cli.config {
                Some(path) => path,
                None => Config::config_path().context("Failed to get config path")?,
            };

            if show {
                let config = load_config(explicit.then_some(config_path.as_path()))?;
                println!("{}", toml::to_string_pretty(&config)?);
            } else if init {
                if Config::init_at(&config_path)? {
                    info!("Created default configuration at {:?}", config_path);
                } else {
                    info!("Configuration already exists at {:?}", config_path);
                }
                println!("{}", config_path.display());
            } else if path {
                println!("{}", config_path.display());
            } else {
                eprintln!("Please specify --show, --init, or --path");
            }
        }
    }

    Ok(())
}

/// Explicit configuration file, or the default one when present
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path)),
        None => Ok(Config::load_or_default()),
    }
}

/// Merge flags over configured defaults
fn build_launcher(args: LoadArgs, config: &Config, progress: bool) -> Result<Launcher> {
    let mode = create_mode(&args.load_mode)?;

    let options = ModeOptions {
        classpath: args.classpath,
        classpath_base_dir: args.classpath_base_dir,
        directory: args.directory,
        recursive: args.recursive,
    };

    let staging_dir = args
        .timestamp_dir
        .unwrap_or_else(|| staging_dir_name(Utc::now()));
    let mut request = CacheLoadRequest::from_config(&config.load, staging_dir);
    if let Some(replication) = args.replication {
        request.replication = replication;
    }
    if let Some(finalize) = args.finalize {
        request.finalize = finalize;
    }
    if let Some(threads) = args.threads {
        request.workers = threads;
    }
    if let Some(cache_alias) = args.cache_alias {
        request.cache_alias = cache_alias;
    }
    request.sub_dir = args.sub_dir;
    request.show_progress = progress;

    let conf_dirs = if args.hadoop_conf_dirs.is_empty() {
        config.clusters.conf_dirs.clone()
    } else {
        args.hadoop_conf_dirs
    };

    Ok(Launcher::new(mode, options, args.output_paths, request).with_conf_dirs(conf_dirs))
}

fn run_load(json: bool, launcher: Launcher) -> Result<LoadReport> {
    let connectors = connectors();
    info!("Using connectors {:?}", connectors);

    let report = launcher
        .run(&connectors)
        .with_context(|| format!("Failed to load job cache {}", launcher.request().staging_dir))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(report)
}

/// Connectors for every scheme this build supports
fn connectors() -> Connectors {
    #[allow(unused_mut)]
    let mut connectors = Connectors::with_defaults();

    #[cfg(feature = "cloud")]
    connectors.register(jobcache_cloud::ObjectStoreConnector::default());

    connectors
}

/// Map errors to exit codes:
/// - 0: Success
/// - 1: General error
/// - 2: IO error
/// - 3: Invalid arguments or configuration
/// - 4: Partial failure
fn map_error_to_exit_code(err: &anyhow::Error) -> i32 {
    if let Some(core_err) = err.downcast_ref::<jobcache_core::Error>() {
        match core_err {
            jobcache_core::Error::Io(_) => 2,
            jobcache_core::Error::Connection { .. } => 2,
            // load() wraps these in Error::Load
            jobcache_core::Error::Transfer(_) => 2,
            jobcache_core::Error::Promotion(_) => 2,
            jobcache_core::Error::Configuration(_) => 3,
            jobcache_core::Error::Resolution(_) => 3,
            jobcache_core::Error::InvalidPath(_) => 3,
            jobcache_core::Error::UnsupportedScheme(_) => 3,
            jobcache_core::Error::Load(_) => 4,
            jobcache_core::Error::Other(_) => 1,
        }
    } else if err.is::<std::io::Error>() {
        2
    } else {
        1
    }
}
