//! cogsim CLI - run cognitive models and environment authorities
//!
//! # Configuration
//!
//! Configuration is loaded from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`COGSIM_*`)
//! 3. File given with `--config`
//! 4. Project config (`.cogsim/config.toml` in the project directory)
//! 5. Global config (`~/.cogsim/config.toml`)
//! 6. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `COGSIM_DEBUG`: Enable debug mode (`true`/`false`)
//! - `COGSIM_CYCLE_TIME`: Seconds consumed per firing cycle
//! - `COGSIM_MAX_CYCLES`: Cycle limit per model
//! - `COGSIM_MAX_TIME`: Simulated time limit per model

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cogsim_runtime::connector::{CredentialStore, Credentials, Endpoint};
use cogsim_runtime::{CogsimConfig, CompletionReport, ConfigLoader, Controller, Model, ModelOutcome, Runtime};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Local endpoint used by `run --local-env`.
const LOCAL_ENV_ENDPOINT: &str = "cogsim-env";

/// cogsim CLI - run cognitive models and environment authorities
#[derive(Parser, Debug)]
#[command(name = "cogsim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root directory (defaults to current directory)
    #[arg(short = 'C', long, global = true)]
    project: Option<PathBuf>,

    /// Extra config file applied over global and project config
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_file: Option<PathBuf>,

    /// Skip the global config file
    #[arg(long, global = true)]
    no_global_config: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run model definitions (JSON) to completion and print a report
    Run {
        /// Model definition files
        #[arg(required = true)]
        models: Vec<PathBuf>,

        /// Attach the models to an in-process environment authority
        #[arg(long)]
        local_env: bool,

        /// Cycle limit per model
        #[arg(long)]
        max_cycles: Option<u64>,

        /// Simulated time limit per model, in seconds
        #[arg(long)]
        max_time: Option<f64>,
    },

    /// Serve an environment authority over TCP until interrupted
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:7878")]
        addr: String,

        /// Accepted credentials as `identity:secret` (repeatable).
        /// Without any, every identity is accepted.
        #[arg(long = "credentials", value_name = "ID:SECRET")]
        credentials: Vec<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

impl Args {
    fn load_config(&self) -> Result<CogsimConfig> {
        let project_root = self.project.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|e| {
                warn!(error = %e, "Failed to get current directory, using '.'");
                PathBuf::from(".")
            })
        });

        let mut loader = ConfigLoader::new().with_project_root(project_root);
        if let Some(ref path) = self.config_file {
            loader = loader.with_file(path);
        }
        if self.no_global_config {
            loader = loader.skip_global_config();
        }

        let mut config = loader.load().context("Config error")?;

        // CLI args override (highest priority)
        if self.debug {
            config.debug = true;
        }
        if let Command::Run {
            max_cycles,
            max_time,
            ..
        } = &self.command
        {
            if max_cycles.is_some() {
                config.scheduler.max_cycles = *max_cycles;
            }
            if max_time.is_some() {
                config.scheduler.max_time = *max_time;
            }
            config.validate().context("Config error")?;
        }
        Ok(config)
    }
}

fn init_tracing(args: &Args, config: &CogsimConfig) {
    // --debug > --verbose > RUST_LOG env > default "warn"
    let filter = if args.debug || config.debug {
        EnvFilter::new("debug")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // Logs go to stderr; stdout carries the report.
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    tracing_subscriber::registry().with(layer.with_filter(filter)).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;
    init_tracing(&args, &config);

    match &args.command {
        Command::Run { models, local_env, .. } => run(config, models, *local_env).await,
        Command::Serve { addr, credentials } => serve(config, addr, credentials).await,
        Command::Config => {
            print!("{}", config.to_toml().context("Failed to render config")?);
            Ok(())
        }
    }
}

fn load_model(path: &Path) -> Result<Model> {
    let json = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Model::from_json(&json).with_context(|| format!("Invalid model definition in {}", path.display()))
}

async fn run(config: CogsimConfig, paths: &[PathBuf], local_env: bool) -> Result<()> {
    let models = paths.iter().map(|p| load_model(p)).collect::<Result<Vec<_>>>()?;

    let base = Runtime::new(config);
    let (runtime, authority) = if local_env {
        let endpoint = Endpoint::local(LOCAL_ENV_ENDPOINT);
        let authority = base
            .bind_authority(&endpoint, CredentialStore::open())
            .await
            .context("Failed to start local environment")?;
        let connector = Arc::new(base.agent_connector(endpoint));
        (base.with_connector(connector), Some(authority))
    } else {
        (base, None)
    };

    let controller = Controller::new(&runtime);
    for model in models {
        controller.add_model(model)?;
    }
    controller.start().await?;
    info!(models = controller.models().len(), "running");

    let report = tokio::select! {
        report = controller.wait_for_completion().wait() => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping models");
            controller.stop().await
        }
    };

    if let Some(authority) = authority {
        authority.shutdown().await;
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    check(&report)
}

fn check(report: &CompletionReport) -> Result<()> {
    let aborted: Vec<String> = report
        .models
        .iter()
        .filter_map(|r| match &r.outcome {
            ModelOutcome::Aborted { reason } => Some(format!("{}: {reason}", r.model.name)),
            _ => None,
        })
        .collect();
    if aborted.is_empty() {
        Ok(())
    } else {
        bail!("{} model(s) aborted: {}", aborted.len(), aborted.join("; "))
    }
}

fn parse_credentials(specs: &[String]) -> Result<CredentialStore> {
    if specs.is_empty() {
        warn!("No credentials given, accepting every identity");
        return Ok(CredentialStore::open());
    }
    specs
        .iter()
        .map(|spec| {
            spec.split_once(':')
                .filter(|(id, _)| !id.is_empty())
                .map(|(id, secret)| Credentials::new(id, secret))
                .with_context(|| format!("Invalid credentials '{spec}', expected identity:secret"))
        })
        .collect()
}

async fn serve(config: CogsimConfig, addr: &str, credentials: &[String]) -> Result<()> {
    let store = parse_credentials(credentials)?;
    let runtime = Runtime::new(config);
    let authority = runtime
        .bind_authority(&Endpoint::Tcp(addr.to_string()), store)
        .await
        .with_context(|| format!("Failed to listen on {addr}"))?;

    println!("cogsim authority listening on {}", authority.endpoint());
    println!("session {}", authority.session());

    tokio::signal::ctrl_c().await.context("Failed to wait for Ctrl-C")?;
    info!("Shutting down authority");
    authority.shutdown().await;
    Ok(())
}
