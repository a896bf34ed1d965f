use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};

use lyssna_config::LyssnaConfig;
use lyssna_engine::Runtime;
use lyssna_orchestrator::{Orchestrator, SocketProbe};
use lyssna_protocols::Decoder;
use lyssna_registry::{ActionDefinition, ActionRegistry};

#[derive(Parser, Debug)]
#[command(name = "lyssna", version, about)]
pub struct Cli {
    /// Configuration file. Defaults to config/lyssna.yaml plus LYSSNA_* overrides.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture traffic and supervise endpoints until interrupted
    Run(RunArgs),
    /// Decode a hex encoded AMF3 value and print it as JSON
    Decode(DecodeArgs),
    /// Query the action registry
    #[command(subcommand)]
    Actions(ActionsCommand),
    /// Run one health check against every configured endpoint
    Probe,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Packet filter, e.g. "hero.*, dir:request"
    #[arg(short, long)]
    pub filter: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DecodeArgs {
    /// AMF3 bytes as hex; whitespace is ignored
    pub hex: String,

    #[arg(long, default_value_t = 64)]
    pub max_depth: usize,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ActionsCommand {
    /// Case-insensitive substring search over action names
    Search {
        text: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Print one action definition as JSON
    Show { name: String },
    /// List action categories
    Categories,
}

pub fn load_config(path: Option<&PathBuf>) -> anyhow::Result<LyssnaConfig> {
    match path {
        Some(path) => LyssnaConfig::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => LyssnaConfig::load().context("Failed to load configuration"),
    }
}

pub async fn run_command(command: Commands, config: LyssnaConfig) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => run(config, args).await,
        Commands::Decode(args) => {
            println!("{}", decode_hex(&args.hex, args.max_depth)?);
            Ok(())
        }
        Commands::Actions(query) => {
            let registry = ActionRegistry::load(&config.registry.path);
            print!("{}", actions(&registry, &query)?);
            Ok(())
        }
        Commands::Probe => {
            let (report, failed) = probe(&config).await?;
            print!("{report}");
            if failed > 0 {
                bail!("{failed} endpoint(s) unreachable");
            }
            Ok(())
        }
    }
}

async fn run(config: LyssnaConfig, args: RunArgs) -> anyhow::Result<()> {
    let metrics_enabled = config.telemetry.metrics_enabled;
    let runtime = Arc::new(Runtime::new(config)?);

    let interrupt = {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received");
                runtime.shutdown();
            }
        })
    };

    let result = runtime.run(args.filter.as_deref()).await;
    interrupt.abort();
    result?;

    let session = runtime.capture().session();
    info!(
        packets = session.total_packets,
        decoded = session.decoded_packets,
        failures = session.decode_failures,
        "Capture session summary"
    );
    if metrics_enabled {
        debug!(metrics = %runtime.metrics().gather_metrics()?, "Final metrics");
    }
    Ok(())
}

/// Decodes hex encoded AMF3 into pretty printed JSON.
pub fn decode_hex(input: &str, max_depth: usize) -> anyhow::Result<String> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = hex::decode(compact).context("Input is not valid hex")?;
    let (value, consumed) = Decoder::with_max_depth(max_depth).decode(&bytes)?;
    if consumed < bytes.len() {
        debug!(trailing = bytes.len() - consumed, "Ignoring bytes after the value");
    }
    Ok(serde_json::to_string_pretty(&value)?)
}

pub fn actions(registry: &ActionRegistry, query: &ActionsCommand) -> anyhow::Result<String> {
    let mut out = String::new();
    match query {
        ActionsCommand::Search { text, limit } => {
            for definition in registry.search(text, *limit) {
                writeln!(out, "{}", summary_line(definition))?;
            }
        }
        ActionsCommand::Show { name } => {
            let definition = registry
                .lookup(name)
                .ok_or_else(|| anyhow!("Unknown action: {name}"))?;
            writeln!(out, "{}", serde_json::to_string_pretty(definition)?)?;
        }
        ActionsCommand::Categories => {
            for category in registry.categories() {
                writeln!(out, "{category}\t{}", registry.actions_in_category(category).len())?;
            }
        }
    }
    Ok(out)
}

fn summary_line(definition: &ActionDefinition) -> String {
    let id = definition
        .command_id
        .map_or_else(|| "-".to_owned(), |id| id.to_string());
    let description = definition.description.as_deref().unwrap_or_default();
    format!("{id:>6}  {:<32} {description}", definition.name)
}

/// One bounded health round. Returns the report and the number of enabled
/// endpoints that failed.
pub async fn probe(config: &LyssnaConfig) -> anyhow::Result<(String, usize)> {
    let orchestrator = Orchestrator::new(&config.orchestrator, Arc::new(SocketProbe))?;
    let descriptors = orchestrator.descriptors();
    let results = orchestrator.check_all().await;

    let mut out = String::new();
    let mut failed = 0;
    for (name, result) in &results {
        let address = descriptors
            .iter()
            .find(|descriptor| &descriptor.name == name)
            .map(|descriptor| descriptor.address.to_string())
            .unwrap_or_default();
        match result {
            Ok(()) => writeln!(out, "{name:<20} {address:<40} ok")?,
            Err(error) => {
                failed += 1;
                writeln!(out, "{name:<20} {address:<40} error: {error}")?;
            }
        }
    }
    for descriptor in descriptors.iter().filter(|descriptor| !descriptor.enabled) {
        writeln!(out, "{:<20} {:<40} disabled", descriptor.name, descriptor.address)?;
    }
    Ok((out, failed))
}
