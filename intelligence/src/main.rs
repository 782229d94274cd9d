//! Yieldwise command line entry point
//!
//! Runs one engine operation against a market snapshot and prints the result
//! as JSON.

use anyhow::{anyhow, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yieldwise_dataplane::{ChainDataGateway, MarketSnapshot, PriceOracle, StaticPriceOracle};
use yieldwise_intelligence::{EngineConfig, RiskTier, RiskTolerance, YieldEngine, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    init_logging(log_level, matches.get_flag("json-logs"));

    if let Some(("generate-config", sub)) = matches.subcommand() {
        let output = sub
            .get_one::<String>("output")
            .ok_or_else(|| anyhow!("missing output path"))?;
        EngineConfig::default().save_to_file(output)?;
        info!("Generated example config at: {}", output);
        return Ok(());
    }

    info!(version = VERSION, "🌾 Yieldwise starting...");

    let config = match matches.get_one::<String>("config") {
        Some(path) => {
            info!("Loading config from: {}", path);
            EngineConfig::from_file(path).with_context(|| format!("loading config {}", path))?
        }
        None => EngineConfig::from_env_and_file()?,
    };

    let (gateway, oracle) = match matches.get_one::<String>("snapshot") {
        Some(path) => {
            info!("Loading market snapshot from: {}", path);
            let snapshot = MarketSnapshot::from_file(path)
                .with_context(|| format!("loading snapshot {}", path))?;
            let oracle: Arc<dyn PriceOracle> = Arc::new(snapshot.oracle());
            (snapshot.into_gateway(config.gateway.clone()), oracle)
        }
        None => {
            warn!("🔶 No snapshot given, every source list is empty");
            let oracle: Arc<dyn PriceOracle> = Arc::new(StaticPriceOracle::default());
            (ChainDataGateway::new(config.gateway.clone()), oracle)
        }
    };

    let engine = YieldEngine::new(config, Arc::new(gateway), oracle)?;
    run(&engine, &matches).await
}

fn cli() -> Command {
    Command::new("yieldwise")
        .version(VERSION)
        .about("Yieldwise - yield optimization and rebalancing engine")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("snapshot")
                .short('s')
                .long("snapshot")
                .value_name("FILE")
                .global(true)
                .help("Market snapshot (YAML or JSON) to read markets, positions and prices from"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .global(true)
                .help("Log level (trace, debug, info, warn, error)")
                .default_value("info"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .help("Emit logs as JSON lines")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("opportunities")
                .about("Rank yield opportunities for an asset")
                .arg(Arg::new("asset").required(true).help("Asset symbol, e.g. USDC"))
                .arg(
                    Arg::new("amount")
                        .required(true)
                        .value_parser(value_parser!(f64))
                        .help("Deposit size in USD"),
                )
                .arg(
                    Arg::new("tolerance")
                        .short('t')
                        .long("tolerance")
                        .default_value("medium")
                        .help("Risk tolerance (low, medium, high)"),
                ),
        )
        .subcommand(
            Command::new("strategies")
                .about("Price allocation strategies up to a risk tier")
                .arg(
                    Arg::new("capital")
                        .required(true)
                        .value_parser(value_parser!(f64))
                        .help("Capital in USD"),
                )
                .arg(
                    Arg::new("tier")
                        .short('t')
                        .long("tier")
                        .default_value("moderate")
                        .help("Risk tier (conservative, moderate, aggressive)"),
                ),
        )
        .subcommand(
            Command::new("analyze")
                .about("Analyze an account and recommend rebalance actions")
                .arg(Arg::new("address").required(true).help("Account address")),
        )
        .subcommand(
            Command::new("auto-filter")
                .about("Analyze an account and keep the actions allowed to auto-execute")
                .arg(Arg::new("address").required(true).help("Account address")),
        )
        .subcommand(
            Command::new("generate-config")
                .about("Write the default configuration and exit")
                .arg(Arg::new("output").required(true).value_name("OUTPUT")),
        )
}

async fn run(engine: &YieldEngine, matches: &ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("opportunities", sub)) => {
            let asset = required::<String>(sub, "asset")?;
            let amount = *required::<f64>(sub, "amount")?;
            let tolerance: RiskTolerance = required::<String>(sub, "tolerance")?
                .parse()
                .map_err(|e: String| anyhow!(e))?;
            let report = engine
                .find_yield_opportunities(asset, amount, tolerance)
                .await?;
            print_json(&report)
        }
        Some(("strategies", sub)) => {
            let capital = *required::<f64>(sub, "capital")?;
            let tier: RiskTier = required::<String>(sub, "tier")?
                .parse()
                .map_err(|e: String| anyhow!(e))?;
            let strategies = engine.generate_optimization_strategies(capital, tier).await?;
            print_json(&strategies)
        }
        Some(("analyze", sub)) => {
            let address = required::<String>(sub, "address")?;
            let report = engine.analyze_portfolio(address).await?;
            print_json(&report)
        }
        Some(("auto-filter", sub)) => {
            let address = required::<String>(sub, "address")?;
            let report = engine.analyze_portfolio(address).await?;
            let outcome =
                engine.filter_for_auto_execution(report.actions, &engine.config().auto_rebalance)?;
            print_json(&outcome)
        }
        Some((other, _)) => Err(anyhow!("unknown command: {}", other)),
        None => Err(anyhow!("no command given")),
    }
}

fn required<'a, T: Clone + Send + Sync + 'static>(
    matches: &'a ArgMatches,
    name: &str,
) -> anyhow::Result<&'a T> {
    matches
        .get_one::<T>(name)
        .ok_or_else(|| anyhow!("missing argument: {}", name))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize logging. `RUST_LOG` wins over `--log-level`.
fn init_logging(log_level: &str, json: bool) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => {
            eprintln!("Invalid log level: {}. Using 'info'", log_level);
            tracing::Level::INFO
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "yieldwise_intelligence={},yieldwise_dataplane={}",
            level, level
        )
        .into()
    });

    // Logs go to stderr so stdout stays valid JSON
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
