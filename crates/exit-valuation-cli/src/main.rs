mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use commands::cap_table::{OwnershipArgs, VestingArgs};
use commands::dilution::{AntiDilutionArgs, RoundArgs};
use commands::returns::{AggregateArgs, FundImpactArgs, MonteCarloArgs};
use commands::scenarios::ScenarioArgs;
use commands::waterfall::WaterfallArgs;
use commands::RunContext;

/// Liquidation waterfall and probability-weighted exit valuation
#[derive(Parser)]
#[command(
    name = "xval",
    version,
    about = "Liquidation waterfall and probability-weighted exit valuation",
    long_about = "A CLI for distributing exit proceeds across a cap table and valuing \
                  venture positions across a probability-weighted matrix of exit \
                  scenarios, with decimal precision. Reads JSON from --input or stdin."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Engine assumptions file (.json, .yaml or .yml), replacing any in the input
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log engine decisions to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Distribute an exit value across a cap table
    Waterfall(WaterfallArgs),
    /// Generate the probability-weighted exit scenario matrix
    Scenarios(ScenarioArgs),
    /// Value a position across exit scenarios (PV, DLOM, percentiles)
    Aggregate(AggregateArgs),
    /// Position sizing and contribution to fund multiple
    FundImpact(FundImpactArgs),
    /// Monte Carlo distribution of a position's proceeds
    MonteCarlo(MonteCarloArgs),
    /// Simulate a priced financing round
    Round(RoundArgs),
    /// Apply anti-dilution protection for a down round
    AntiDilution(AntiDilutionArgs),
    /// Vesting progress for a grant
    Vesting(VestingArgs),
    /// Basic and fully diluted ownership of a cap table
    Ownership(OwnershipArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn run(cli: Cli) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let ctx = RunContext {
        assumptions: cli
            .config
            .as_deref()
            .map(input::config::load_assumptions)
            .transpose()?,
    };
    if ctx.assumptions.is_some() {
        debug!(config = ?cli.config, "loaded engine assumptions");
    }

    match cli.command {
        Commands::Waterfall(args) => commands::waterfall::run_waterfall(args, &ctx),
        Commands::Scenarios(args) => commands::scenarios::run_scenarios(args, &ctx),
        Commands::Aggregate(args) => commands::returns::run_aggregate(args, &ctx),
        Commands::FundImpact(args) => commands::returns::run_fund_impact(args, &ctx),
        Commands::MonteCarlo(args) => commands::returns::run_monte_carlo(args, &ctx),
        Commands::Round(args) => commands::dilution::run_round(args, &ctx),
        Commands::AntiDilution(args) => commands::dilution::run_anti_dilution(args),
        Commands::Vesting(args) => commands::cap_table::run_vesting(args),
        Commands::Ownership(args) => commands::cap_table::run_ownership(args, &ctx),
        Commands::Version => Ok(serde_json::json!({
            "name": "xval",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let format = cli.output.clone();

    match run(cli) {
        Ok(value) => {
            output::format_output(&format, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
