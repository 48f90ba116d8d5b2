//! Offline tools for contactless wallet cards

use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod utils;

use commands::*;

#[derive(Parser)]
#[command(version, about = "Tools for contactless wallet card protocols")]
struct Cli {
    /// Path to the config file (defaults to ~/.tapsign/tapsign.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug level output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = config::load_config(cli.config.as_deref())?;
    debug!(?config, "Loaded config");

    match cli.command {
        Commands::Tlv { data, response } => tlv_command(&data, response)?,
        Commands::ProtocolKey { identifier, pin } => protocol_key_command(
            &identifier,
            pin.as_deref().unwrap_or(&config.protocol.default_pin),
        )?,
        Commands::Address { public_key, chain } => {
            address_command(&public_key, chain.unwrap_or(config.chain))?
        }
        Commands::Script { address } => script_command(&address)?,
        Commands::Plan {
            utxos,
            amount,
            fee,
            include_fee,
        } => plan_command(&utxos, amount, fee, include_fee)?,
        Commands::Erc20 { to, amount } => erc20_command(&to, amount)?,
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .init();
}
