//! nandbridge - raw ONFI NAND programmer
//!
//! Talks to a small USB microcontroller that drives the NAND bus. Every
//! flash operation is a command frame sent over bulk USB; the chip's
//! geometry comes from its ONFI parameter page.
//!
//! # Architecture
//!
//! - `nandbridge-core` holds the frame codec, the ONFI command sequences,
//!   bad block detection and the indexed image format
//! - `nandbridge-usb` moves frames over USB
//! - `nandbridge-dummy` emulates a chip in memory for testing
//!
//! The commands here only pick a bridge, open a session and print results.

mod bridges;
mod cli;
mod commands;
mod config;

use clap::Parser;
use cli::{Cli, Commands, SessionArgs};
use config::Config;
use nandbridge_core::SessionConfig;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG, when set, overrides the level picked by -v
    env_logger::Builder::new()
        .filter_level(log_level(cli.verbose))
        .parse_env(env_logger::Env::default())
        .init();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Info { bridge, session } => {
            let mut nand = open(&bridge, &config, &session)?;
            commands::run_info(&mut nand)
        }
        Commands::Scan { bridge, session } => {
            let mut nand = open(&bridge, &config, &session)?;
            commands::run_scan(&mut nand)
        }
        Commands::ReadPage {
            bridge,
            page,
            output,
            session,
        } => {
            let mut nand = open(&bridge, &config, &session)?;
            commands::run_read_page(&mut nand, page, output.as_deref())
        }
        Commands::ReadImage {
            bridge,
            output,
            index_page,
            session,
        } => {
            let mut nand = open(&bridge, &config, &session)?;
            let index_page = index_page.unwrap_or_else(|| config.index_page());
            commands::run_read_image(&mut nand, index_page, &output)
        }
        Commands::WriteImage {
            bridge,
            input,
            index_page,
            session,
        } => {
            let mut nand = open(&bridge, &config, &session)?;
            let index_page = index_page.unwrap_or_else(|| config.index_page());
            commands::run_write_image(&mut nand, index_page, &input)
        }
        Commands::WriteBlock {
            bridge,
            block,
            input,
            session,
        } => {
            let mut nand = open(&bridge, &config, &session)?;
            commands::run_write_block(&mut nand, block, &input)
        }
        Commands::ListBridges => {
            commands::list_bridges(&config);
            Ok(())
        }
    }
}

/// Open a session with command-line options layered over the config file
fn open(
    bridge: &str,
    config: &Config,
    args: &SessionArgs,
) -> Result<bridges::BridgeSession, Box<dyn std::error::Error>> {
    let session = session_config(config.session_config(), args);
    log::debug!("session config: {:?}", session);
    bridges::open_session(bridge, config, session)
}

fn log_level(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn session_config(mut session: SessionConfig, args: &SessionArgs) -> SessionConfig {
    if let Some(retries) = args.retries {
        session.max_write_retries = retries;
    }
    match args.max_polls {
        Some(0) => session.max_status_polls = None,
        Some(n) => session.max_status_polls = Some(n),
        None => {}
    }
    if args.no_onfi_check {
        session.check_onfi_signature = false;
    }
    session
}
