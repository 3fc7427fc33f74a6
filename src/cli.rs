//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

const BRIDGE_HELP: &str =
    "Bridge to use, e.g. usb, usb:vid=0x09fb,pid=0x6001, dummy:blocks=256,bad=3+9 (see list-bridges)";

#[derive(Parser)]
#[command(name = "nandbridge")]
#[command(author, version, about = "ONFI NAND programmer for the USB command bridge", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (TOML format)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Session options shared across commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Attempts per page before a write is abandoned
    #[arg(long)]
    pub retries: Option<u32>,

    /// Status polls before giving up on a busy device (0 polls forever)
    #[arg(long, value_parser = parse_hex_u32)]
    pub max_polls: Option<u32>,

    /// Skip the ONFI signature check when opening the device
    #[arg(long)]
    pub no_onfi_check: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print device identification and geometry
    Info {
        #[arg(short, long, default_value = "usb", help = BRIDGE_HELP)]
        bridge: String,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Scan every block for bad block markers
    Scan {
        #[arg(short, long, default_value = "usb", help = BRIDGE_HELP)]
        bridge: String,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Read one raw page (main and spare area)
    ReadPage {
        #[arg(short, long, default_value = "usb", help = BRIDGE_HELP)]
        bridge: String,

        /// Page number (hex with 0x prefix or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        page: u32,

        /// Output file path (hex dump to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Read the image indexed at the index page
    ReadImage {
        #[arg(short, long, default_value = "usb", help = BRIDGE_HELP)]
        bridge: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Page holding the block list (default from config, else 0)
        #[arg(long, value_parser = parse_hex_u32)]
        index_page: Option<u32>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Write an image across good blocks and record it in the index page
    ///
    /// The whole block holding the index page is erased and only the index
    /// page is rewritten.
    WriteImage {
        #[arg(short, long, default_value = "usb", help = BRIDGE_HELP)]
        bridge: String,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Page holding the block list (default from config, else 0)
        #[arg(long, value_parser = parse_hex_u32)]
        index_page: Option<u32>,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// Erase one block and program a file into it
    WriteBlock {
        #[arg(short, long, default_value = "usb", help = BRIDGE_HELP)]
        bridge: String,

        /// Block number (hex with 0x prefix or decimal)
        #[arg(long, value_parser = parse_hex_u32)]
        block: u32,

        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        session: SessionArgs,
    },

    /// List supported bridges
    ListBridges,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hex_u32() {
        assert_eq!(parse_hex_u32("0x40"), Ok(64));
        assert_eq!(parse_hex_u32("64"), Ok(64));
        assert!(parse_hex_u32("0xZZ").is_err());
    }

    #[test]
    fn test_write_image_args() {
        let cli = Cli::try_parse_from([
            "nandbridge",
            "-v",
            "write-image",
            "-b",
            "dummy",
            "-i",
            "fw.bin",
            "--index-page",
            "0x40",
            "--retries",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::WriteImage {
                bridge,
                input,
                index_page,
                session,
            } => {
                assert_eq!(bridge, "dummy");
                assert_eq!(input, PathBuf::from("fw.bin"));
                assert_eq!(index_page, Some(0x40));
                assert_eq!(session.retries, Some(3));
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
