//! plcctl - PLC tag configuration tool
//!
//! Validates device/datagram declarations, prints the transport tags and
//! connection strings they produce, and runs the value codec without a
//! controller attached.

mod codec;
mod inspect;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use common::LogConfig;
use plc_config::{load_store_from_file, ConfigStore, DataType};
use tracing::Level;

#[derive(Parser)]
#[command(name = "plcctl")]
#[command(about = "PLC tag configuration and codec tool")]
#[command(long_about = "PLC tag configuration and codec tool

Configuration:
  validate    Check a configuration file and every item address
  devices     List devices with their backend and connection string
  tags        Print the transport tag of every item

Codec:
  parse       Parse one tag address
  encode      Encode a value into item bytes
  decode      Decode item bytes into a value

Examples:
  plcctl -c config/plc.yaml validate
  plcctl tags --datagram motor
  plcctl encode INT DBW34.0 1450 --db 5
  plcctl decode LREAL DB4.0 \"00 00 00 00 00 00 F8 3F\" --db 5")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Configuration file (YAML, TOML or JSON)
    #[arg(short = 'c', long = "config", global = true, default_value = "config/plc.yaml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate,

    /// List configured devices
    Devices,

    /// Print generated transport tags
    Tags {
        /// Only this datagram
        #[arg(short, long)]
        datagram: Option<String>,
    },

    /// Parse a tag address such as DBW34.0 or %DB20.92:BOOL
    Parse {
        address: String,
        /// Data block number for DB addresses
        #[arg(long)]
        db: Option<i32>,
    },

    /// Encode a value for an item
    Encode {
        /// PLC type code or value id (INT, DInt, LREAL, ...)
        data_type: DataType,
        address: String,
        value: String,
        #[arg(long)]
        db: Option<i32>,
    },

    /// Decode item bytes given as hex
    Decode {
        data_type: DataType,
        address: String,
        hex: String,
        #[arg(long)]
        db: Option<i32>,
    },
}

fn load_store(path: &Path) -> Result<ConfigStore> {
    load_store_from_file(path)
        .with_context(|| format!("cannot load configuration {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let _log_guard = common::init_logging(
        &LogConfig::new("plcctl")
            .with_level(level)
            .with_ansi(!cli.no_color),
    );

    match cli.command {
        Commands::Validate => {
            let store = load_store(&cli.config)?;
            let report = inspect::validate(&store);
            inspect::print_validation(&report);
            if !report.is_valid {
                println!("\n{} Configuration is invalid", "ERROR".red());
                std::process::exit(1);
            }
        },
        Commands::Devices => {
            let store = load_store(&cli.config)?;
            inspect::print_devices(&store);
        },
        Commands::Tags { datagram } => {
            let store = load_store(&cli.config)?;
            inspect::print_tags(&store, datagram.as_deref())?;
        },
        Commands::Parse { address, db } => {
            let parsed = codec::parse_any(&address, db)?;
            codec::print_address(&parsed);
        },
        Commands::Encode {
            data_type,
            address,
            value,
            db,
        } => {
            let bytes = codec::encode(data_type, &address, &value, db)?;
            println!("{} {}", "OK".green(), plc_comlink::bytes::to_hex(&bytes));
        },
        Commands::Decode {
            data_type,
            address,
            hex,
            db,
        } => {
            let value = codec::decode(data_type, &address, &hex, db)?;
            println!("{} {}", "OK".green(), value);
        },
    }

    Ok(())
}
