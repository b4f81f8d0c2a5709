// pflow - order fulfillment runs from the command line
//
// Reads marketplace order exports, creates carrier shipments, fetches labels,
// and keeps the shipment log / archive that make re-runs safe.

mod config_cmd;
mod context;
mod exit_codes;
mod export;
mod logging;
mod ship;
mod status;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use parcelflow_config::ConfigError;
use parcelflow_io::IoError;
use parcelflow_recon::ReconError;

use exit_codes::{
    EXIT_CONFIG_CREDENTIALS, EXIT_CONFIG_INVALID, EXIT_CONFIG_NOT_FOUND, EXIT_CONFIG_PARSE,
    EXIT_ERROR, EXIT_IO, EXIT_SHIP_PERSIST, EXIT_SHIP_SOURCE, EXIT_SUCCESS, EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "pflow")]
#[command(about = "Ship marketplace orders through the carrier and track every attempt")]
#[command(version)]
#[command(long_version = long_version())]
struct Cli {
    /// Config file (default: $PFLOW_CONFIG, then the platform config dir)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Carrier API user (overrides PFLOW_CARRIER_USER and the config file)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Carrier API password (overrides PFLOW_CARRIER_PASSWORD and the config file)
    #[arg(long, global = true)]
    password: Option<String>,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create shipments and fetch labels for every pending order
    #[command(after_help = "\
Examples:
  pflow ship --orders orders.csv
  pflow ship --orders orders.xlsx --summary out/summary.xlsx
  pflow ship --orders pending.json --db shipments.db --json")]
    Ship {
        /// Order feed (.csv, .xlsx, .xls, .ods or .json)
        #[arg(long, value_name = "FILE")]
        orders: PathBuf,

        #[command(flatten)]
        reports: ship::ReportArgs,
    },

    /// Fetch labels for shipments that exist but have no label yet
    #[command(after_help = "\
Examples:
  pflow retry-labels
  pflow retry-labels --orders orders.csv --summary out/retry.xlsx")]
    RetryLabels {
        /// Order feed, needed to archive orders whose label arrives
        #[arg(long, value_name = "FILE")]
        orders: Option<PathBuf>,

        #[command(flatten)]
        reports: ship::ReportArgs,
    },

    /// Show where every known order stands
    #[command(after_help = "\
Examples:
  pflow status
  pflow status --orders orders.csv --json")]
    Status {
        /// Include orders from this feed that have never been processed
        #[arg(long, value_name = "FILE")]
        orders: Option<PathBuf>,

        /// Print JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Write the marketplace tracking import for newly archived orders
    #[command(after_help = "\
Examples:
  pflow export --out tracking_import.csv")]
    Export {
        /// Import file to write
        #[arg(long, value_name = "FILE", default_value = "tracking_import.csv")]
        out: PathBuf,

        /// Print JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// Inspect the configuration
    #[command(subcommand)]
    Config(config_cmd::ConfigCommands),
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

/// Global options every command needs.
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub user: Option<String>,
    pub password: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_json, cli.verbose);

    let global = GlobalArgs { config: cli.config, user: cli.user, password: cli.password };

    let result = match cli.command {
        Commands::Ship { orders, reports } => ship::cmd_ship(&global, orders, reports),
        Commands::RetryLabels { orders, reports } => ship::cmd_retry_labels(&global, orders, reports),
        Commands::Status { orders, json } => status::cmd_status(&global, orders, json),
        Commands::Export { out, json } => export::cmd_export(&global, out, json),
        Commands::Config(cmd) => config_cmd::cmd_config(&global, cmd),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_IO, msg)
    }

    /// Map a config error to its exit code, with a hint where one helps.
    pub fn config(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound(_) => Self::new(EXIT_CONFIG_NOT_FOUND, err.to_string())
                .with_hint("pass --config FILE or set PFLOW_CONFIG to an existing file"),
            ConfigError::Read { .. } => Self::new(EXIT_IO, err.to_string()),
            ConfigError::Parse { .. } => Self::new(EXIT_CONFIG_PARSE, err.to_string()),
            ConfigError::Invalid(_) => Self::new(EXIT_CONFIG_INVALID, err.to_string())
                .with_hint("run `pflow config validate` to list every problem"),
            ConfigError::MissingCredential(_) => Self::new(EXIT_CONFIG_CREDENTIALS, err.to_string())
                .with_hint("pass --user/--password, set PFLOW_CARRIER_USER/PFLOW_CARRIER_PASSWORD, or fill [carrier] in the config"),
        }
    }

    /// Errors from reading an order feed.
    pub fn orders(err: IoError) -> Self {
        match err {
            IoError::UnsupportedFormat(_) => Self::new(EXIT_USAGE, err.to_string())
                .with_hint("order feeds must be .csv, .xlsx, .xls, .ods or .json"),
            IoError::Read { .. } => Self::new(EXIT_IO, err.to_string()),
            IoError::MissingColumns { .. } => Self::new(EXIT_SHIP_SOURCE, err.to_string())
                .with_hint("map the feed's headers under [orders.columns] in the config"),
            _ => Self::new(EXIT_SHIP_SOURCE, err.to_string()),
        }
    }

    /// Errors loading the log or archive snapshots.
    pub fn state(err: IoError) -> Self {
        Self::new(EXIT_IO, err.to_string())
    }

    pub fn recon(err: ReconError) -> Self {
        match err {
            ReconError::Persist { .. } => Self::new(EXIT_SHIP_PERSIST, err.to_string())
                .with_hint("the pass stopped; fix the state directory and re-run (completed orders are not repeated)"),
            ReconError::InvalidTransition { .. } | ReconError::NoShipment(_) => {
                Self::new(EXIT_ERROR, err.to_string())
            }
        }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn missing_credential_maps_to_credentials_code() {
        let err = CliError::config(ConfigError::MissingCredential("user"));
        assert_eq!(err.code, EXIT_CONFIG_CREDENTIALS);
        assert!(err.hint.is_some());
    }

    #[test]
    fn persist_failure_maps_to_persist_code() {
        let err = CliError::recon(ReconError::Persist { target: "archive", message: "disk full".into() });
        assert_eq!(err.code, EXIT_SHIP_PERSIST);
        assert!(err.message.contains("disk full"));
    }

    #[test]
    fn unsupported_feed_is_usage_error() {
        let err = CliError::orders(IoError::UnsupportedFormat(PathBuf::from("orders.pdf")));
        assert_eq!(err.code, EXIT_USAGE);
    }
}
