//! cloudwatcher CLI - Command-line tool for the AAG CloudWatcher weather station.
//!
//! ## Features
//!
//! - Read identification and sensor values
//! - Watch the sensors continuously
//! - Read and set the rain sensor heater PWM
//! - Upgrade the station firmware
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use cloudwatcher::{CloudWatcher, NativeLink, ProtocolVariant, convert::Anemometer};
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Turn Ctrl-C into a flag checked by long-running loops.
///
/// Only installed by commands that can stop cleanly; everywhere else Ctrl-C
/// keeps its default behavior.
pub(crate) fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
}

/// Errors with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Missing or invalid user input.
    #[error("{0}")]
    Usage(String),
    /// Interrupted by the user.
    #[error("{0}")]
    Cancelled(String),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            Self::Usage(_) => 2,
            Self::Cancelled(_) => 130,
        }
    }
}

/// Map an error to the process exit code.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<CliError>()
        .map_or(1, CliError::exit_code)
}

/// cloudwatcher - Talk to an AAG CloudWatcher weather station.
///
/// Environment variables:
///   CLOUDWATCHER_PORT        - Serial port of the station
///   CLOUDWATCHER_VARIANT     - Firmware generation (current, legacy)
///   CLOUDWATCHER_ANEMOMETER  - Anemometer model (black, grey)
#[derive(Parser)]
#[command(name = "cloudwatcher")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub(crate) struct Cli {
    /// Serial port of the station.
    #[arg(short, long, global = true, env = "CLOUDWATCHER_PORT")]
    pub(crate) port: Option<String>,

    /// Station firmware generation.
    #[arg(long, global = true, env = "CLOUDWATCHER_VARIANT")]
    pub(crate) variant: Option<Variant>,

    /// Anemometer model used for wind speed.
    #[arg(long, global = true, env = "CLOUDWATCHER_ANEMOMETER")]
    pub(crate) anemometer: Option<AnemometerModel>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    pub(crate) quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

/// Station firmware generations.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum Variant {
    /// Current firmware (no parity).
    Current,
    /// Older firmware (odd parity).
    Legacy,
}

impl From<Variant> for ProtocolVariant {
    fn from(variant: Variant) -> Self {
        match variant {
            Variant::Current => ProtocolVariant::Current,
            Variant::Legacy => ProtocolVariant::Legacy,
        }
    }
}

/// Anemometer models.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum AnemometerModel {
    /// Current black model.
    Black,
    /// Older grey model.
    Grey,
}

impl From<AnemometerModel> for Anemometer {
    fn from(model: AnemometerModel) -> Self {
        match model {
            AnemometerModel::Black => Anemometer::Black,
            AnemometerModel::Grey => Anemometer::Grey,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Show station name, firmware version and serial number.
    Info {
        /// Output information as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Read every sensor once.
    Read {
        /// Output readings as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Read the sensors repeatedly until Ctrl-C.
    Watch {
        /// Seconds between two readings.
        #[arg(short, long, default_value = "60")]
        interval: u64,

        /// Output one JSON object per line.
        #[arg(long)]
        json: bool,
    },

    /// Read or set the rain sensor heater PWM.
    Pwm {
        /// New PWM value (1-1023). Reads the current value if omitted.
        #[arg(value_parser = clap::value_parser!(u16).range(1..=1023))]
        value: Option<u16>,
    },

    /// Reset the station's serial buffers.
    Reset,

    /// Reboot the station into its bootloader.
    Reboot,

    /// Upload a firmware image (.has) to the station.
    Upgrade {
        /// Path to the firmware image.
        firmware: PathBuf,

        /// Reboot the station into its bootloader first.
        #[arg(long)]
        reboot_first: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "cloudwatcher v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code(&err));
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Info { json } => commands::station::cmd_info(cli, &config, *json),
        Commands::Read { json } => commands::station::cmd_read(cli, &config, *json),
        Commands::Watch { interval, json } => {
            commands::station::cmd_watch(cli, &config, *interval, *json)
        },
        Commands::Pwm { value } => commands::station::cmd_pwm(cli, &config, *value),
        Commands::Reset => commands::station::cmd_reset(cli, &config),
        Commands::Reboot => commands::station::cmd_reboot(cli, &config),
        Commands::Upgrade {
            firmware,
            reboot_first,
        } => commands::upgrade::cmd_upgrade(
            cli,
            &config,
            firmware,
            *reboot_first || config.upgrade.reboot_first,
        ),
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Resolve the serial port from CLI args, environment or config.
pub(crate) fn get_port(cli: &Cli, config: &Config) -> Result<String> {
    cli.port
        .clone()
        .or_else(|| config.connection.serial.clone())
        .ok_or_else(|| {
            CliError::Usage(
                "no serial port given; use --port, CLOUDWATCHER_PORT or [connection] serial"
                    .to_string(),
            )
            .into()
        })
}

/// Resolve the protocol variant from CLI args, environment or config.
pub(crate) fn get_variant(cli: &Cli, config: &Config) -> Result<ProtocolVariant> {
    if let Some(variant) = cli.variant {
        return Ok(variant.into());
    }
    match config.connection.variant.as_deref() {
        None => Ok(ProtocolVariant::default()),
        Some(name) => ProtocolVariant::from_name(name).ok_or_else(|| {
            CliError::Usage(format!("unknown protocol variant '{name}' in config")).into()
        }),
    }
}

/// Resolve the anemometer model from CLI args, environment or config.
pub(crate) fn get_anemometer(cli: &Cli, config: &Config) -> Result<Anemometer> {
    if let Some(model) = cli.anemometer {
        return Ok(model.into());
    }
    match config.station.anemometer.as_deref() {
        None => Ok(Anemometer::default()),
        Some(name) => Anemometer::from_name(name).ok_or_else(|| {
            CliError::Usage(format!("unknown anemometer model '{name}' in config")).into()
        }),
    }
}

/// Resolve port and variant and announce them.
fn station_target(cli: &Cli, config: &Config) -> Result<(String, ProtocolVariant)> {
    let port = get_port(cli, config)?;
    let variant = get_variant(cli, config)?;

    if !cli.quiet {
        eprintln!(
            "{} Using {} ({variant} firmware)",
            style("🔌").cyan(),
            style(&port).green()
        );
    }
    Ok((port, variant))
}

/// Open the station on the configured port.
pub(crate) fn open_station(cli: &Cli, config: &Config) -> Result<CloudWatcher<NativeLink>> {
    let (port, variant) = station_target(cli, config)?;
    CloudWatcher::open(&port, variant).with_context(|| format!("cannot open station on {port}"))
}

/// Open the configured port without sending any command.
pub(crate) fn attach_station(cli: &Cli, config: &Config) -> Result<CloudWatcher<NativeLink>> {
    let (port, variant) = station_target(cli, config)?;
    CloudWatcher::attach(&port, variant).with_context(|| format!("cannot open {port}"))
}
