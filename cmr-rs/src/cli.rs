//! Command-line argument parsing.
//!
//! Usage:
//!   cmr run <script> (--serial [<port>] | --udp [<host>] | --dry-run) [--port N]
//!   cmr check <script> [--tolerant]
//!   cmr export <script> [-o <file>] [--port <port>]
//!   cmr commands
//!   cmr channel --serial <port> <channel>
//!   cmr ports
//!
//! `--settings <file>` may be given before any subcommand.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "cmr", version, about = "Run controller input scripts over serial or UDP")]
pub struct Cli {
    /// Settings file (defaults to settings.json in the config directory).
    #[arg(long, global = true, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a script strictly and run it until it ends or ctrl-c.
    Run {
        script: PathBuf,
        #[command(flatten)]
        target: Target,
        /// UDP port (defaults to settings, then 4950).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Validate a script and list its commands.
    Check {
        script: PathBuf,
        /// Report structural problems as warnings instead of failing.
        #[arg(long)]
        tolerant: bool,
    },

    /// Translate a structured script into a standalone Python program.
    Export {
        script: PathBuf,
        /// Output file (defaults to the script path with a .py extension).
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// Serial port baked into the program (defaults to settings, then COM4).
        #[arg(long)]
        port: Option<String>,
    },

    /// List every command with its fields and documentation.
    Commands,

    /// Send the receiver channel-set packet (power cycle the receiver after).
    Channel {
        /// Serial port of the transmitter.
        #[arg(long, value_name = "PORT")]
        serial: Option<String>,
        channel: u8,
    },

    /// List available serial ports.
    Ports,
}

/// Where `run` sends controller state.
#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
pub struct Target {
    /// Serial microcontroller; the port falls back to settings.
    #[arg(long, value_name = "PORT", num_args = 0..=1, default_missing_value = "")]
    pub serial: Option<String>,

    /// 3DS input redirection; the host falls back to settings.
    #[arg(long, value_name = "HOST", num_args = 0..=1, default_missing_value = "")]
    pub udp: Option<String>,

    /// Record state in memory instead of sending it anywhere.
    #[arg(long)]
    pub dry_run: bool,
}

/// Resolved `run` target.  `None` means "take it from settings".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice<'a> {
    Serial(Option<&'a str>),
    Udp(Option<&'a str>),
    Memory,
}

impl Target {
    /// Which backend was asked for; an empty value means "use settings".
    pub fn choice(&self) -> BackendChoice<'_> {
        match (&self.serial, &self.udp) {
            (Some(port), _) => BackendChoice::Serial(non_empty(port)),
            (None, Some(host)) => BackendChoice::Udp(non_empty(host)),
            (None, None) => BackendChoice::Memory,
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    Some(s).filter(|s| !s.is_empty())
}

// ── Parsing ───────────────────────────────────────────────────────────────────

pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv<I, T>(argv: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(argv)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
