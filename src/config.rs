//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};

use clap::Parser;

/// CLI argument parsing structure
#[derive(Parser, Debug)]
#[command(name = "pomo-keeper")]
#[command(about = "A persistent pomodoro timer daemon that survives restarts and suspension")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Directory holding the settings and state records
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Also show phase alerts as desktop notifications (notify-send)
    #[arg(long)]
    pub desktop_alerts: bool,

    /// How often to re-check the phase deadline against the wall clock, in seconds
    #[arg(long, default_value = "15")]
    pub watchdog_secs: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    /// Data directory, defaulting to the platform's local data dir
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pomo-keeper")
        })
    }

    /// Watchdog period, never shorter than one second
    pub fn watchdog_period(&self) -> Duration {
        Duration::from_secs(self.watchdog_secs.max(1))
    }
}
