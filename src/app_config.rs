use crate::config::{self, GexSettings, SchwabEndpoints};
use anyhow::{bail, Result};
use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

/// What a single invocation does, selected with GEX_MODE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Authenticate, fetch, calculate, then open the results
    All,
    Auth,
    Status,
    Fetch,
    Calculate,
    Compare,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "" => Ok(Self::All),
            "auth" => Ok(Self::Auth),
            "status" => Ok(Self::Status),
            "fetch" => Ok(Self::Fetch),
            "calculate" | "calc" => Ok(Self::Calculate),
            "compare" => Ok(Self::Compare),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::All => "all",
            Self::Auth => "auth",
            Self::Status => "status",
            Self::Fetch => "fetch",
            Self::Calculate => "calculate",
            Self::Compare => "compare",
        };
        f.write_str(name)
    }
}

/// Application configuration handler
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: ExecutionMode,
    pub work_dir: PathBuf,
    pub symbol: String,
    pub open_viewer: bool,
    pub viewer_command: Option<String>,
    pub api_base: String,
    pub gex: GexSettings,
}

impl AppConfig {
    /// Create new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let raw_mode = config::get_execution_mode();
        let mode = match raw_mode.parse::<ExecutionMode>() {
            Ok(mode) => mode,
            Err(invalid) => {
                Self::print_usage();
                bail!("Invalid mode '{}'", invalid);
            }
        };

        Ok(Self {
            mode,
            work_dir: config::get_work_dir(),
            symbol: config::get_underlying_symbol(),
            open_viewer: config::should_open_viewer(),
            viewer_command: config::get_viewer_command(),
            api_base: config::get_api_base(),
            gex: GexSettings::from_env(),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.work_dir.is_dir() {
            bail!("Working directory {} does not exist", self.work_dir.display());
        }
        if self.symbol.trim().is_empty() {
            bail!("GEX_SYMBOL must not be empty");
        }
        if !self.api_base.starts_with("http://") && !self.api_base.starts_with("https://") {
            bail!("SCHWAB_API_BASE must be an http(s) URL, got '{}'", self.api_base);
        }
        if self.gex.round_to <= 0.0 {
            bail!("Rounding step must be positive, got {}", self.gex.round_to);
        }
        if self.gex.minimum_oi < 0.0 {
            bail!("Minimum open interest must not be negative, got {}", self.gex.minimum_oi);
        }
        Ok(())
    }

    /// Log configuration details at startup
    pub fn log_config(&self) {
        println!("{} Mode: {}", "→".cyan(), self.mode.to_string().yellow());
        println!("{} Working directory: {}", "→".cyan(), self.work_dir.display());
        println!("{} Symbol: {}", "→".cyan(), self.symbol.yellow());
        println!();

        info!(
            mode = %self.mode,
            work_dir = %self.work_dir.display(),
            symbol = %self.symbol,
            api_base = %self.api_base,
            open_viewer = self.open_viewer,
            minimum_oi = self.gex.minimum_oi,
            round_to = self.gex.round_to,
            "Configuration loaded"
        );
    }

    pub fn endpoints(&self) -> SchwabEndpoints {
        SchwabEndpoints::new(self.api_base.as_str())
    }

    pub fn token_path(&self) -> PathBuf {
        self.work_dir.join(config::TOKEN_FILE)
    }

    pub fn chain_path(&self) -> PathBuf {
        self.work_dir.join(config::OPTIONS_CHAIN_FILE)
    }

    pub fn results_path(&self) -> PathBuf {
        self.work_dir.join(config::RESULTS_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.work_dir.join(config::LOG_DIR)
    }

    /// Print usage instructions
    pub fn print_usage() {
        eprintln!("Set GEX_MODE environment variable to control execution mode");
        eprintln!("Examples:");
        eprintln!("  GEX_MODE=all cargo run         # Authenticate, fetch, calculate and open results");
        eprintln!("  GEX_MODE=auth cargo run        # Interactive Schwab login");
        eprintln!("  GEX_MODE=status cargo run      # Show token status");
        eprintln!("  GEX_MODE=fetch cargo run       # Fetch the options chain only");
        eprintln!("  GEX_MODE=calculate cargo run   # Calculate levels from the saved chain");
        eprintln!("  GEX_MODE=compare cargo run     # Compare saved results with reference levels");
        eprintln!("Other variables: GEX_WORKDIR, GEX_SYMBOL, GEX_NO_VIEWER, GEX_VIEWER,");
        eprintln!("  GEX_MIN_OI, GEX_ROUND_TO, SCHWAB_API_BASE");
    }
}
