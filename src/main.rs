use anyhow::Result;
use colored::Colorize;
use gex_levels::error::needs_reauthentication;
use gex_levels::logging::init_logging;
use gex_levels::{AppConfig, ExecutionMode, GexCommands};
use tracing::error;

#[tokio::main]
async fn main() -> Result<()> {
    // ========================================
    // CONFIGURATION - from environment
    // ========================================

    let config = AppConfig::from_env()?;
    config.validate()?;

    if let Err(e) = init_logging(&config.log_dir()) {
        eprintln!("{} Logging to file disabled: {:#}", "⚠".yellow(), e);
    }
    config.log_config();

    // ========================================

    let mode = config.mode;
    let mut commands = GexCommands::new(config);

    let result = match mode {
        ExecutionMode::All => {
            let report = commands.run_pipeline().await;
            std::process::exit(report.exit_code());
        }
        ExecutionMode::Auth => commands.run_auth().await,
        ExecutionMode::Status => commands.run_status(),
        ExecutionMode::Fetch => commands.run_fetch().await,
        ExecutionMode::Calculate => commands.run_calculate(),
        ExecutionMode::Compare => commands.run_compare().await,
    };

    if let Err(e) = result {
        error!(mode = %mode, error = %format!("{:#}", e), "Command failed");
        eprintln!("{} {:#}", "✗".red(), e);
        if needs_reauthentication(&e) {
            eprintln!("{} Re-authenticate with GEX_MODE=auth, then run again", "ℹ".blue());
        }
        std::process::exit(1);
    }

    Ok(())
}
