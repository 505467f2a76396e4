use crate::app_config::AppConfig;
use crate::auth::{self, Credentials, SchwabAuth, TokenStatus, TokenStore};
use crate::compare::{self, Accuracy};
use crate::config;
use crate::conversion::{self, ConvertedLevels};
use crate::error::GexError;
use crate::expiration::next_expiration;
use crate::levels::{self, GexLevels, LevelKind};
use crate::models::OptionChain;
use crate::pipeline::{self, PipelineReport, Stage, StageRunner};
use crate::processor;
use crate::report::{self, ReportLabels};
use crate::schwab_client::{ChainRequest, SchwabClient};
use crate::utility::{open_in_viewer, Timer};

use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;
use std::collections::HashMap;
use std::io::{IsTerminal, Write};
use tracing::{info, warn};

/// Command handler - one method per execution mode
pub struct GexCommands {
    config: AppConfig,
}

impl GexCommands {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    fn banner(title: &str) {
        println!("{}", "=".repeat(60).blue());
        println!("{}", title.green().bold());
        println!("{}", "=".repeat(60).blue());
        println!();
    }

    fn auth_client(&self, credentials: Option<Credentials>) -> Result<SchwabAuth> {
        let store = TokenStore::load(self.config.token_path());
        Ok(SchwabAuth::new(store, credentials, self.config.endpoints())?)
    }

    /// Credentials are only needed for token requests; a still-valid access
    /// token works without them
    fn optional_credentials() -> Option<Credentials> {
        match Credentials::from_env() {
            Ok(creds) => Some(creds),
            Err(e) => {
                warn!(error = %e, "API credentials not configured");
                None
            }
        }
    }

    // -----------------------------------------------
    // AUTHENTICATION
    // -----------------------------------------------

    /// Interactive browser login
    pub async fn run_auth(&self) -> Result<()> {
        Self::banner("Schwab Authentication");

        let credentials = Credentials::from_env()?;
        let mut auth = self.auth_client(Some(credentials))?;
        self.interactive_login(&mut auth).await?;

        println!("{} Tokens saved to {}", "✓".green(), self.config.token_path().display());
        Ok(())
    }

    async fn interactive_login(&self, auth: &mut SchwabAuth) -> Result<()> {
        let pkce = auth::generate_pkce();
        let url = auth.authorization_url(&pkce.challenge)?;

        println!("{}", "Step 1: Log in with your Schwab account in the browser".cyan());
        println!("{} {}", "→".cyan(), url);
        if let Err(e) = open_in_viewer(&url, None) {
            warn!(error = %format!("{:#}", e), "Could not open the browser");
            println!("{} Open the URL above manually", "⚠".yellow());
        }
        println!();

        println!("{}", "Step 2: Paste the full URL you were redirected to:".cyan());
        let redirect_url = read_line("> ").await?;
        let code = auth::extract_auth_code(&redirect_url)?;

        println!();
        println!("{}", "Step 3: Exchanging code for tokens...".cyan());
        auth.exchange_code(&code, &pkce.verifier)
            .await
            .context("Token exchange failed")?;

        info!("Interactive authentication completed");
        Ok(())
    }

    /// Make sure a usable access token exists, logging in interactively as a
    /// last resort when a terminal is attached
    pub async fn ensure_authenticated(&self) -> Result<()> {
        let mut auth = self.auth_client(Self::optional_credentials())?;

        match auth.get_valid_access_token().await {
            Ok(_) => {
                if let TokenStatus::Valid { expires_at } = auth.store().status_at(Local::now()) {
                    println!(
                        "{} Access token valid until {}",
                        "✓".green(),
                        expires_at.format("%I:%M:%S %p")
                    );
                }
                Ok(())
            }
            Err(GexError::NeedsAuthentication) if std::io::stdin().is_terminal() => {
                println!("{} No valid token, starting browser login", "ℹ".blue());
                println!();
                self.interactive_login(&mut auth).await?;
                println!("{} Authenticated", "✓".green());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn run_status(&self) -> Result<()> {
        Self::banner("Token Status");

        let store = TokenStore::load(self.config.token_path());
        println!("{} Token file: {}", "→".cyan(), store.path().display());

        match store.status_at(Local::now()) {
            TokenStatus::Valid { expires_at } => {
                let remaining = expires_at - Local::now();
                println!(
                    "{} Access token valid until {} ({} min left)",
                    "✓".green(),
                    expires_at.format("%Y-%m-%d %I:%M:%S %p"),
                    remaining.num_minutes()
                );
            }
            TokenStatus::Refreshable => {
                println!("{} Access token expired, will be refreshed on next fetch", "⚠".yellow());
            }
            TokenStatus::Expired => {
                println!("{} Tokens expired and no refresh token stored", "✗".red());
                println!("{} Run with GEX_MODE=auth", "ℹ".blue());
            }
            TokenStatus::Missing => {
                println!("{} No tokens found", "✗".red());
                println!("{} Run with GEX_MODE=auth", "ℹ".blue());
            }
        }

        if let Some(tokens) = store.tokens() {
            println!("{} Saved at: {}", "ℹ".blue(), tokens.saved_at.format("%Y-%m-%d %H:%M:%S"));
        }
        Ok(())
    }

    // -----------------------------------------------
    // FETCH
    // -----------------------------------------------

    pub async fn run_fetch(&self) -> Result<()> {
        Self::banner("Options Chain Fetch");

        let mut auth = self.auth_client(Self::optional_credentials())?;
        let token = auth.get_valid_access_token().await?;
        let client = SchwabClient::new(&token, self.config.endpoints())?;

        // Step 1: futures price for the live ratio
        println!("{}", "Step 1: Fetching futures price...".cyan());
        let futures = Timer::measure_async("Futures quote", || {
            client.fetch_futures_price(config::FUTURES_SYMBOLS)
        })
        .await;
        match &futures {
            Some((symbol, price)) => println!("{} {} = {:.2}", "✓".green(), symbol.yellow(), price),
            None => println!(
                "{} No futures price, the calculation will use the fallback ratio",
                "⚠".yellow()
            ),
        }
        println!();

        // Step 2: option chain for the next expiration
        let expiration = next_expiration(Local::now().date_naive());
        println!(
            "{} Fetching {} options expiring {}{}...",
            "Step 2:".cyan(),
            self.config.symbol.yellow(),
            expiration,
            if expiration.is_zero_dte { " (0DTE)" } else { "" }
        );
        let request = ChainRequest::new(self.config.symbol.clone(), expiration);
        let mut chain =
            Timer::measure_async("Option chain", || client.fetch_option_chain(&request)).await?;
        println!(
            "{} {} call strikes, {} put strikes",
            "✓".green(),
            chain.call_strike_count(),
            chain.put_strike_count()
        );
        println!();

        chain.futures_price = futures.map(|(_, price)| price);

        // Step 3: persist
        let path = self.config.chain_path();
        let json = serde_json::to_string_pretty(&chain)?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} Saved to {}", "✓".green(), path.display());
        info!(path = %path.display(), expiration = %expiration, "Option chain saved");

        Ok(())
    }

    // -----------------------------------------------
    // CALCULATE
    // -----------------------------------------------

    pub fn run_calculate(&self) -> Result<()> {
        Self::banner("GEX Level Calculator");
        let timer = Timer::start("Calculate");

        let path = self.config.chain_path();
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let chain: OptionChain = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let (levels, converted) = calculate_from_chain(&chain, &self.config.gex);
        print_levels(&levels, &converted);

        let labels = ReportLabels {
            underlying: self.config.symbol.clone(),
            futures: config::FUTURES_LABEL.to_string(),
        };
        let text = report::render_report(&levels, &converted, &labels, Local::now().naive_local());
        report::save_report(&self.config.results_path(), &text)?;

        println!();
        println!("{} Results saved to {}", "✓".green(), self.config.results_path().display());
        timer.stop();
        Ok(())
    }

    // -----------------------------------------------
    // COMPARE
    // -----------------------------------------------

    pub async fn run_compare(&self) -> Result<()> {
        Self::banner("GEX Levels Comparison");

        let path = self.config.results_path();
        let text = std::fs::read_to_string(&path).with_context(|| {
            format!("Failed to read {}, run GEX_MODE=calculate first", path.display())
        })?;
        println!("{}", text);
        println!();

        let ours = report::parse_report(&text);

        println!("{}", "Enter the reference levels (blank to skip):".cyan());
        let mut reference = HashMap::new();
        for kind in LevelKind::ALL {
            let input = read_line(&format!("{} ({}): $", kind.label(), self.config.symbol)).await?;
            if let Some(value) = compare::parse_reference_input(&input) {
                reference.insert(kind, value);
            }
        }
        let reference_net = read_line("Net GEX: ").await?;

        let comparison = compare::compare_levels(&ours, &reference, config::COMPARE_RATIO);

        println!();
        println!("{}", "=".repeat(70).blue());
        println!(
            "{:<15} {:<12} {:<12} {:<12} {:<12}",
            "Level", "Ours", "Reference", "Diff", "Diff (pts)"
        );
        println!("{}", "-".repeat(70));
        for row in &comparison.rows {
            println!(
                "{:<15} ${:<11.2} ${:<11.2} ${:<11.2} {:<8.0} {}",
                row.kind.label(),
                row.ours,
                row.reference,
                row.diff,
                row.diff_points,
                row.status.symbol()
            );
        }
        if let (Some(avg), Some(avg_pts)) =
            (comparison.average_diff, comparison.average_diff_points)
        {
            println!("{}", "-".repeat(70));
            println!("{:<15} {:<24} ${:<11.2} {:<8.0}", "AVERAGE DIFF", "", avg, avg_pts);
        }

        if let Some(net) = &ours.net_gex {
            if !reference_net.trim().is_empty() {
                println!();
                println!("{} Net GEX: {}", "ℹ".blue(), net);
                println!("{} Reference Net GEX: {}", "ℹ".blue(), reference_net.trim());
            }
        }

        println!();
        match comparison.accuracy {
            Some(Accuracy::Excellent) => {
                println!("{} {}: average difference within $1", "✅".green(), Accuracy::Excellent)
            }
            Some(Accuracy::Good) => {
                println!("{} {}: average difference within $2", "⚠️".yellow(), Accuracy::Good)
            }
            Some(Accuracy::NeedsWork) => {
                println!("{} {}: average difference above $2", "❌".red(), Accuracy::NeedsWork)
            }
            None => println!("{} No levels to compare", "ℹ".blue()),
        }
        println!("{}", "=".repeat(70).blue());

        Ok(())
    }

    // -----------------------------------------------
    // VIEWER
    // -----------------------------------------------

    pub fn run_view(&self) -> Result<()> {
        if !self.config.open_viewer {
            println!("{} Viewer disabled (GEX_NO_VIEWER)", "ℹ".blue());
            return Ok(());
        }
        let path = self.config.results_path();
        open_in_viewer(&path, self.config.viewer_command.as_deref())?;
        println!("{} Opened {}", "✓".green(), path.display());
        Ok(())
    }

    // -----------------------------------------------
    // FULL PIPELINE
    // -----------------------------------------------

    pub async fn run_pipeline(&mut self) -> PipelineReport {
        Self::banner("GEX Levels Launcher");
        let timer = Timer::start("Pipeline");

        let report = pipeline::run_pipeline(self, &Stage::SEQUENCE).await;

        println!();
        if report.succeeded() {
            println!("{}", "=".repeat(60).blue());
            println!("{}", "Done!".green().bold());
            println!("{}", "=".repeat(60).blue());
        }
        timer.stop();
        report
    }
}

impl StageRunner for GexCommands {
    async fn run_stage(&mut self, stage: Stage) -> Result<()> {
        match stage {
            Stage::Authenticate => self.ensure_authenticated().await,
            Stage::Fetch => self.run_fetch().await,
            Stage::Calculate => self.run_calculate(),
            Stage::View => self.run_view(),
        }
    }
}

/// Process a chain into levels and futures conversions
pub fn calculate_from_chain(
    chain: &OptionChain,
    settings: &config::GexSettings,
) -> (GexLevels, ConvertedLevels) {
    let processed = processor::process_option_chain(chain, settings);
    let levels = levels::calculate_levels(&processed, settings);
    let ratio = conversion::resolve_ratio(
        levels.underlying_price,
        chain.futures_price,
        settings.fallback_ratio,
    );
    let converted = conversion::convert_levels(&levels, ratio, settings.round_to);
    (levels, converted)
}

fn print_levels(levels: &GexLevels, converted: &ConvertedLevels) {
    let ratio = &converted.ratio;
    println!("{} Underlying: ${:.2}", "ℹ".blue(), levels.underlying_price);
    println!(
        "{} Futures: {} ({})",
        "ℹ".blue(),
        report::format_thousands(ratio.futures_price, 2),
        ratio.source
    );
    println!("{} Ratio: {:.4}", "ℹ".blue(), ratio.ratio);
    println!(
        "{} Net GEX: {}K (calls {}K, puts {}K)",
        "ℹ".blue(),
        report::format_thousands(levels.net_gex, 0),
        report::format_thousands(levels.total_call_gex, 0),
        report::format_thousands(levels.total_put_gex, 0)
    );
    println!();

    if !levels.zero_gamma_candidates.is_empty() {
        println!("{}", "Zero gamma candidates:".cyan());
        for candidate in &levels.zero_gamma_candidates {
            println!("  ${:.2}  net {:.2}", candidate.strike, candidate.net_gex);
        }
        println!();
    }

    println!("{}", "Levels:".cyan().bold());
    for level in levels.iter() {
        let futures = converted
            .get(level.kind)
            .map(|c| report::format_thousands(c.futures_level as f64, 0))
            .unwrap_or_default();
        let marker = if level.is_fallback {
            " (fallback)".yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {:<12} ${:<8.2} → {:>8}  {}{}",
            "•".green(),
            level.kind.label(),
            level.strike,
            futures,
            level.kind.description().dimmed(),
            marker
        );
    }
}

async fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    std::io::stdout().flush()?;

    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await
    .context("stdin reader stopped")?
    .context("Failed to read from stdin")?;

    Ok(line.trim().to_string())
}
