use std::path::PathBuf;
use std::time::Duration;

// -----------------------------------------------
// SCHWAB API ENDPOINTS
// -----------------------------------------------
pub const SCHWAB_API_BASE: &str = "https://api.schwabapi.com";
pub const SCHWAB_AUTH_PATH: &str = "/v1/oauth/authorize";
pub const SCHWAB_TOKEN_PATH: &str = "/v1/oauth/token";
pub const SCHWAB_QUOTES_PATH: &str = "/marketdata/v1/quotes";
pub const SCHWAB_CHAINS_PATH: &str = "/marketdata/v1/chains";

pub const DEFAULT_REDIRECT_URI: &str = "https://127.0.0.1";

// -----------------------------------------------
// SYMBOLS
// -----------------------------------------------
pub const DEFAULT_UNDERLYING: &str = "QQQ";
pub const FUTURES_LABEL: &str = "NQ";

/// Tried in order until one returns a usable price
pub const FUTURES_SYMBOLS: &[&str] = &["/NQ", "NQ", "/NQH25", "/NQZ24"];

// -----------------------------------------------
// FILES (relative to the working directory)
// -----------------------------------------------
pub const TOKEN_FILE: &str = "tokens.json";
pub const OPTIONS_CHAIN_FILE: &str = "options_chain_raw.json";
pub const RESULTS_FILE: &str = "gex_levels_output.txt";
pub const LOG_DIR: &str = "logs";
pub const LOG_FILE_PREFIX: &str = "gex-levels.log";

// -----------------------------------------------
// HTTP CLIENT CONFIG
// -----------------------------------------------
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(20);
pub const BODY_PREVIEW_CHARS: usize = 500;

// -----------------------------------------------
// RETRY CONFIG
// -----------------------------------------------
pub const RETRY_BASE_DELAY_MS: u64 = 200;
pub const RETRY_FACTOR: u64 = 2;
pub const RETRY_MAX_DELAY_SECS: u64 = 3;
pub const RETRY_MAX_ATTEMPTS: usize = 3;

// -----------------------------------------------
// TOKEN LIFETIME
// -----------------------------------------------
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 1800;
pub const TOKEN_EXPIRY_BUFFER_SECS: i64 = 120;

// -----------------------------------------------
// GEX CALCULATION
// -----------------------------------------------
pub const MINIMUM_OI: f64 = 100.0;
pub const ROUND_TO: f64 = 25.0;
pub const FALLBACK_RATIO: f64 = 41.36;
pub const FALLBACK_UNDERLYING_PRICE: f64 = 610.0;
pub const ZERO_GAMMA_WINDOW_PCT: f64 = 0.05;
pub const ZERO_GAMMA_CANDIDATES_SHOWN: usize = 5;

// -----------------------------------------------
// COMPARISON GRADING
// -----------------------------------------------
pub const COMPARE_RATIO: f64 = 41.35;
pub const COMPARE_EXCELLENT_DIFF: f64 = 1.0;
pub const COMPARE_GOOD_DIFF: f64 = 2.0;

/// Endpoint URLs under one API base
#[derive(Debug, Clone, PartialEq)]
pub struct SchwabEndpoints {
    base_url: String,
}

impl Default for SchwabEndpoints {
    fn default() -> Self {
        Self::new(SCHWAB_API_BASE)
    }
}

impl SchwabEndpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    pub fn authorize(&self) -> String {
        format!("{}{}", self.base_url, SCHWAB_AUTH_PATH)
    }

    pub fn token(&self) -> String {
        format!("{}{}", self.base_url, SCHWAB_TOKEN_PATH)
    }

    pub fn quotes(&self) -> String {
        format!("{}{}", self.base_url, SCHWAB_QUOTES_PATH)
    }

    pub fn chains(&self) -> String {
        format!("{}{}", self.base_url, SCHWAB_CHAINS_PATH)
    }
}

/// Parameters of the level calculation and futures conversion
#[derive(Debug, Clone, PartialEq)]
pub struct GexSettings {
    pub minimum_oi: f64,
    pub round_to: f64,
    pub fallback_ratio: f64,
    pub fallback_underlying_price: f64,
    pub zero_gamma_window_pct: f64,
}

impl Default for GexSettings {
    fn default() -> Self {
        Self {
            minimum_oi: MINIMUM_OI,
            round_to: ROUND_TO,
            fallback_ratio: FALLBACK_RATIO,
            fallback_underlying_price: FALLBACK_UNDERLYING_PRICE,
            zero_gamma_window_pct: ZERO_GAMMA_WINDOW_PCT,
        }
    }
}

impl GexSettings {
    /// Defaults with per-field overrides from GEX_MIN_OI, GEX_ROUND_TO and GEX_FALLBACK_RATIO
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            minimum_oi: env_f64("GEX_MIN_OI").unwrap_or(defaults.minimum_oi),
            round_to: env_f64("GEX_ROUND_TO")
                .filter(|step| *step > 0.0)
                .unwrap_or(defaults.round_to),
            fallback_ratio: env_f64("GEX_FALLBACK_RATIO")
                .filter(|ratio| *ratio > 0.0)
                .unwrap_or(defaults.fallback_ratio),
            ..defaults
        }
    }
}

// -----------------------------------------------
// RUNTIME CONFIGURATION
// -----------------------------------------------

/// Get the execution mode from environment or default to the full pipeline
pub fn get_execution_mode() -> String {
    std::env::var("GEX_MODE").unwrap_or_else(|_| "all".to_string())
}

/// Directory holding tokens, chain data, results and logs
pub fn get_work_dir() -> PathBuf {
    std::env::var("GEX_WORKDIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

pub fn get_underlying_symbol() -> String {
    std::env::var("GEX_SYMBOL").unwrap_or_else(|_| DEFAULT_UNDERLYING.to_string())
}

/// Opening the results file can be disabled for unattended runs
pub fn should_open_viewer() -> bool {
    std::env::var("GEX_NO_VIEWER").is_err()
}

/// Explicit viewer command, e.g. "notepad" or "code"
pub fn get_viewer_command() -> Option<String> {
    std::env::var("GEX_VIEWER").ok().filter(|v| !v.trim().is_empty())
}

pub fn get_app_key() -> Option<String> {
    std::env::var("SCHWAB_APP_KEY").ok().filter(|v| !v.is_empty())
}

pub fn get_secret_key() -> Option<String> {
    std::env::var("SCHWAB_SECRET_KEY").ok().filter(|v| !v.is_empty())
}

/// API host, overridable for a sandbox or a local stand-in
pub fn get_api_base() -> String {
    std::env::var("SCHWAB_API_BASE")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| SCHWAB_API_BASE.to_string())
}

pub fn get_redirect_uri() -> String {
    std::env::var("SCHWAB_REDIRECT_URI").unwrap_or_else(|_| DEFAULT_REDIRECT_URI.to_string())
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key)
        .ok()
        .and_then(|val| val.trim().parse::<f64>().ok())
        .filter(|val| val.is_finite())
}
