pub mod app_config;
pub mod auth;
pub mod commands;
pub mod compare;
pub mod config;
pub mod conversion;
pub mod error;
pub mod expiration;
pub mod levels;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod report;
pub mod schwab_client;
pub mod utility;

// Re-exports for convenience
pub use app_config::{AppConfig, ExecutionMode};
pub use commands::GexCommands;
pub use config::GexSettings;
pub use error::GexError;
pub use levels::{GexLevels, Level, LevelKind};
pub use models::OptionChain;
pub use pipeline::{PipelineReport, Stage, StageRunner};
pub use schwab_client::SchwabClient;
