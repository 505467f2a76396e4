use crate::error::needs_reauthentication;
use colored::Colorize;
use std::fmt;
use tracing::{error, info, warn};

/// One step of the launcher sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authenticate,
    Fetch,
    Calculate,
    View,
}

impl Stage {
    pub const SEQUENCE: [Stage; 4] =
        [Stage::Authenticate, Stage::Fetch, Stage::Calculate, Stage::View];

    /// Whether a failure stops the pipeline; the results exist once Calculate succeeds
    pub fn is_critical(&self) -> bool {
        !matches!(self, Stage::View)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Stage::Authenticate => "Authenticate",
            Stage::Fetch => "Fetch options chain",
            Stage::Calculate => "Calculate GEX levels",
            Stage::View => "Open results",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Executes individual stages; the launcher only decides ordering and aborts
#[allow(async_fn_in_trait)]
pub trait StageRunner {
    async fn run_stage(&mut self, stage: Stage) -> anyhow::Result<()>;
}

#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
    pub hint: String,
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub completed: Vec<Stage>,
    pub failure: Option<StageFailure>,
    /// Non-critical stages that failed
    pub warnings: Vec<(Stage, String)>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() { 0 } else { 1 }
    }
}

/// Operator hint printed when a stage fails
pub fn failure_hint(stage: Stage, err: &anyhow::Error) -> String {
    if needs_reauthentication(err) || stage == Stage::Authenticate {
        "Your access token may have expired. Re-authenticate with GEX_MODE=auth, then run again."
            .to_string()
    } else {
        match stage {
            Stage::Fetch => {
                "Check the network connection; if the problem persists, re-authenticate with GEX_MODE=auth."
                    .to_string()
            }
            Stage::Calculate => {
                "Check that the options chain file exists and is valid; run GEX_MODE=fetch to refresh it."
                    .to_string()
            }
            _ => "See the log file for details.".to_string(),
        }
    }
}

/// Run stages in order, stopping at the first critical failure
pub async fn run_pipeline<R: StageRunner>(runner: &mut R, stages: &[Stage]) -> PipelineReport {
    let mut report = PipelineReport::default();

    for (idx, &stage) in stages.iter().enumerate() {
        println!(
            "{} Step {}/{}: {}",
            "→".cyan(),
            idx + 1,
            stages.len(),
            stage.title().cyan().bold()
        );
        info!(stage = %stage, "Stage started");

        match runner.run_stage(stage).await {
            Ok(()) => {
                info!(stage = %stage, "Stage completed");
                report.completed.push(stage);
            }
            Err(e) if !stage.is_critical() => {
                warn!(stage = %stage, error = %format!("{:#}", e), "Non-critical stage failed");
                println!("{} {} failed: {:#}", "⚠".yellow(), stage, e);
                report.warnings.push((stage, format!("{:#}", e)));
            }
            Err(e) => {
                let hint = failure_hint(stage, &e);
                error!(
                    stage = %stage,
                    error = %format!("{:#}", e),
                    "Stage failed, aborting pipeline"
                );
                println!();
                println!("{} {} failed: {:#}", "✗".red(), stage, e);
                println!("{} {}", "ℹ".blue(), hint);

                report.failure = Some(StageFailure {
                    stage,
                    message: format!("{:#}", e),
                    hint,
                });
                break;
            }
        }
    }

    report
}
