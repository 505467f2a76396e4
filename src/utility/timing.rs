// ============================================
// TIMING UTILITY - stage durations
// ============================================
// Usage:
//   let timer = Timer::start("Fetch");  ...  let elapsed = timer.stop();
//   let result = Timer::measure_async("Fetch", || async { ... }).await;
// ============================================

use colored::Colorize;
use std::time::{Duration, Instant};
use tracing::info;

/// Measures one named step and reports it when stopped
pub struct Timer {
    name: String,
    start: Instant,
}

impl Timer {
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
        }
    }

    /// Stop the timer, print and log the duration
    pub fn stop(self) -> Duration {
        let duration = self.start.elapsed();
        let ms = duration.as_millis();

        if ms < 1000 {
            println!("{} {} - {}ms", Self::emoji(ms), self.name.as_str().cyan(), ms);
        } else {
            println!(
                "{} {} - {:.2}s",
                Self::emoji(ms),
                self.name.as_str().cyan(),
                duration.as_secs_f64()
            );
        }
        info!(step = %self.name, elapsed_ms = ms as u64, "Step finished");

        duration
    }

    fn emoji(ms: u128) -> &'static str {
        match ms {
            0..=100 => "⚡",
            101..=1000 => "✅",
            1001..=5000 => "⏱️",
            _ => "🐌",
        }
    }

    /// Time an async function
    pub async fn measure_async<F, Fut, R>(name: impl Into<String>, f: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = R>,
    {
        let timer = Self::start(name);
        let result = f().await;
        timer.stop();
        result
    }
}
