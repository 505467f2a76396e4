use crate::levels::{GexLevels, LevelKind};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatioSource {
    /// Futures price captured at fetch time
    Live,
    /// Configured typical ratio
    Fallback,
}

impl fmt::Display for RatioSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RatioSource::Live => f.write_str("LIVE"),
            RatioSource::Fallback => f.write_str("FALLBACK"),
        }
    }
}

/// Futures / underlying price ratio used to map strikes to futures points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRatio {
    pub ratio: f64,
    pub underlying_price: f64,
    /// Live quote, or the estimate underlying × fallback ratio
    pub futures_price: f64,
    pub source: RatioSource,
}

pub fn resolve_ratio(
    underlying_price: f64,
    futures_price: Option<f64>,
    fallback_ratio: f64,
) -> PriceRatio {
    match futures_price {
        Some(futures) if futures.is_finite() && futures > 0.0 && underlying_price > 0.0 => {
            PriceRatio {
                ratio: futures / underlying_price,
                underlying_price,
                futures_price: futures,
                source: RatioSource::Live,
            }
        }
        _ => {
            warn!(fallback_ratio, "Futures price not available, using fallback ratio");
            PriceRatio {
                ratio: fallback_ratio,
                underlying_price,
                futures_price: underlying_price * fallback_ratio,
                source: RatioSource::Fallback,
            }
        }
    }
}

/// Round to the nearest multiple of `step`; exact halves go to the even multiple
pub fn round_to_nearest(value: f64, step: f64) -> f64 {
    (value / step).round_ties_even() * step
}

/// Underlying strike expressed in futures points
pub fn convert_level(strike: f64, ratio: f64, step: f64) -> i64 {
    round_to_nearest(strike * ratio, step) as i64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvertedLevel {
    pub kind: LevelKind,
    pub strike: f64,
    pub futures_level: i64,
}

#[derive(Debug, Clone)]
pub struct ConvertedLevels {
    pub ratio: PriceRatio,
    pub levels: Vec<ConvertedLevel>,
}

impl ConvertedLevels {
    pub fn get(&self, kind: LevelKind) -> Option<&ConvertedLevel> {
        self.levels.iter().find(|level| level.kind == kind)
    }
}

pub fn convert_levels(levels: &GexLevels, ratio: PriceRatio, step: f64) -> ConvertedLevels {
    let converted = levels
        .iter()
        .map(|level| ConvertedLevel {
            kind: level.kind,
            strike: level.strike,
            futures_level: convert_level(level.strike, ratio.ratio, step),
        })
        .collect();

    ConvertedLevels { ratio, levels: converted }
}
