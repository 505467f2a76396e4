use crate::config::{self, GexSettings};
use crate::processor::{ProcessedChain, StrikeExposure};
use std::fmt;

/// The five levels, in report order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelKind {
    CallOi,
    PosGex,
    ZeroGamma,
    NegGex,
    PutOi,
}

impl LevelKind {
    pub const ALL: [LevelKind; 5] = [
        LevelKind::CallOi,
        LevelKind::PosGex,
        LevelKind::ZeroGamma,
        LevelKind::NegGex,
        LevelKind::PutOi,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            LevelKind::CallOi => "Call OI",
            LevelKind::PosGex => "Pos GEX",
            LevelKind::ZeroGamma => "Zero Gamma",
            LevelKind::NegGex => "Neg GEX",
            LevelKind::PutOi => "Put OI",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            LevelKind::CallOi => "Upper Resistance",
            LevelKind::PosGex => "Major Wall",
            LevelKind::ZeroGamma => "Regime Line",
            LevelKind::NegGex => "Support/Danger Zone",
            LevelKind::PutOi => "Lower Support",
        }
    }
}

impl fmt::Display for LevelKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    pub kind: LevelKind,
    pub strike: f64,
    /// Open interest for the OI levels, exposure for the GEX levels,
    /// net exposure at the strike for zero gamma
    pub value: f64,
    /// No strike qualified and the underlying price was used instead
    pub is_fallback: bool,
}

/// Strike near the underlying with net exposure close to zero
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZeroGammaCandidate {
    pub strike: f64,
    pub net_gex: f64,
}

#[derive(Debug, Clone)]
pub struct GexLevels {
    pub underlying_price: f64,
    pub call_oi: Level,
    pub pos_gex: Level,
    pub zero_gamma: Level,
    pub neg_gex: Level,
    pub put_oi: Level,
    pub total_call_gex: f64,
    pub total_put_gex: f64,
    pub net_gex: f64,
    /// Best candidates by |net exposure|, closest to zero first
    pub zero_gamma_candidates: Vec<ZeroGammaCandidate>,
}

impl GexLevels {
    pub fn get(&self, kind: LevelKind) -> &Level {
        match kind {
            LevelKind::CallOi => &self.call_oi,
            LevelKind::PosGex => &self.pos_gex,
            LevelKind::ZeroGamma => &self.zero_gamma,
            LevelKind::NegGex => &self.neg_gex,
            LevelKind::PutOi => &self.put_oi,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Level> {
        LevelKind::ALL.into_iter().map(move |kind| self.get(kind))
    }
}

/// Derive the five levels from processed strikes
pub fn calculate_levels(processed: &ProcessedChain, settings: &GexSettings) -> GexLevels {
    let underlying = processed.underlying_price;
    let strikes = &processed.strikes;

    let call_oi = pick_level(LevelKind::CallOi, strikes, underlying, |s| s.call_oi, Extreme::Max);
    let put_oi = pick_level(LevelKind::PutOi, strikes, underlying, |s| s.put_oi, Extreme::Max);
    let pos_gex = pick_level(LevelKind::PosGex, strikes, underlying, |s| s.call_gex, Extreme::Max);
    let neg_gex = pick_level(LevelKind::NegGex, strikes, underlying, |s| s.put_gex, Extreme::Min);

    let candidates = zero_gamma_candidates(strikes, underlying, settings.zero_gamma_window_pct);
    let zero_gamma = match candidates.first() {
        Some(best) => Level {
            kind: LevelKind::ZeroGamma,
            strike: best.strike,
            value: best.net_gex,
            is_fallback: false,
        },
        None => fallback_level(LevelKind::ZeroGamma, underlying),
    };

    GexLevels {
        underlying_price: underlying,
        call_oi,
        pos_gex,
        zero_gamma,
        neg_gex,
        put_oi,
        total_call_gex: processed.total_call_gex,
        total_put_gex: processed.total_put_gex,
        net_gex: processed.net_gex(),
        zero_gamma_candidates: candidates
            .into_iter()
            .take(config::ZERO_GAMMA_CANDIDATES_SHOWN)
            .collect(),
    }
}

#[derive(Debug, Clone, Copy)]
enum Extreme {
    /// Largest positive value
    Max,
    /// Most negative value
    Min,
}

/// Strike holding the extreme value; only strictly positive (Max) or strictly
/// negative (Min) values qualify, ties go to the lowest strike
fn pick_level<F>(
    kind: LevelKind,
    strikes: &[StrikeExposure],
    underlying: f64,
    value_of: F,
    extreme: Extreme,
) -> Level
where
    F: Fn(&StrikeExposure) -> f64,
{
    let mut best: Option<(f64, f64)> = None;

    for s in strikes {
        let value = value_of(s);
        let qualifies = match extreme {
            Extreme::Max => value > 0.0,
            Extreme::Min => value < 0.0,
        };
        if !qualifies {
            continue;
        }

        let better = match (best, extreme) {
            (None, _) => true,
            (Some((_, current)), Extreme::Max) => value > current,
            (Some((_, current)), Extreme::Min) => value < current,
        };
        if better {
            best = Some((s.strike, value));
        }
    }

    match best {
        Some((strike, value)) => Level { kind, strike, value, is_fallback: false },
        None => fallback_level(kind, underlying),
    }
}

fn fallback_level(kind: LevelKind, underlying: f64) -> Level {
    Level {
        kind,
        strike: underlying,
        value: 0.0,
        is_fallback: true,
    }
}

/// Active strikes within ±window of the underlying, ordered by |net exposure|
/// (ties by strike)
pub fn zero_gamma_candidates(
    strikes: &[StrikeExposure],
    underlying: f64,
    window_pct: f64,
) -> Vec<ZeroGammaCandidate> {
    let range = underlying * window_pct;
    let low = underlying - range;
    let high = underlying + range;

    let mut candidates: Vec<ZeroGammaCandidate> = strikes
        .iter()
        .filter(|s| s.strike >= low && s.strike <= high && s.is_active())
        .map(|s| ZeroGammaCandidate { strike: s.strike, net_gex: s.net_gex() })
        .collect();

    // strikes arrive ascending, so a stable sort keeps the lower strike first on ties
    candidates.sort_by(|a, b| a.net_gex.abs().total_cmp(&b.net_gex.abs()));
    candidates
}
