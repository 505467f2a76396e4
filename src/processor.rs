use crate::config::GexSettings;
use crate::models::{ExpDateMap, OptionChain};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Aggregated open interest and gamma exposure at one strike
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrikeExposure {
    pub strike: f64,
    pub call_oi: f64,
    pub put_oi: f64,
    pub call_gamma: f64,
    pub put_gamma: f64,
    /// gamma × OI, never negative
    pub call_gex: f64,
    /// -(gamma × OI), never positive
    pub put_gex: f64,
}

impl StrikeExposure {
    fn new(strike: f64) -> Self {
        Self { strike, ..Default::default() }
    }

    pub fn net_gex(&self) -> f64 {
        self.call_gex + self.put_gex
    }

    /// At least one side carries exposure after filtering
    pub fn is_active(&self) -> bool {
        self.call_gex != 0.0 || self.put_gex != 0.0
    }
}

/// Per-strike exposures for a whole chain, ascending by strike
#[derive(Debug, Clone)]
pub struct ProcessedChain {
    pub underlying_price: f64,
    pub strikes: Vec<StrikeExposure>,
    pub total_call_gex: f64,
    pub total_put_gex: f64,
    /// Contracts dropped by the open-interest filter
    pub filtered_out: usize,
}

impl ProcessedChain {
    pub fn net_gex(&self) -> f64 {
        self.total_call_gex + self.total_put_gex
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Side {
    Call,
    Put,
}

/// Underlying price from the chain, or the configured fallback when absent
pub fn resolve_underlying_price(chain: &OptionChain, settings: &GexSettings) -> f64 {
    match chain.underlying_price {
        Some(price) if price.is_finite() && price > 0.0 => price,
        _ => {
            warn!(
                fallback = settings.fallback_underlying_price,
                "Underlying price missing from chain, using fallback"
            );
            settings.fallback_underlying_price
        }
    }
}

/// Gamma exposure of one contract line; the sentinel values the API uses for
/// "not available" (negative or non-finite) count as zero
pub fn contract_gex(gamma: f64, open_interest: f64) -> f64 {
    sanitize(gamma) * sanitize(open_interest)
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { 0.0 }
}

/// Strike keys are compared at 1/1000 precision
fn strike_key(strike: f64) -> i64 {
    (strike * 1000.0).round() as i64
}

/// Build per-strike exposures from the raw chain
pub fn process_option_chain(chain: &OptionChain, settings: &GexSettings) -> ProcessedChain {
    let underlying_price = resolve_underlying_price(chain, settings);

    let mut by_strike: BTreeMap<i64, StrikeExposure> = BTreeMap::new();
    let mut filtered_out: usize = 0;

    filtered_out += accumulate_side(&chain.call_exp_date_map, Side::Call, settings, &mut by_strike);
    filtered_out += accumulate_side(&chain.put_exp_date_map, Side::Put, settings, &mut by_strike);

    let strikes: Vec<StrikeExposure> = by_strike.into_values().collect();
    let total_call_gex: f64 = strikes.iter().map(|s| s.call_gex).sum();
    let total_put_gex: f64 = strikes.iter().map(|s| s.put_gex).sum();

    debug!(
        strikes = strikes.len(),
        filtered_out,
        total_call_gex,
        total_put_gex,
        "Processed option chain"
    );

    ProcessedChain {
        underlying_price,
        strikes,
        total_call_gex,
        total_put_gex,
        filtered_out,
    }
}

fn accumulate_side(
    exp_map: &ExpDateMap,
    side: Side,
    settings: &GexSettings,
    by_strike: &mut BTreeMap<i64, StrikeExposure>,
) -> usize {
    let mut filtered_out: usize = 0;

    for (expiration, strikes) in exp_map {
        for (strike_str, entry) in strikes {
            let Ok(strike) = strike_str.trim().parse::<f64>() else {
                warn!(expiration = %expiration, strike = %strike_str, "Skipping unparsable strike");
                continue;
            };

            let Some(contract) = entry.primary() else {
                continue;
            };

            let oi = sanitize(contract.open_interest);
            if oi < settings.minimum_oi {
                filtered_out += 1;
                continue;
            }

            let gamma = sanitize(contract.gamma);
            let gex = contract_gex(gamma, oi);
            let exposure = by_strike
                .entry(strike_key(strike))
                .or_insert_with(|| StrikeExposure::new(strike));

            match side {
                Side::Call => {
                    exposure.call_gamma =
                        weighted_gamma(exposure.call_gamma, exposure.call_oi, gamma, oi);
                    exposure.call_oi += oi;
                    exposure.call_gex += gex;
                }
                Side::Put => {
                    exposure.put_gamma =
                        weighted_gamma(exposure.put_gamma, exposure.put_oi, gamma, oi);
                    exposure.put_oi += oi;
                    exposure.put_gex -= gex;
                }
            }
        }
    }

    filtered_out
}

/// OI-weighted gamma when the same strike appears under several expirations
fn weighted_gamma(current_gamma: f64, current_oi: f64, gamma: f64, oi: f64) -> f64 {
    let total_oi = current_oi + oi;
    if total_oi > 0.0 {
        (current_gamma * current_oi + gamma * oi) / total_oi
    } else {
        gamma
    }
}
