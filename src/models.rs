use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// expiration key ("2025-01-15:0") -> strike ("610.0") -> contracts
pub type ExpDateMap = BTreeMap<String, BTreeMap<String, ContractEntry>>;

/// Option chain as returned by the chains endpoint, plus the captured futures price
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionChain {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(rename = "underlyingPrice", default, skip_serializing_if = "Option::is_none")]
    pub underlying_price: Option<f64>,

    #[serde(rename = "callExpDateMap", default)]
    pub call_exp_date_map: ExpDateMap,

    #[serde(rename = "putExpDateMap", default)]
    pub put_exp_date_map: ExpDateMap,

    /// Futures price added by the fetcher; key name kept for existing data files
    #[serde(rename = "nq_price", default, skip_serializing_if = "Option::is_none")]
    pub futures_price: Option<f64>,

    /// Every other field of the response, preserved when the chain is saved
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OptionChain {
    pub fn call_strike_count(&self) -> usize {
        self.call_exp_date_map.values().map(|strikes| strikes.len()).sum()
    }

    pub fn put_strike_count(&self) -> usize {
        self.put_exp_date_map.values().map(|strikes| strikes.len()).sum()
    }
}

/// A strike normally maps to a list of contracts; a bare object is accepted too
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContractEntry {
    Many(Vec<OptionContract>),
    One(OptionContract),
}

impl ContractEntry {
    /// First contract listed for the strike
    pub fn primary(&self) -> Option<&OptionContract> {
        match self {
            ContractEntry::Many(contracts) => contracts.first(),
            ContractEntry::One(contract) => Some(contract),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionContract {
    #[serde(rename = "putCall", default, skip_serializing_if = "Option::is_none")]
    pub put_call: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,

    #[serde(rename = "strikePrice", default, skip_serializing_if = "Option::is_none")]
    pub strike_price: Option<f64>,

    #[serde(rename = "openInterest", default)]
    pub open_interest: f64,

    #[serde(default)]
    pub gamma: f64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// -----------------------------------------------
// QUOTES
// -----------------------------------------------

/// Quotes endpoint response, keyed by requested symbol
pub type QuoteResponse = HashMap<String, QuoteEntry>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteEntry {
    #[serde(default)]
    pub quote: Option<QuoteFields>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuoteFields {
    #[serde(rename = "lastPrice", default)]
    pub last_price: Option<f64>,

    #[serde(default)]
    pub mark: Option<f64>,

    #[serde(rename = "closePrice", default)]
    pub close_price: Option<f64>,
}

impl QuoteFields {
    /// Last price, then mark, then close; zero counts as missing
    pub fn best_price(&self) -> Option<f64> {
        [self.last_price, self.mark, self.close_price]
            .into_iter()
            .flatten()
            .find(|price| price.is_finite() && *price > 0.0)
    }
}

// -----------------------------------------------
// OAUTH TOKENS
// -----------------------------------------------

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    #[serde(default)]
    pub expires_in: Option<i64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Token file contents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(deserialize_with = "deserialize_local_timestamp")]
    pub token_expiry: DateTime<Local>,
    #[serde(deserialize_with = "deserialize_local_timestamp")]
    pub saved_at: DateTime<Local>,
}

/// RFC 3339, or an ISO timestamp without offset read as local time
/// (token files written by the earlier Python tooling)
pub fn parse_local_timestamp(raw: &str) -> Option<DateTime<Local>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    // a time repeated by a DST change resolves to its first occurrence
    Local.from_local_datetime(&naive).earliest()
}

fn deserialize_local_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Local>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_local_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}
