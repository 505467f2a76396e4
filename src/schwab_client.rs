use crate::config::{self, SchwabEndpoints};
use crate::error::GexError;
use crate::expiration::Expiration;
use crate::models::{OptionChain, QuoteResponse};
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::{debug, info, warn};

// -----------------------------------------------
// CLIENT WRAPPER HOLDING THE BEARER TOKEN
// -----------------------------------------------
pub struct SchwabClient {
    client: Client,
    endpoints: SchwabEndpoints,
}

/// Parameters of a single-expiration chain request
#[derive(Debug, Clone)]
pub struct ChainRequest {
    pub symbol: String,
    pub expiration: Expiration,
}

impl ChainRequest {
    pub fn new(symbol: impl Into<String>, expiration: Expiration) -> Self {
        Self { symbol: symbol.into(), expiration }
    }

    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let date = self.expiration.to_string();
        vec![
            ("symbol", self.symbol.clone()),
            ("contractType", "ALL".to_string()),
            ("includeUnderlyingQuote", "true".to_string()),
            ("strategy", "SINGLE".to_string()),
            ("range", "ALL".to_string()),
            ("fromDate", date.clone()),
            ("toDate", date),
        ]
    }
}

impl SchwabClient {
    pub fn new(access_token: &str, endpoints: SchwabEndpoints) -> Result<Self, GexError> {
        Ok(Self {
            client: build_client(access_token)?,
            endpoints,
        })
    }

    /// GET with retries on transport errors, 429 and 5xx; 401 and other
    /// client errors fail at once
    async fn fetch_json(&self, url: &str, query: &[(&str, String)]) -> Result<String, GexError> {
        let backoff = ExponentialBackoff::from_millis(config::RETRY_BASE_DELAY_MS)
            .factor(config::RETRY_FACTOR)
            .max_delay(Duration::from_secs(config::RETRY_MAX_DELAY_SECS))
            .take(config::RETRY_MAX_ATTEMPTS);

        RetryIf::spawn(
            backoff,
            || async {
                let res = self.client.get(url).query(query).send().await?;
                let status = res.status();
                debug!(url, status = status.as_u16(), "HTTP response");

                let text = res.text().await?;
                check_response(status, text)
            },
            |e: &GexError| {
                let retry = e.is_retryable();
                if retry {
                    warn!(url, error = %e, "Request failed, retrying");
                }
                retry
            },
        )
        .await
    }

    // -----------------------------------------------
    // QUOTES
    // -----------------------------------------------
    pub async fn fetch_quote_price(&self, symbol: &str) -> Result<Option<f64>, GexError> {
        let query = [("symbols", symbol.to_string()), ("fields", "quote".to_string())];
        let text = self.fetch_json(&self.endpoints.quotes(), &query).await?;
        let quotes: QuoteResponse = serde_json::from_str(&text)?;

        Ok(quotes
            .get(symbol)
            .and_then(|entry| entry.quote.as_ref())
            .and_then(|quote| quote.best_price()))
    }

    /// First symbol with a usable price wins; failures are logged and skipped
    pub async fn fetch_futures_price(&self, symbols: &[&str]) -> Option<(String, f64)> {
        for symbol in symbols {
            match self.fetch_quote_price(symbol).await {
                Ok(Some(price)) => {
                    info!(symbol, price, "Futures price fetched");
                    return Some((symbol.to_string(), price));
                }
                Ok(None) => debug!(symbol, "No price in quote response"),
                Err(e) => warn!(symbol, error = %e, "Quote request failed"),
            }
        }

        warn!(?symbols, "Could not fetch a futures price from any symbol");
        None
    }

    // -----------------------------------------------
    // OPTION CHAIN
    // -----------------------------------------------
    pub async fn fetch_option_chain(
        &self,
        request: &ChainRequest,
    ) -> Result<OptionChain, GexError> {
        let query = request.query_params();
        let text = self.fetch_json(&self.endpoints.chains(), &query).await?;
        let chain: OptionChain = serde_json::from_str(&text)?;

        info!(
            symbol = %request.symbol,
            expiration = %request.expiration,
            calls = chain.call_strike_count(),
            puts = chain.put_strike_count(),
            "Option chain fetched"
        );
        Ok(chain)
    }
}

/// Map a response to its body or a typed error
fn check_response(status: StatusCode, text: String) -> Result<String, GexError> {
    let preview: String = text.chars().take(config::BODY_PREVIEW_CHARS).collect();

    if status.is_success() {
        let trimmed = text.trim_start();
        if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
            return Err(GexError::NonJsonResponse(preview));
        }
        Ok(text)
    } else if status == StatusCode::UNAUTHORIZED {
        Err(GexError::Unauthorized(preview))
    } else {
        Err(GexError::Api { status: status.as_u16(), body: preview })
    }
}

// -----------------------------------------------
// HTTP CLIENT BUILDER
// -----------------------------------------------
fn build_client(access_token: &str) -> Result<Client, GexError> {
    let mut headers = header::HeaderMap::new();

    let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", access_token))
        .map_err(|e| GexError::Request(format!("invalid access token: {}", e)))?;
    auth.set_sensitive(true);
    headers.insert(header::AUTHORIZATION, auth);
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

    Ok(Client::builder()
        .default_headers(headers)
        .gzip(true)
        .timeout(config::HTTP_TIMEOUT)
        .build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_chain_query_params() {
        let expiration = Expiration {
            date: NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            is_zero_dte: true,
        };
        let params = ChainRequest::new("QQQ", expiration).query_params();

        let get = |key: &str| params.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str());
        assert_eq!(get("symbol"), Some("QQQ"));
        assert_eq!(get("contractType"), Some("ALL"));
        assert_eq!(get("fromDate"), Some("2025-01-15"));
        assert_eq!(get("toDate"), Some("2025-01-15"));
    }

    #[test]
    fn test_check_response_classification() {
        assert!(check_response(StatusCode::OK, "{\"a\":1}".into()).is_ok());
        assert!(matches!(
            check_response(StatusCode::OK, "<html>".into()),
            Err(GexError::NonJsonResponse(_))
        ));
        assert!(matches!(
            check_response(StatusCode::UNAUTHORIZED, "expired".into()),
            Err(GexError::Unauthorized(_))
        ));
        let err = check_response(StatusCode::SERVICE_UNAVAILABLE, "busy".into()).unwrap_err();
        assert!(err.is_retryable());
        let err = check_response(StatusCode::BAD_REQUEST, "bad".into()).unwrap_err();
        assert!(!err.is_retryable());
    }
}
