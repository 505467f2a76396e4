use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::Router;
use chrono::{Duration, Local};
use gex_levels::auth::{Credentials, SchwabAuth, TokenStore};
use gex_levels::config::SchwabEndpoints;
use gex_levels::expiration::Expiration;
use gex_levels::models::TokenResponse;
use gex_levels::schwab_client::ChainRequest;
use gex_levels::{GexError, SchwabClient};
use reqwest::Url;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// One request as the local brokerage stand-in saw it
#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    query: HashMap<String, String>,
    authorization: Option<String>,
    body: String,
}

/// Canned responses per path, served in order; the last one repeats
#[derive(Default)]
struct MockState {
    routes: HashMap<String, VecDeque<(u16, String)>>,
    requests: Vec<Recorded>,
}

type Shared = Arc<Mutex<MockState>>;

async fn handle(
    State(state): State<Shared>,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let query: HashMap<String, String> = Url::parse(&format!("http://localhost{}", uri))
        .map(|url| url.query_pairs().into_owned().collect())
        .unwrap_or_default();

    let mut state = state.lock().unwrap();
    state.requests.push(Recorded {
        path: uri.path().to_string(),
        query,
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    let Some(queue) = state.routes.get_mut(uri.path()) else {
        return (StatusCode::NOT_FOUND, "no route".to_string());
    };
    let (status, body) = if queue.len() > 1 {
        queue.pop_front().unwrap()
    } else {
        queue.front().cloned().unwrap()
    };
    (StatusCode::from_u16(status).unwrap(), body)
}

/// Serve the canned routes on an ephemeral port and return the base URL
async fn start_mock(routes: Vec<(&str, Vec<(u16, &str)>)>) -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(MockState::default()));
    {
        let mut guard = state.lock().unwrap();
        for (path, responses) in routes {
            let queue = responses.into_iter().map(|(s, b)| (s, b.to_string())).collect();
            guard.routes.insert(path.to_string(), queue);
        }
    }

    let app = Router::new().fallback(handle).with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

fn requests_to(state: &Shared, path: &str) -> Vec<Recorded> {
    state
        .lock()
        .unwrap()
        .requests
        .iter()
        .filter(|r| r.path == path)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUOTES: &str = "/marketdata/v1/quotes";
    const CHAINS: &str = "/marketdata/v1/chains";
    const TOKEN: &str = "/v1/oauth/token";

    fn credentials() -> Credentials {
        Credentials {
            app_key: "key".into(),
            secret_key: "secret".into(),
            redirect_uri: "https://127.0.0.1".into(),
        }
    }

    fn chain_request() -> ChainRequest {
        let expiration = Expiration {
            date: chrono::NaiveDate::from_ymd_opt(2025, 1, 15).unwrap(),
            is_zero_dte: false,
        };
        ChainRequest::new("QQQ", expiration)
    }

    /// Store whose access token expired an hour ago but still holds a refresh token
    fn expired_store(dir: &tempfile::TempDir) -> TokenStore {
        let mut store = TokenStore::load(dir.path().join("tokens.json"));
        let response = TokenResponse {
            access_token: "old-access".into(),
            refresh_token: Some("old-refresh".into()),
            token_type: "Bearer".into(),
            expires_in: Some(1800),
        };
        store.save(response, Local::now() - Duration::hours(1)).unwrap();
        store
    }

    // -----------------------------------------------
    // MARKET DATA
    // -----------------------------------------------

    #[tokio::test]
    async fn test_futures_price_falls_through_symbols() {
        let (base, state) = start_mock(vec![(
            QUOTES,
            vec![
                (400, r#"{"errors":["unknown symbol"]}"#),
                (200, r#"{"NQ":{"quote":{"lastPrice":0}}}"#),
                (200, r#"{"/NQH25":{"quote":{"lastPrice":0,"mark":21500.25}}}"#),
            ],
        )])
        .await;

        let client = SchwabClient::new("token", SchwabEndpoints::new(base)).unwrap();
        let result = client.fetch_futures_price(&["/NQ", "NQ", "/NQH25", "/NQZ24"]).await;

        assert_eq!(result, Some(("/NQH25".to_string(), 21500.25)));

        let symbols: Vec<String> = requests_to(&state, QUOTES)
            .iter()
            .map(|r| r.query["symbols"].clone())
            .collect();
        assert_eq!(symbols, vec!["/NQ", "NQ", "/NQH25"]);
    }

    #[tokio::test]
    async fn test_futures_price_none_when_every_symbol_fails() {
        let (base, state) = start_mock(vec![(QUOTES, vec![(404, "not found")])]).await;

        let client = SchwabClient::new("token", SchwabEndpoints::new(base)).unwrap();
        assert_eq!(client.fetch_futures_price(&["/NQ", "NQ"]).await, None);
        assert_eq!(requests_to(&state, QUOTES).len(), 2);
    }

    #[tokio::test]
    async fn test_chain_request_retried_after_throttling() {
        let chain = include_str!("fixtures/options_chain_sample.json");
        let (base, state) =
            start_mock(vec![(CHAINS, vec![(429, "slow down"), (200, chain)])]).await;

        let client = SchwabClient::new("token-123", SchwabEndpoints::new(base)).unwrap();
        let fetched = client.fetch_option_chain(&chain_request()).await.unwrap();

        assert_eq!(fetched.underlying_price, Some(600.0));

        let hits = requests_to(&state, CHAINS);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].authorization.as_deref(), Some("Bearer token-123"));
        assert_eq!(hits[1].query["symbol"], "QQQ");
        assert_eq!(hits[1].query["fromDate"], "2025-01-15");
    }

    #[tokio::test]
    async fn test_unauthorized_chain_request_not_retried() {
        let (base, state) = start_mock(vec![(CHAINS, vec![(401, "token expired")])]).await;

        let client = SchwabClient::new("stale", SchwabEndpoints::new(base)).unwrap();
        let err = client.fetch_option_chain(&chain_request()).await.unwrap_err();

        assert!(matches!(err, GexError::Unauthorized(_)));
        assert_eq!(requests_to(&state, CHAINS).len(), 1);
    }

    // -----------------------------------------------
    // TOKENS
    // -----------------------------------------------

    #[tokio::test]
    async fn test_expired_access_token_is_refreshed() {
        let (base, state) = start_mock(vec![(
            TOKEN,
            vec![(200, r#"{"access_token":"new-access","token_type":"Bearer","expires_in":1800}"#)],
        )])
        .await;
        let dir = tempfile::tempdir().unwrap();

        let endpoints = SchwabEndpoints::new(base);
        let mut auth =
            SchwabAuth::new(expired_store(&dir), Some(credentials()), endpoints).unwrap();
        let token = auth.get_valid_access_token().await.unwrap();

        assert_eq!(token, "new-access");
        assert_eq!(auth.store().refresh_token(), Some("old-refresh"));
        assert!(auth.store().is_access_token_valid_at(Local::now()));

        let hits = requests_to(&state, TOKEN);
        assert_eq!(hits.len(), 1);
        let basic = credentials().basic_auth_header();
        assert_eq!(hits[0].authorization.as_deref(), Some(basic.as_str()));
        assert!(hits[0].body.contains("grant_type=refresh_token"));
        assert!(hits[0].body.contains("refresh_token=old-refresh"));

        // the refreshed token is on disk for the next run
        let reloaded = TokenStore::load(dir.path().join("tokens.json"));
        assert_eq!(reloaded.access_token(), Some("new-access"));
    }

    #[tokio::test]
    async fn test_rejected_refresh_needs_login() {
        for status in [400, 401] {
            let rejection = vec![(status, r#"{"error":"invalid_grant"}"#)];
            let (base, _state) = start_mock(vec![(TOKEN, rejection)]).await;
            let dir = tempfile::tempdir().unwrap();

            let endpoints = SchwabEndpoints::new(base);
            let mut auth =
                SchwabAuth::new(expired_store(&dir), Some(credentials()), endpoints).unwrap();
            let err = auth.get_valid_access_token().await.unwrap_err();

            assert!(matches!(err, GexError::NeedsAuthentication), "status {}: {:?}", status, err);
        }
    }

    #[tokio::test]
    async fn test_valid_access_token_skips_token_endpoint() {
        let (base, state) = start_mock(vec![(TOKEN, vec![(500, "should not be called")])]).await;
        let dir = tempfile::tempdir().unwrap();

        let mut store = TokenStore::load(dir.path().join("tokens.json"));
        let response = TokenResponse {
            access_token: "fresh".into(),
            refresh_token: Some("refresh".into()),
            token_type: "Bearer".into(),
            expires_in: Some(1800),
        };
        store.save(response, Local::now()).unwrap();

        let mut auth = SchwabAuth::new(store, None, SchwabEndpoints::new(base)).unwrap();
        assert_eq!(auth.get_valid_access_token().await.unwrap(), "fresh");
        assert!(requests_to(&state, TOKEN).is_empty());
    }
}
