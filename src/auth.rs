//! OAuth token handling for the brokerage API.
//!
//! Tokens live in a JSON file in the working directory. An access token is
//! used until shortly before it expires, then renewed with the refresh token;
//! when neither works the operator goes through the browser login (PKCE).

use crate::config::{self, SchwabEndpoints};
use crate::error::GexError;
use crate::models::{StoredTokens, TokenResponse};
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Local};
use reqwest::{header, Client, Url};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// -----------------------------------------------
// CREDENTIALS
// -----------------------------------------------

#[derive(Clone)]
pub struct Credentials {
    pub app_key: String,
    pub secret_key: String,
    pub redirect_uri: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Result<Self, GexError> {
        Ok(Self {
            app_key: config::get_app_key().ok_or(GexError::MissingCredentials("SCHWAB_APP_KEY"))?,
            secret_key: config::get_secret_key()
                .ok_or(GexError::MissingCredentials("SCHWAB_SECRET_KEY"))?,
            redirect_uri: config::get_redirect_uri(),
        })
    }

    /// Value of the Authorization header for token requests
    pub fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.app_key, self.secret_key);
        format!("Basic {}", STANDARD.encode(raw.as_bytes()))
    }
}

// -----------------------------------------------
// PKCE
// -----------------------------------------------

#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

/// 32 random bytes as URL-safe base64 (43 chars) and its S256 challenge
pub fn generate_pkce() -> PkcePair {
    let bytes: [u8; 32] = rand::random();
    let verifier = URL_SAFE_NO_PAD.encode(bytes);
    let challenge = pkce_challenge(&verifier);
    PkcePair { verifier, challenge }
}

pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Browser URL where the operator logs in and approves the app
pub fn authorization_url(
    authorize_endpoint: &str,
    creds: &Credentials,
    challenge: &str,
) -> Result<String, GexError> {
    let url = Url::parse_with_params(
        authorize_endpoint,
        &[
            ("client_id", creds.app_key.as_str()),
            ("redirect_uri", creds.redirect_uri.as_str()),
            ("response_type", "code"),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
        ],
    )
    .map_err(|e| GexError::InvalidUrl(format!("{}: {}", authorize_endpoint, e)))?;

    Ok(url.into())
}

/// Pull the authorization code out of the URL the browser was redirected to
pub fn extract_auth_code(redirect_url: &str) -> Result<String, GexError> {
    let url = Url::parse(redirect_url.trim())
        .map_err(|e| GexError::InvalidRedirect(format!("not a URL: {}", e)))?;

    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
        .ok_or_else(|| GexError::InvalidRedirect("no authorization code found".to_string()))
}

// -----------------------------------------------
// TOKEN STORE
// -----------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TokenStatus {
    Valid { expires_at: DateTime<Local> },
    Refreshable,
    Expired,
    Missing,
}

/// Token file plus the tokens currently loaded from it
#[derive(Debug)]
pub struct TokenStore {
    path: PathBuf,
    tokens: Option<StoredTokens>,
}

impl TokenStore {
    /// A missing file yields an empty store; an unreadable one is reported and ignored
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tokens = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<StoredTokens>(&text) {
                Ok(tokens) => {
                    debug!(path = %path.display(), "Loaded tokens");
                    Some(tokens)
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Token file is unreadable, ignoring it"
                    );
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read token file");
                None
            }
        };

        Self { path, tokens }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tokens(&self) -> Option<&StoredTokens> {
        self.tokens.as_ref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens.as_ref().and_then(|t| t.refresh_token.as_deref())
    }

    /// Valid until the buffer before expiry
    pub fn is_access_token_valid_at(&self, now: DateTime<Local>) -> bool {
        match &self.tokens {
            Some(tokens) if !tokens.access_token.is_empty() => {
                now < tokens.token_expiry - Duration::seconds(config::TOKEN_EXPIRY_BUFFER_SECS)
            }
            _ => false,
        }
    }

    pub fn status_at(&self, now: DateTime<Local>) -> TokenStatus {
        match &self.tokens {
            None => TokenStatus::Missing,
            Some(tokens) if self.is_access_token_valid_at(now) => TokenStatus::Valid {
                expires_at: tokens.token_expiry,
            },
            Some(_) if self.refresh_token().is_some() => TokenStatus::Refreshable,
            Some(_) => TokenStatus::Expired,
        }
    }

    /// Store a token response, keeping the previous refresh token when the
    /// response carries none
    pub fn save(&mut self, response: TokenResponse, now: DateTime<Local>) -> Result<(), GexError> {
        let expires_in = response
            .expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(config::DEFAULT_TOKEN_LIFETIME_SECS);

        let refresh_token = response
            .refresh_token
            .or_else(|| self.refresh_token().map(str::to_string));

        let tokens = StoredTokens {
            access_token: response.access_token,
            refresh_token,
            token_type: response.token_type,
            expires_in,
            token_expiry: now + Duration::seconds(expires_in),
            saved_at: now,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&tokens)?)?;

        info!(
            path = %self.path.display(),
            expires_at = %tokens.token_expiry.format("%I:%M:%S %p"),
            "Tokens saved"
        );
        self.tokens = Some(tokens);
        Ok(())
    }
}

// -----------------------------------------------
// AUTH CLIENT
// -----------------------------------------------

pub struct SchwabAuth {
    client: Client,
    store: TokenStore,
    credentials: Option<Credentials>,
    endpoints: SchwabEndpoints,
}

impl SchwabAuth {
    pub fn new(
        store: TokenStore,
        credentials: Option<Credentials>,
        endpoints: SchwabEndpoints,
    ) -> Result<Self, GexError> {
        let client = Client::builder()
            .timeout(config::HTTP_TIMEOUT)
            .build()?;
        Ok(Self { client, store, credentials, endpoints })
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Login URL for this app's credentials
    pub fn authorization_url(&self, challenge: &str) -> Result<String, GexError> {
        authorization_url(&self.endpoints.authorize(), self.credentials()?, challenge)
    }

    fn credentials(&self) -> Result<&Credentials, GexError> {
        self.credentials
            .as_ref()
            .ok_or(GexError::MissingCredentials("SCHWAB_APP_KEY"))
    }

    /// Current access token, refreshed first if it has expired
    pub async fn get_valid_access_token(&mut self) -> Result<String, GexError> {
        if self.store.is_access_token_valid_at(Local::now()) {
            if let Some(token) = self.store.access_token() {
                return Ok(token.to_string());
            }
        }

        if self.store.refresh_token().is_some() {
            info!("Access token expired, refreshing");
            self.refresh_access_token().await?;
            if let Some(token) = self.store.access_token() {
                return Ok(token.to_string());
            }
        }

        Err(GexError::NeedsAuthentication)
    }

    pub async fn refresh_access_token(&mut self) -> Result<(), GexError> {
        let refresh_token = self
            .store
            .refresh_token()
            .ok_or(GexError::NeedsAuthentication)?
            .to_string();
        let app_key = self.credentials()?.app_key.clone();

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", app_key.as_str()),
        ];

        let response = self.post_token_request(&form).await.map_err(|e| match e {
            // a rejected refresh token means a full login is needed
            GexError::Unauthorized(_) | GexError::Api { status: 400, .. } => {
                GexError::NeedsAuthentication
            }
            other => other,
        })?;

        self.store.save(response, Local::now())?;
        info!("Access token refreshed");
        Ok(())
    }

    /// Trade an authorization code for tokens
    pub async fn exchange_code(&mut self, code: &str, verifier: &str) -> Result<(), GexError> {
        let creds = self.credentials()?.clone();
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", creds.redirect_uri.as_str()),
            ("code_verifier", verifier),
            ("client_id", creds.app_key.as_str()),
        ];

        let response = self.post_token_request(&form).await?;
        self.store.save(response, Local::now())?;
        Ok(())
    }

    async fn post_token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, GexError> {
        let creds = self.credentials()?;

        let res = self
            .client
            .post(self.endpoints.token())
            .header(header::AUTHORIZATION, creds.basic_auth_header())
            .form(form)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        let preview: String = body.chars().take(config::BODY_PREVIEW_CHARS).collect();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            Err(GexError::Unauthorized(preview))
        } else {
            Err(GexError::Api { status: status.as_u16(), body: preview })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkce_shape() {
        let pair = generate_pkce();
        assert_eq!(pair.verifier.len(), 43);
        assert_eq!(pair.challenge.len(), 43);
        assert!(!pair.verifier.contains(['=', '+', '/']));
        assert_eq!(pair.challenge, pkce_challenge(&pair.verifier));
    }

    #[test]
    fn test_pkce_known_vector() {
        // RFC 7636 appendix B
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(pkce_challenge(verifier), "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_basic_auth_header() {
        let creds = Credentials {
            app_key: "key".into(),
            secret_key: "secret".into(),
            redirect_uri: config::DEFAULT_REDIRECT_URI.into(),
        };
        assert_eq!(creds.basic_auth_header(), "Basic a2V5OnNlY3JldA==");
        assert!(!format!("{:?}", creds).contains("\"secret\""));
    }

    #[test]
    fn test_authorization_url_encodes_params() {
        let creds = Credentials {
            app_key: "abc".into(),
            secret_key: "s".into(),
            redirect_uri: "https://127.0.0.1".into(),
        };
        let endpoint = SchwabEndpoints::default().authorize();
        let url = authorization_url(&endpoint, &creds, "xyz").unwrap();
        assert!(url.starts_with("https://api.schwabapi.com/v1/oauth/authorize?"));
        assert!(url.contains("client_id=abc"));
        assert!(url.contains("redirect_uri=https%3A%2F%2F127.0.0.1"));
        assert!(url.contains("code_challenge=xyz"));
        assert!(url.contains("code_challenge_method=S256"));
    }

    #[test]
    fn test_extract_auth_code() {
        let url = "https://127.0.0.1/?code=C0.b2F1dGgy%40&session=abc-123";
        assert_eq!(extract_auth_code(url).unwrap(), "C0.b2F1dGgy@");

        assert!(extract_auth_code("https://127.0.0.1/").is_err());
        assert!(extract_auth_code("https://127.0.0.1/?session=abc").is_err());
        assert!(extract_auth_code("https://127.0.0.1/?code=").is_err());
        assert!(extract_auth_code("code=abc").is_err());
    }

    #[test]
    fn test_extract_auth_code_form_decoding() {
        // '+' in a query value is a space, as browsers and form decoders treat it
        let url = "https://127.0.0.1/?code=a+b%40&session=x";
        assert_eq!(extract_auth_code(url).unwrap(), "a b@");

        let with_fragment = "https://127.0.0.1/?session=x&code=XYZ#done";
        assert_eq!(extract_auth_code(with_fragment).unwrap(), "XYZ");
    }
}
