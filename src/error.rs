use std::fmt;

#[derive(Debug)]
pub enum GexError {
    Request(String),
    /// HTTP 401 from the brokerage; the access token was rejected
    Unauthorized(String),
    Api { status: u16, body: String },
    NonJsonResponse(String),
    Parse(String),
    Io(String),
    MissingCredentials(&'static str),
    NeedsAuthentication,
    InvalidRedirect(String),
    InvalidUrl(String),
}

impl GexError {
    /// Failures that a fresh login is likely to fix
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            GexError::Unauthorized(_)
                | GexError::NeedsAuthentication
                | GexError::MissingCredentials(_)
        )
    }

    /// Transport errors, throttling and server errors are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            GexError::Request(_) => true,
            GexError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl fmt::Display for GexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GexError::Request(msg) => write!(f, "Request error: {}", msg),
            GexError::Unauthorized(msg) => write!(f, "Authentication failed (401): {}", msg),
            GexError::Api { status, body } => write!(f, "API error {}: {}", status, body),
            GexError::NonJsonResponse(preview) => write!(f, "Non-JSON response: {}", preview),
            GexError::Parse(msg) => write!(f, "Parse error: {}", msg),
            GexError::Io(msg) => write!(f, "IO error: {}", msg),
            GexError::MissingCredentials(var) => {
                write!(f, "Missing credentials: set the {} environment variable", var)
            }
            GexError::NeedsAuthentication => {
                write!(f, "No valid or refreshable token - authentication required")
            }
            GexError::InvalidRedirect(msg) => write!(f, "Invalid redirect URL: {}", msg),
            GexError::InvalidUrl(msg) => write!(f, "Invalid API URL: {}", msg),
        }
    }
}

impl std::error::Error for GexError {}

impl From<reqwest::Error> for GexError {
    fn from(err: reqwest::Error) -> Self {
        GexError::Request(err.to_string())
    }
}

impl From<serde_json::Error> for GexError {
    fn from(err: serde_json::Error) -> Self {
        GexError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for GexError {
    fn from(err: std::io::Error) -> Self {
        GexError::Io(err.to_string())
    }
}

/// True when any error in the chain is an authentication failure
pub fn needs_reauthentication(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<GexError>())
        .any(GexError::is_auth_failure)
}
