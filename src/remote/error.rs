use thiserror::Error;

/// Substrings that identify network-layer failures in error messages.
const NETWORK_MARKERS: &[&str] = &[
    "enotfound",
    "econnrefused",
    "econnreset",
    "etimedout",
    "ehostunreach",
    "enetunreach",
    "eai_again",
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "connection refused",
    "connection reset",
    "timed out",
    "network is unreachable",
    "host is unreachable",
    "no route to host",
];

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("remote store rejected request ({status} {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Whether the failure means "store unreachable" rather than a
    /// configuration or authorization problem.
    pub fn is_network(&self) -> bool {
        match self {
            RemoteError::Network(_) => true,
            RemoteError::Transport(msg) => looks_like_network_failure(msg),
            _ => false,
        }
    }
}

pub fn looks_like_network_failure(message: &str) -> bool {
    let lower = message.to_lowercase();
    NETWORK_MARKERS.iter().any(|m| lower.contains(m))
}

/// Joins an error and all of its sources into one message.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        let message = error_chain(&err);
        if err.is_connect() || err.is_timeout() {
            return RemoteError::Network(message);
        }
        if err.is_decode() {
            return RemoteError::Decode(message);
        }
        RemoteError::Transport(message)
    }
}
