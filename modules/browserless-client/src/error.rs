use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserlessError>;

#[derive(Debug, Error)]
pub enum BrowserlessError {
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl BrowserlessError {
    /// Timeouts are the only failures worth retrying; everything else is a hard miss.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BrowserlessError::Timeout(_))
    }
}

impl From<reqwest::Error> for BrowserlessError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BrowserlessError::Timeout(err.to_string())
        } else if err.is_decode() {
            BrowserlessError::Decode(err.to_string())
        } else {
            BrowserlessError::Network(err.to_string())
        }
    }
}
