use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageWatchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown site: {0}")]
    UnknownSite(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
