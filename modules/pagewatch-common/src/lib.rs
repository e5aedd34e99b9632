pub mod config;
pub mod error;
pub mod file_config;
pub mod types;

pub use config::AppConfig;
pub use error::PageWatchError;
pub use file_config::{load_config, FileConfig, MonitorConfig, MAX_INTERVAL_MINUTES};
pub use types::*;
