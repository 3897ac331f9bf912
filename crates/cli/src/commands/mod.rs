pub mod serve;
pub mod user;

use powergate_config::AppConfig;
use std::path::PathBuf;

/// Load configuration from the given path, or the default location.
pub fn load_config(path: Option<PathBuf>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(&path)?,
        None => AppConfig::load()?,
    };
    Ok(config)
}
