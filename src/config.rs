// src/config.rs
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::{info, warn};

pub const DEFAULT_CACHE_DIR: &str = ".tvfamily_cache";
pub const DEFAULT_RETRY_SECS: u64 = crate::core::requests::TIMEOUT_REQUEST.as_secs();

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_address: Option<String>,
    pub cache_dir: PathBuf,
    pub retry_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_address: None,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            retry_secs: DEFAULT_RETRY_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    server_address: Option<String>,
    cache_dir: Option<String>,
    retry_secs: Option<u64>,
}

pub fn load_config() -> AppConfig {
    read_config(Path::new("config.json"))
}

fn read_config(cfg_path: &Path) -> AppConfig {
    let mut cfg = AppConfig::default();

    match fs::read_to_string(cfg_path) {
        Ok(raw) => match serde_json::from_str::<RawConfig>(&raw) {
            Ok(parsed) => {
                if parsed.server_address.is_some() {
                    cfg.server_address = parsed.server_address;
                }
                if let Some(dir) = parsed.cache_dir {
                    cfg.cache_dir = PathBuf::from(dir);
                }
                if let Some(secs) = parsed.retry_secs {
                    cfg.retry_secs = secs;
                }
                info!("Loaded config from {}", cfg_path.display());
            }
            Err(err) => {
                warn!(
                    "Failed to parse {} ({}). Using defaults.",
                    cfg_path.display(),
                    err
                );
            }
        },
        Err(_) => {
            info!("No config.json found; using defaults");
        }
    }

    cfg
}
