//! Server configuration read from the environment

use anyhow::{Context, Result};
use docsign_core::config::DEFAULT_LINK_TTL_HOURS;
use docsign_core::PlacementPolicy;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:5173";
/// Request bodies carry base64 PDFs, so this bounds uploads at roughly 18 MB
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Origin of the web app that serves `/sign/public/:token`
    pub public_base_url: String,
    pub link_ttl_hours: i64,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Read configuration. Call `dotenvy::dotenv()` first to honour a `.env` file.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            port: parse_var("PORT")?.unwrap_or(DEFAULT_PORT),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .unwrap_or_else(default_database_url),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PUBLIC_BASE_URL.to_string()),
            link_ttl_hours: parse_var("LINK_TTL_HOURS")?.unwrap_or(DEFAULT_LINK_TTL_HOURS),
            max_upload_bytes: parse_var("MAX_UPLOAD_BYTES")?.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
        };
        config
            .policy()
            .validate()
            .map_err(anyhow::Error::msg)
            .context("invalid placement policy")?;
        Ok(config)
    }

    pub fn policy(&self) -> PlacementPolicy {
        PlacementPolicy::default().with_link_ttl_hours(self.link_ttl_hours)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: "sqlite::memory:".to_string(),
            public_base_url: DEFAULT_PUBLIC_BASE_URL.to_string(),
            link_ttl_hours: DEFAULT_LINK_TTL_HOURS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{} is not valid: {:?}", name, raw)),
        Err(_) => Ok(None),
    }
}

fn default_database_url() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("docsign-api");
    std::fs::create_dir_all(&data_dir).ok();
    format!("sqlite:{}/docsign.db?mode=rwc", data_dir.display())
}

/// Get platform-specific data directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            None
        }
    }
}
