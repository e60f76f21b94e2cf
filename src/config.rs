//! Process configuration read from the environment

use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_SETTINGS_FILE: &str = "tickets-settings.json";
const DEFAULT_PAGE_SIZE: usize = 100;

/// IMAP connection configuration
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Messages fetched per page when scanning a folder.
    pub page_size: usize,
}

impl ImapConfig {
    /// Load IMAP configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `IMAP_USERNAME`
    /// - `IMAP_PASSWORD`
    ///
    /// Optional (with defaults):
    /// - `IMAP_HOST` (default: `127.0.0.1`)
    /// - `IMAP_PORT` (default: `1143`)
    /// - `IMAP_PAGE_SIZE` (default: `100`)
    ///
    /// # Errors
    ///
    /// Returns an error if `IMAP_USERNAME` or `IMAP_PASSWORD` is unset,
    /// or if `IMAP_PORT` or `IMAP_PAGE_SIZE` is invalid.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let page_size = env::var("IMAP_PAGE_SIZE")
            .unwrap_or_else(|_| DEFAULT_PAGE_SIZE.to_string())
            .parse::<usize>()
            .map_err(|e| Error::Config(format!("Invalid IMAP_PAGE_SIZE: {e}")))?;
        if page_size == 0 {
            return Err(Error::Config("IMAP_PAGE_SIZE must be positive".into()));
        }

        Ok(Self {
            host: env::var("IMAP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("IMAP_PORT")
                .unwrap_or_else(|_| "1143".to_string())
                .parse()
                .map_err(|e| Error::Config(format!("Invalid IMAP_PORT: {e}")))?,
            username: env::var("IMAP_USERNAME")
                .map_err(|_| Error::Config("IMAP_USERNAME not set".into()))?,
            password: env::var("IMAP_PASSWORD")
                .map_err(|_| Error::Config("IMAP_PASSWORD not set".into()))?,
            page_size,
        })
    }
}

/// Location of the ticket settings file: `TICKETS_SETTINGS`, else
/// `tickets-settings.json` in the working directory.
#[must_use]
pub fn settings_path_from_env() -> PathBuf {
    dotenvy::dotenv().ok();
    env::var_os("TICKETS_SETTINGS").map_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE), PathBuf::from)
}

/// Limit applied to each provider call (one page, one batch move).
/// `TICKETS_CALL_TIMEOUT_SECS`, default 30.
///
/// # Errors
///
/// Returns an error if `TICKETS_CALL_TIMEOUT_SECS` is not a number.
pub fn call_timeout_from_env() -> Result<Duration> {
    dotenvy::dotenv().ok();
    let secs = env::var("TICKETS_CALL_TIMEOUT_SECS")
        .unwrap_or_else(|_| "30".to_string())
        .parse::<u64>()
        .map_err(|e| Error::Config(format!("Invalid TICKETS_CALL_TIMEOUT_SECS: {e}")))?;
    Ok(Duration::from_secs(secs.max(1)))
}
