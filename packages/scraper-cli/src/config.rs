//! Process configuration loaded from the environment.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use post_scraper::{chain_budget, EngineConfig, UrlValidator};

/// Settings shared by every job this binary runs
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// `-1` derives the budget from `max_execution_seconds`
    pub chain_seconds: i64,
    pub max_execution_seconds: Option<u64>,
    pub user_agent: String,
    pub request_timeout_seconds: u64,
    pub executable: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            data_dir: var("SCRAPER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./scraper-data")),
            chain_seconds: var("SCRAPER_CHAIN_SECONDS")
                .unwrap_or_else(|| "-1".to_string())
                .parse()
                .context("SCRAPER_CHAIN_SECONDS must be a whole number of seconds")?,
            max_execution_seconds: var("SCRAPER_MAX_EXECUTION_SECONDS")
                .map(|v| v.parse())
                .transpose()
                .context("SCRAPER_MAX_EXECUTION_SECONDS must be a whole number of seconds")?,
            user_agent: var("SCRAPER_USER_AGENT")
                .unwrap_or_else(|| format!("post-scraper/{}", env!("CARGO_PKG_VERSION"))),
            request_timeout_seconds: var("SCRAPER_REQUEST_TIMEOUT_SECONDS")
                .unwrap_or_else(|| "20".to_string())
                .parse()
                .context("SCRAPER_REQUEST_TIMEOUT_SECONDS must be a whole number of seconds")?,
            executable: var("SCRAPER_EXECUTABLE").map(PathBuf::from),
        })
    }

    /// Engine settings for this process.
    pub fn engine(&self) -> Result<EngineConfig> {
        let executable = match &self.executable {
            Some(path) => path.clone(),
            None => env::current_exe().context("cannot locate the running executable")?,
        };
        Ok(EngineConfig {
            data_dir: self.data_dir.clone(),
            chain_budget_seconds: chain_budget(self.chain_seconds, self.max_execution_seconds),
            user_agent: self.user_agent.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            executable,
            validator: UrlValidator::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./scraper-data"));
        assert_eq!(config.chain_seconds, -1);
        assert_eq!(config.request_timeout_seconds, 20);
        assert!(config.user_agent.starts_with("post-scraper/"));
        assert_eq!(config.engine().unwrap().chain_budget_seconds, 240);
    }

    #[test]
    fn test_budget_from_max_execution_time() {
        let config = config(&[("SCRAPER_MAX_EXECUTION_SECONDS", "300")]).unwrap();
        assert_eq!(config.engine().unwrap().chain_budget_seconds, 225);

        let config = config_with_explicit_budget();
        assert_eq!(config.engine().unwrap().chain_budget_seconds, 60);
    }

    fn config_with_explicit_budget() -> Config {
        config(&[
            ("SCRAPER_CHAIN_SECONDS", "60"),
            ("SCRAPER_MAX_EXECUTION_SECONDS", "300"),
            ("SCRAPER_EXECUTABLE", "/opt/post-scraper"),
        ])
        .unwrap()
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        assert!(config(&[("SCRAPER_REQUEST_TIMEOUT_SECONDS", "soon")]).is_err());
    }
}
