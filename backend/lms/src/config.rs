//! Application configuration loaded from environment variables.

use crate::errors::{AppError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Externally reachable base URL, used to build provider callback URLs
    pub public_url: String,
    /// How often (in seconds) the job loop checks for due jobs
    pub job_interval_secs: u64,
    /// Timeout for outbound provider requests
    pub http_timeout_secs: u64,
    pub mvola: ProviderConfig,
    pub orange_money: ProviderConfig,
    pub airtel_money: ProviderConfig,
    /// National admin account created at startup, with its API token
    pub bootstrap_admin: Option<(String, String)>,
}

/// Credentials and mode of one mobile-money provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub merchant_id: String,
    /// Simulate provider calls instead of reaching the live API.
    pub sandbox: bool,
}

impl ProviderConfig {
    pub fn sandbox(api_url: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            merchant_id: String::new(),
            sandbox: true,
        }
    }

    fn from_env(prefix: &str, default_url: &str) -> Result<Self> {
        Ok(Self {
            api_url: env_var(&format!("{prefix}_API_URL"))
                .unwrap_or_else(|_| default_url.to_string()),
            api_key: env_var(&format!("{prefix}_API_KEY")).unwrap_or_default(),
            api_secret: env_var(&format!("{prefix}_API_SECRET")).unwrap_or_default(),
            merchant_id: env_var(&format!("{prefix}_MERCHANT_ID")).unwrap_or_default(),
            sandbox: parse_bool(
                &format!("{prefix}_SANDBOX"),
                &env_var(&format!("{prefix}_SANDBOX")).unwrap_or_else(|_| "true".to_string()),
            )?,
        })
    }
}

const MVOLA_URL: &str = "https://devapi.mvola.mg";
const ORANGE_URL: &str = "https://api.orange.com";
const AIRTEL_URL: &str = "https://openapiuat.airtel.africa";

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./cntemad_lms.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid API_PORT".to_string()))?,
            public_url: env_var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            job_interval_secs: env_var("JOB_INTERVAL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid JOB_INTERVAL_SECS".to_string()))?,
            http_timeout_secs: env_var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| AppError::Config("Invalid HTTP_TIMEOUT_SECS".to_string()))?,
            mvola: ProviderConfig::from_env("MVOLA", MVOLA_URL)?,
            orange_money: ProviderConfig::from_env("ORANGE", ORANGE_URL)?,
            airtel_money: ProviderConfig::from_env("AIRTEL", AIRTEL_URL)?,
            bootstrap_admin: match (env_var("ADMIN_EMAIL"), env_var("ADMIN_TOKEN")) {
                (Ok(email), Ok(token)) if !email.is_empty() && !token.is_empty() => {
                    Some((email, token))
                }
                _ => None,
            },
        })
    }

    /// Sandbox configuration against the given database, with every provider simulated.
    pub fn local(database_url: &str) -> Self {
        Config {
            database_url: database_url.to_string(),
            api_port: 8000,
            public_url: "http://localhost:8000".to_string(),
            job_interval_secs: 3600,
            http_timeout_secs: 30,
            mvola: ProviderConfig::sandbox(MVOLA_URL),
            orange_money: ProviderConfig::sandbox(ORANGE_URL),
            airtel_money: ProviderConfig::sandbox(AIRTEL_URL),
            bootstrap_admin: None,
        }
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| AppError::Config(format!("Missing env var: {key}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::Config(format!("Invalid {key}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("X", "true").unwrap());
        assert!(parse_bool("X", " YES ").unwrap());
        assert!(parse_bool("X", "1").unwrap());
        assert!(!parse_bool("X", "off").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
    }

    #[test]
    fn parse_bool_rejects_garbage() {
        let err = parse_bool("MVOLA_SANDBOX", "maybe").unwrap_err();
        assert!(err.to_string().contains("MVOLA_SANDBOX"));
    }

    #[test]
    fn local_config_simulates_every_provider() {
        let config = Config::local("sqlite::memory:");
        assert!(config.mvola.sandbox);
        assert!(config.orange_money.sandbox);
        assert!(config.airtel_money.sandbox);
        assert_eq!(config.database_url, "sqlite::memory:");
    }
}
