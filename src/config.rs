use std::env;
use std::time::Duration;

use reqwest::Url;

use crate::error::AppError;

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://taskso.db?mode=rwc";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base of the remote service; `auth/*` and `tasks*` hang off it.
    pub api_base_url: Url,
    /// Where the bearer credential is persisted between runs.
    pub database_url: String,
    pub request_timeout: Duration,
    /// Transport retries for idempotent requests. Creates are never retried.
    pub max_retries: u32,
    pub auth_check_interval: Duration,
}

impl ClientConfig {
    /// Configuration with default settings against the given service.
    pub fn new(api_base_url: &str) -> Result<Self, AppError> {
        Ok(Self {
            api_base_url: parse_base_url(api_base_url)?,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            auth_check_interval: Duration::from_secs(300),
        })
    }

    pub fn new_from_env() -> Result<Self, AppError> {
        let api_base = env::var("TASKSO_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let defaults = Self::new(&api_base)?;

        let database_url =
            env::var("TASKSO_DATABASE_URL").unwrap_or(defaults.database_url);
        let request_timeout = read_secs("TASKSO_REQUEST_TIMEOUT_SECS")?
            .unwrap_or(defaults.request_timeout);
        let max_retries = match env::var("TASKSO_MAX_RETRIES") {
            Ok(raw) => raw
                .parse::<u32>()
                .map_err(|_| AppError::Config(format!("TASKSO_MAX_RETRIES is not a number: {}", raw)))?,
            Err(_) => defaults.max_retries,
        };
        let auth_check_interval =
            read_secs("TASKSO_AUTH_CHECK_SECS")?.unwrap_or(defaults.auth_check_interval);

        let config = Self {
            api_base_url: defaults.api_base_url,
            database_url,
            request_timeout,
            max_retries,
            auth_check_interval,
        };
        config.validate()?;
        Ok(config)
    }

    /// Both the request timeout and the credential check interval must be
    /// non-zero.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.request_timeout.is_zero() {
            return Err(AppError::Config(
                "TASKSO_REQUEST_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        if self.auth_check_interval.is_zero() {
            return Err(AppError::Config(
                "TASKSO_AUTH_CHECK_SECS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Upper bound for one fetch through the gateway, every retry included.
    pub fn fetch_timeout(&self) -> Duration {
        self.request_timeout.saturating_mul(self.max_retries.saturating_add(1))
    }

    /// Resolves `path` (no leading slash) beneath the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        self.api_base_url
            .join(path)
            .map_err(|e| AppError::Config(format!("invalid endpoint {}: {}", path, e)))
    }
}

fn parse_base_url(raw: &str) -> Result<Url, AppError> {
    // A trailing slash makes `Url::join` append instead of replacing the
    // last path segment.
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    let url = Url::parse(&normalized)
        .map_err(|e| AppError::Config(format!("TASKSO_API_URL is not a valid URL: {}", e)))?;
    if url.cannot_be_a_base() {
        return Err(AppError::Config(format!("TASKSO_API_URL cannot be a base: {}", raw)));
    }
    Ok(url)
}

fn read_secs(key: &str) -> Result<Option<Duration>, AppError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| AppError::Config(format!("{} is not a number of seconds: {}", key, raw))),
        Err(_) => Ok(None),
    }
}
