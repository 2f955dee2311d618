//! Process configuration
//! Loaded once from the environment and passed into constructors; never mutated afterwards.

use std::env;
use std::time::Duration;

use crate::error::{LotteryError, LotteryResult};

pub const DEFAULT_API_VERSION: &str = "1.0";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_LOOKBACK_DAYS: i64 = 5;
pub const MAX_LOOKBACK_DAYS: i64 = 366;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Credentials and tuning for the retail settlement API.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub base_url: String,
    pub app_id: String,
    pub app_secret: String,
    pub brand_id: String,
    pub api_version: String,
    pub page_size: u32,
    pub lookback_days: i64,
    /// Shared deadline for the order + refund fan-out.
    pub timeout: Duration,
    /// Whether the inbound debug flag may expose signing traces.
    pub signing_debug: bool,
}

impl SettlementConfig {
    pub fn new(
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        brand_id: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            brand_id: brand_id.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            timeout: DEFAULT_TIMEOUT,
            signing_debug: true,
        }
    }

    pub fn from_env() -> LotteryResult<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::new(
            required_var("RETAIL_BASE_URL")?,
            required_var("RETAIL_APP_ID")?,
            required_var("RETAIL_APP_SECRET")?,
            required_var("RETAIL_BRAND_ID")?,
        );

        if let Ok(v) = env::var("RETAIL_API_VERSION") {
            if !v.trim().is_empty() {
                config.api_version = v.trim().to_string();
            }
        }
        config.page_size = env::var("RETAIL_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        config.lookback_days = env::var("RETAIL_LOOKBACK_DAYS")
            .ok()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(DEFAULT_LOOKBACK_DAYS);
        config.timeout = env::var("RETAIL_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&v| v > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT);
        config.signing_debug = env::var("RETAIL_SIGNING_DEBUG")
            .map(|v| !matches!(v.as_str(), "0" | "false" | "FALSE" | "off" | "OFF"))
            .unwrap_or(true);

        config.validate()?;
        Ok(config)
    }

    /// Blank credentials are as fatal as missing ones.
    pub fn validate(&self) -> LotteryResult<()> {
        let fields = [
            ("base_url", &self.base_url),
            ("app_id", &self.app_id),
            ("app_secret", &self.app_secret),
            ("brand_id", &self.brand_id),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(LotteryError::Configuration(format!("{name} is empty")));
            }
        }
        if !(0..=MAX_LOOKBACK_DAYS).contains(&self.lookback_days) {
            return Err(LotteryError::Configuration(format!(
                "lookback_days must be between 0 and {MAX_LOOKBACK_DAYS}, got {}",
                self.lookback_days
            )));
        }
        Ok(())
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

fn required_var(name: &str) -> LotteryResult<String> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(LotteryError::Configuration(format!(
            "missing required env var {name}"
        ))),
    }
}

/// HTTP listener and storage location.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database_path: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let database_path = env::var("LOTTERY_DB_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "prize_draw.db".to_string());

        Self {
            port,
            database_path,
        }
    }
}
