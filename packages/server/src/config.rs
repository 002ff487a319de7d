use anyhow::{Context, Result};
use dotenvy::dotenv;
use site_analysis::{AnalysisConfig, RatePolicy, WorkKind};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub analysis: AnalysisConfig,
    /// ipinfo-compatible service for server geolocation
    pub ipinfo_base_url: Option<String>,
    /// Host patterns dropped from harvested contacts
    pub social_blacklist: Vec<String>,
    /// CORS origins; empty allows any origin
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_wait = parse_var::<u64, _>(&lookup, "RATE_MAX_WAIT_MS")?.map(Duration::from_millis);

        let mut analysis = AnalysisConfig::default();
        for kind in WorkKind::ALL {
            let prefix = format!("RATE_{}", kind.as_str().to_ascii_uppercase());
            let default = analysis.rate_policy(kind);

            let per_second = parse_var(&lookup, &format!("{}_PER_SECOND", prefix))?
                .unwrap_or(default.per_second);
            let burst = parse_var(&lookup, &format!("{}_BURST", prefix))?.unwrap_or(per_second);

            let mut policy = RatePolicy::per_second(per_second).with_burst(burst);
            if let Some(max_wait) = max_wait {
                policy = policy.with_max_wait(max_wait);
            }
            analysis = analysis.with_rate_policy(kind, policy);
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "EXECUTOR_TIMEOUT_SECS")? {
            analysis = analysis.with_executor_timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://site-analysis.db?mode=rwc".to_string()),
            port: parse_var(&lookup, "PORT")?.unwrap_or(5000),
            analysis,
            ipinfo_base_url: lookup("IPINFO_BASE_URL").filter(|url| !url.is_empty()),
            social_blacklist: split_list(lookup("SOCIAL_BLACKLIST")),
            allowed_origins: split_list(lookup("ALLOWED_ORIGINS")),
        })
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .with_context(|| format!("{} must be a valid number", name))
        })
        .transpose()
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
