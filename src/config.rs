use anyhow::{Context, Result, bail};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::fetch::{ChromeRenderer, FetchClient, HttpTransport, RetryPolicy};
use crate::price_tracker::{BookkeepingPolicy, TrackerPolicy};
use crate::scrapers::{AdapterSettings, SeasonPacing};
use crate::traits::AdapterKind;

const PRODUCTION_CRON: &str = "0 0 * * * *";
const DEVELOPMENT_CRON: &str = "0 */5 * * * *";

/// How each adapter's fetch client is built
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub retries: u32,
    pub timeout: Duration,
    pub headless: bool,
    pub settle: Duration,
    pub headless_failure_limit: u32,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout: Duration::from_secs(15),
            headless: false,
            settle: Duration::from_millis(3000),
            headless_failure_limit: 2,
        }
    }
}

impl FetchSettings {
    /// A fresh client with its own transport and, when enabled, its own browser
    pub fn build_client(&self, kind: AdapterKind) -> Result<FetchClient> {
        let transport = HttpTransport::new(self.timeout)
            .with_context(|| format!("Failed to build transport for {kind:?} adapter"))?;
        let client = FetchClient::new(Arc::new(transport), RetryPolicy::new(self.retries));

        if self.headless {
            let renderer = ChromeRenderer::new(self.settle);
            Ok(client.with_renderer(Arc::new(renderer), self.headless_failure_limit))
        } else {
            Ok(client)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub schedule: String,
    pub run_on_start: bool,
    pub fetch: FetchSettings,
    pub adapters: AdapterSettings,
    pub tracker: TrackerPolicy,
    pub pacing: SeasonPacing,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let production = get("APP_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production"));
        let default_cron = if production { PRODUCTION_CRON } else { DEVELOPMENT_CRON };
        let schedule = get("SCRAPE_CRON").unwrap_or_else(|| default_cron.to_string());

        let fetch = FetchSettings {
            retries: parse_or(&get, "FETCH_RETRIES", 3)?,
            timeout: Duration::from_secs(parse_or(&get, "FETCH_TIMEOUT_SECS", 15)?),
            headless: flag_or(&get, "HEADLESS_ENABLED", false)?,
            settle: Duration::from_millis(parse_or(&get, "HEADLESS_SETTLE_MS", 3000)?),
            headless_failure_limit: parse_or(&get, "HEADLESS_FAILURE_LIMIT", 2)?,
        };

        let plausibility_floor: f64 = parse_or(&get, "PLAUSIBILITY_FLOOR", 100.0)?;
        if !plausibility_floor.is_finite() || plausibility_floor < 0.0 {
            bail!("PLAUSIBILITY_FLOOR must be a non-negative number");
        }

        let bookkeeping = match get("BOOKKEEPING_POLICY") {
            Some(value) => value.parse::<BookkeepingPolicy>()?,
            None => BookkeepingPolicy::default(),
        };

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite:data/prices.db".to_string()),
            schedule,
            run_on_start: flag_or(&get, "RUN_ON_START", true)?,
            fetch,
            adapters: AdapterSettings {
                plausibility_floor,
                reporting_currency: get("REPORTING_CURRENCY").unwrap_or_else(|| "USD".to_string()),
            },
            tracker: TrackerPolicy {
                bookkeeping,
                retain_misses: flag_or(&get, "RETAIN_MISSES", false)?,
            },
            pacing: SeasonPacing {
                pause: Duration::from_secs(parse_or(&get, "SEASON_PAUSE_SECS", 3)?),
                long_pause: Duration::from_secs(parse_or(&get, "SEASON_LONG_PAUSE_SECS", 10)?),
                long_every: parse_or(&get, "SEASON_LONG_PAUSE_EVERY", 10)?,
            },
        })
    }

    pub fn log_summary(&self) {
        info!(
            schedule = %self.schedule,
            headless = self.fetch.headless,
            retries = self.fetch.retries,
            floor = self.adapters.plausibility_floor,
            currency = %self.adapters.reporting_currency,
            bookkeeping = ?self.tracker.bookkeeping,
            retain_misses = self.tracker.retain_misses,
            "Configuration loaded"
        );
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .parse()
            .with_context(|| format!("Invalid value for {key}: {value:?}")),
        None => Ok(default),
    }
}

fn flag_or<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => bail!("Invalid value for {key}: {v:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config(&[]).unwrap();

        assert_eq!(config.database_url, "sqlite:data/prices.db");
        assert_eq!(config.schedule, DEVELOPMENT_CRON);
        assert!(config.run_on_start);
        assert_eq!(config.fetch.retries, 3);
        assert!(!config.fetch.headless);
        assert_eq!(config.adapters.plausibility_floor, 100.0);
        assert_eq!(config.adapters.reporting_currency, "USD");
        assert_eq!(config.tracker.bookkeeping, BookkeepingPolicy::OnSuccess);
        assert!(!config.tracker.retain_misses);
        assert_eq!(config.pacing, SeasonPacing::default());
    }

    #[test]
    fn production_runs_hourly_unless_overridden() {
        assert_eq!(config(&[("APP_ENV", "production")]).unwrap().schedule, PRODUCTION_CRON);
        assert_eq!(
            config(&[("APP_ENV", "production"), ("SCRAPE_CRON", "0 30 * * * *")])
                .unwrap()
                .schedule,
            "0 30 * * * *"
        );
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            ("HEADLESS_ENABLED", "true"),
            ("FETCH_RETRIES", "5"),
            ("BOOKKEEPING_POLICY", "on-attempt"),
            ("RETAIN_MISSES", "1"),
            ("SEASON_PAUSE_SECS", "1"),
        ])
        .unwrap();

        assert!(config.fetch.headless);
        assert_eq!(config.fetch.retries, 5);
        assert_eq!(config.tracker.bookkeeping, BookkeepingPolicy::OnAttempt);
        assert!(config.tracker.retain_misses);
        assert_eq!(config.pacing.pause, Duration::from_secs(1));
    }

    #[test]
    fn rejects_garbage() {
        assert!(config(&[("FETCH_RETRIES", "many")]).is_err());
        assert!(config(&[("HEADLESS_ENABLED", "maybe")]).is_err());
        assert!(config(&[("BOOKKEEPING_POLICY", "sometimes")]).is_err());
        assert!(config(&[("PLAUSIBILITY_FLOOR", "-5")]).is_err());
    }

    #[test]
    fn builds_static_only_clients_by_default() {
        let client = FetchSettings::default().build_client(AdapterKind::Generic).unwrap();
        assert!(!client.headless_available());
        assert_eq!(client.policy().max_attempts, 3);
    }
}
