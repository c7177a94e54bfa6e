use std::time::Duration;

use anyhow::{bail, Context};

use crate::loader::Source;

pub const DEFAULT_SOURCE: &str =
    "https://raw.githubusercontent.com/Saimohan2-4/sample-for-satsure-data/main/sample_dataset_large.csv";
pub const DEFAULT_REFRESH_SECS: u64 = 60;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

const SOURCE_ENV: &str = "DASHBOARD_SOURCE";
const REFRESH_ENV: &str = "DASHBOARD_REFRESH_SECS";
const FETCH_TIMEOUT_ENV: &str = "DASHBOARD_FETCH_TIMEOUT_SECS";

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub source: Source,
    pub refresh_interval: Duration,
    pub fetch_timeout: Duration,
}

/// Values given on the command line; anything left `None` falls back to the
/// environment, then to the defaults.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub source: Option<String>,
    pub refresh_secs: Option<u64>,
    pub fetch_timeout_secs: Option<u64>,
}

impl DashboardConfig {
    pub fn resolve(overrides: Overrides) -> anyhow::Result<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    fn resolve_with(
        overrides: Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let source = overrides
            .source
            .or_else(|| env(SOURCE_ENV))
            .unwrap_or_else(|| DEFAULT_SOURCE.to_string());

        let refresh_secs = match overrides.refresh_secs {
            Some(value) => value,
            None => seconds_from_env(&env, REFRESH_ENV)?.unwrap_or(DEFAULT_REFRESH_SECS),
        };
        let fetch_timeout_secs = match overrides.fetch_timeout_secs {
            Some(value) => value,
            None => {
                seconds_from_env(&env, FETCH_TIMEOUT_ENV)?.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS)
            }
        };

        if refresh_secs == 0 {
            bail!("refresh interval must be at least one second");
        }
        if fetch_timeout_secs == 0 {
            bail!("fetch timeout must be at least one second");
        }

        Ok(Self {
            source: Source::parse(&source),
            refresh_interval: Duration::from_secs(refresh_secs),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
        })
    }
}

fn seconds_from_env(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> anyhow::Result<Option<u64>> {
    env(key)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{key} must be a whole number of seconds, got {value:?}"))
        })
        .transpose()
}
