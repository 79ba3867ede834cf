//! Data fetcher trait and the public-data implementation
//!
//! A fetch never fails outward: each source gets a bounded number of
//! attempts, each under its own timeout, and reports `None` once they are
//! used up. The refresh goes on with whatever arrived.

use crate::airkorea::{self, DustSnapshot, AIRKOREA_URL};
use crate::config::Config;
use crate::error::FetchError;
use crate::kma::{self, GridPoint, WeatherSnapshot, KMA_BASE_URL};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Attempt budget for a single source
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Bound on one attempt
    pub timeout: Duration,
    /// Pause between failed attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout: Duration::from_secs(10),
            delay: Duration::from_secs(2),
        }
    }
}

/// Run `attempt` until it succeeds or the policy is exhausted
pub async fn fetch_with_retry<T, F, Fut>(source: &str, policy: &RetryPolicy, mut attempt: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    for n in 1..=policy.attempts {
        match tokio::time::timeout(policy.timeout, attempt()).await {
            Ok(Ok(value)) => {
                tracing::debug!("{} fetched on attempt {}", source, n);
                return Some(value);
            }
            Ok(Err(e)) => tracing::warn!("{} attempt {}/{} failed: {}", source, n, policy.attempts, e),
            Err(_) => tracing::warn!(
                "{} attempt {}/{} timed out after {:?}",
                source,
                n,
                policy.attempts,
                policy.timeout
            ),
        }

        if n < policy.attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    tracing::warn!("{} unavailable after {} attempts", source, policy.attempts);
    None
}

/// Source of weather and air quality readings
#[async_trait]
pub trait DataFetcher: Send + Sync {
    /// Current weather for a forecast grid cell
    async fn fetch_weather(&self, service_key: &str, grid: GridPoint) -> Option<WeatherSnapshot>;

    /// Latest dust readings for a measuring station
    async fn fetch_dust(&self, service_key: &str, station: &str) -> Option<DustSnapshot>;
}

/// KMA + AirKorea over the public data portal
pub struct PublicDataSource {
    client: Client,
    policy: RetryPolicy,
    kma_base_url: String,
    airkorea_url: String,
    clock: fn() -> NaiveDateTime,
}

impl PublicDataSource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            kma_base_url: KMA_BASE_URL.to_string(),
            airkorea_url: AIRKOREA_URL.to_string(),
            clock: local_now,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Point both services at other endpoints (mirrors, test servers)
    pub fn with_endpoints(mut self, kma_base_url: impl Into<String>, airkorea_url: impl Into<String>) -> Self {
        self.kma_base_url = kma_base_url.into();
        self.airkorea_url = airkorea_url.into();
        self
    }
}

#[async_trait]
impl DataFetcher for PublicDataSource {
    async fn fetch_weather(&self, service_key: &str, grid: GridPoint) -> Option<WeatherSnapshot> {
        if service_key.is_empty() {
            tracing::debug!("No KMA key configured, skipping weather");
            return None;
        }
        let key = decode_service_key(service_key);
        let (client, url, key, clock) = (&self.client, self.kma_base_url.as_str(), key.as_str(), self.clock);

        fetch_with_retry("KMA weather", &self.policy, move || {
            kma::fetch_weather(client, url, key, grid, clock())
        })
        .await
    }

    async fn fetch_dust(&self, service_key: &str, station: &str) -> Option<DustSnapshot> {
        if service_key.is_empty() {
            tracing::debug!("No AirKorea key configured, skipping dust");
            return None;
        }
        let key = decode_service_key(service_key);
        let (client, url, key) = (&self.client, self.airkorea_url.as_str(), key.as_str());

        fetch_with_retry("AirKorea dust", &self.policy, move || {
            airkorea::fetch_dust(client, url, key, station)
        })
        .await
    }
}

/// Portal keys are often pasted already percent-encoded; the query builder
/// encodes again, so decode those first.
pub fn decode_service_key(key: &str) -> String {
    if key.contains('%') {
        urlencoding::decode(key)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| key.to_string())
    } else {
        key.to_string()
    }
}

pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Outer polling around the fetcher: keep asking for whatever is still
/// missing until everything arrived or the budget is spent.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub iterations: u32,
    pub interval: Duration,
    pub budget: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            iterations: 10,
            interval: Duration::from_secs(2),
            budget: Duration::from_secs(20),
        }
    }
}

/// What one refresh managed to gather
#[derive(Debug, Clone, Default)]
pub struct Observations {
    pub weather: Option<WeatherSnapshot>,
    pub dust: Option<DustSnapshot>,
}

/// Poll `fetcher` for the sources `config` has keys for. Sources are asked
/// concurrently so a hung one cannot starve the other. Partial results are
/// kept; a source without a key is never polled.
pub async fn poll_observations(fetcher: &dyn DataFetcher, config: &Config, poll: &PollPolicy) -> Observations {
    let wants_weather = !config.kma_key().is_empty();
    let wants_dust = !config.air_key().is_empty();
    let grid = config.location.grid();

    let mut observations = Observations::default();
    let deadline = Instant::now() + poll.budget;

    for iteration in 1..=poll.iterations {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (weather, dust) = tokio::join!(
            within(
                wants_weather && observations.weather.is_none(),
                remaining,
                fetcher.fetch_weather(config.kma_key(), grid),
            ),
            within(
                wants_dust && observations.dust.is_none(),
                remaining,
                fetcher.fetch_dust(config.air_key(), &config.station_name),
            ),
        );
        if weather.is_some() {
            observations.weather = weather;
        }
        if dust.is_some() {
            observations.dust = dust;
        }

        let complete = (!wants_weather || observations.weather.is_some())
            && (!wants_dust || observations.dust.is_some());
        if complete {
            break;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || iteration == poll.iterations {
            tracing::warn!(
                "Data polling ended incomplete (weather: {}, dust: {})",
                observations.weather.is_some(),
                observations.dust.is_some()
            );
            break;
        }
        tokio::time::sleep(poll.interval.min(remaining)).await;
    }

    observations
}

/// Run `fetch` under `limit` when `wanted`; the future is never polled otherwise
async fn within<T>(wanted: bool, limit: Duration, fetch: impl Future<Output = Option<T>>) -> Option<T> {
    if !wanted {
        return None;
    }
    tokio::time::timeout(limit, fetch).await.ok().flatten()
}
