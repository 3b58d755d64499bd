use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use url::Url;

use crate::cli::GeocoderArgs;

#[async_trait]
pub trait GeocodingService: Send + Sync {
    /// Raw GeoJSON response for a free-text query.
    async fn search(&self, query: &str) -> anyhow::Result<serde_json::Value>;
}

/// Direct limiter shared by every clone of a client.
type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Builds a one-request-per-period limiter; a zero period disables limiting.
fn build_limiter(min_interval: Duration) -> Option<Arc<Limiter>> {
    Quota::with_period(min_interval).map(|quota| Arc::new(RateLimiter::direct(quota)))
}

/// Nominatim search client.
#[derive(Clone)]
pub struct NominatimClient {
    client: reqwest::Client,
    endpoint: Url,
    rate_limiter: Option<Arc<Limiter>>,
}

impl NominatimClient {
    pub fn new(endpoint: &str, user_agent: &str, min_interval: Duration) -> anyhow::Result<Self> {
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("parse geocoder url: {endpoint}"))?;
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .context("build geocoder http client")?;
        Ok(Self {
            client,
            endpoint,
            rate_limiter: build_limiter(min_interval),
        })
    }

    pub fn from_args(args: &GeocoderArgs) -> anyhow::Result<Self> {
        if args.user_agent.trim().is_empty() {
            anyhow::bail!("--user-agent must not be empty");
        }
        Self::new(
            &args.geocoder_url,
            &args.user_agent,
            Duration::from_millis(args.delay_ms),
        )
    }
}

#[async_trait]
impl GeocodingService for NominatimClient {
    async fn search(&self, query: &str) -> anyhow::Result<serde_json::Value> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("format", "geojson")
            .append_pair("q", query);

        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("geocoder request for {query:?}"))?;

        let status = response.status();
        let raw = response.text().await.context("read geocoder response body")?;
        if !status.is_success() {
            anyhow::bail!("geocoder error ({status}) for {query:?}: {}", raw.trim());
        }
        serde_json::from_str(&raw).with_context(|| format!("parse geocoder response for {query:?}"))
    }
}
