// See https://www.fastly.com/documentation/reference/api/metrics-stats/historical-stats/

use serde::Deserialize;

use crate::collectors::{Collector, Error, Id};
use crate::config::{self, Env};
use crate::http::HttpClient;
use crate::plugin::Metric;

static PLUGIN_NAME: &str = "com.infra-plugins.fastly";
static EVENT_TYPE: &str = "FastlySample";
static PROVIDER: &str = "fastly";
static DEFAULT_API_URL: &str = "https://api.fastly.com";
static STATUS_SUCCESS: &str = "success";

#[derive(Clone)]
pub struct FastlyConfig {
    pub api_key: String,
    pub service_id: String,
    pub api_url: String,
}

impl std::fmt::Debug for FastlyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastlyConfig")
            .field("api_key", &config::mask(&self.api_key))
            .field("service_id", &self.service_id)
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl FastlyConfig {
    pub fn from_env(env: &Env) -> FastlyConfig {
        FastlyConfig {
            api_key: env.get_secret("FASTLY_API_KEY"),
            service_id: env.get("FASTLY_SERVICE_ID"),
            api_url: env.get_or("FASTLY_API_URL", DEFAULT_API_URL),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        config::require(&[("FASTLY_API_KEY", &self.api_key), ("FASTLY_SERVICE_ID", &self.service_id)])
    }
}

pub struct Fastly {
    id: Id,
    service_id: String,
    url: String,
    client: HttpClient,
}

pub fn create_instance(env: &Env) -> Result<Box<dyn Collector>, Error> {
    let config = FastlyConfig::from_env(env);
    config.validate()?;

    let url = format!(
        "{}/stats/service/{}?from=1+hour+ago&by=minute",
        config.api_url.trim_end_matches('/'),
        config.service_id
    );
    let id = format!("fastly#{}", config.service_id);
    let client = HttpClient::new()?.with_header("fastly-key", &config.api_key)?;
    info!("Created instance of Fastly collector: {}", id);

    Ok(Box::new(Fastly { id, service_id: config.service_id, url, client }))
}

impl Collector for Fastly {
    fn id(&self) -> &Id {
        &self.id
    }

    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn collect(&self) -> Result<Vec<Metric>, Error> {
        let response: StatsResponse = self.client.get_json(&self.url)?;
        let metric = latest_stats(&self.service_id, response)?;
        debug!("metric_data = {:#?}", metric);

        Ok(metric.into_iter().collect())
    }
}

#[derive(Debug, Deserialize)]
pub struct StatsResponse {
    pub status: String,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Vec<Stats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub start_time: u64,
    pub requests: u64,
    pub hits: u64,
    pub miss: u64,
    pub pass: u64,
    pub errors: u64,
    pub bandwidth: u64,
    pub hit_ratio: Option<f64>,
    pub status_2xx: u64,
    pub status_3xx: u64,
    pub status_4xx: u64,
    pub status_5xx: u64,
}

/// Turns the most recent data point into a record; no data yields no record.
pub fn latest_stats(service_id: &str, response: StatsResponse) -> Result<Option<Metric>, Error> {
    if response.status != STATUS_SUCCESS {
        let msg = response.msg.unwrap_or_default();
        return Err(Error::Parse(format!("Fastly API returned status '{}': {}", response.status, msg)));
    }

    let latest = response.data.into_iter().max_by_key(|s| s.start_time);
    Ok(latest.map(|stats| {
        let mut metric = Metric::new(EVENT_TYPE, PROVIDER)
            .with("serviceId", service_id.to_string())
            .with("startTime", stats.start_time)
            .with("requests", stats.requests)
            .with("hits", stats.hits)
            .with("miss", stats.miss)
            .with("pass", stats.pass)
            .with("errors", stats.errors)
            .with("bandwidth", stats.bandwidth)
            .with("status2xx", stats.status_2xx)
            .with("status3xx", stats.status_3xx)
            .with("status4xx", stats.status_4xx)
            .with("status5xx", stats.status_5xx);
        if let Some(hit_ratio) = stats.hit_ratio {
            metric.set("hitRatio", hit_ratio);
        }
        metric
    }))
}
