use regex::{Captures, Regex};

use crate::collectors::{Collector, Error, Id};
use crate::config::{self, Env};
use crate::http::{http_url, HttpClient};
use crate::plugin::Metric;

static PLUGIN_NAME: &str = "com.infra-plugins.kraken";
static EVENT_TYPE: &str = "KrakenSample";
static PROVIDER: &str = "kraken";

#[derive(Debug, Clone)]
pub struct KrakenConfig {
    pub host: String,
    pub port: String,
    pub status_uri: String,
}

impl KrakenConfig {
    pub fn from_env(env: &Env) -> KrakenConfig {
        KrakenConfig {
            host: env.get("KRAKEN_HOST"),
            port: env.get("KRAKEN_PORT"),
            status_uri: env.get("KRAKEN_STATUS_URI"),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        config::require(&[
            ("KRAKEN_HOST", &self.host),
            ("KRAKEN_PORT", &self.port),
            ("KRAKEN_STATUS_URI", &self.status_uri),
        ])
    }
}

pub struct Kraken {
    id: Id,
    url: String,
    client: HttpClient,
}

pub fn create_instance(env: &Env) -> Result<Box<dyn Collector>, Error> {
    let config = KrakenConfig::from_env(env);
    config.validate()?;
    let port = config::parse_port("KRAKEN_PORT", &config.port)?;

    let url = http_url(&config.host, port, &config.status_uri);
    let id = format!("kraken#{}", url);
    info!("Created instance of Kraken collector: {}", id);

    Ok(Box::new(Kraken { id, url, client: HttpClient::new()? }))
}

impl Collector for Kraken {
    fn id(&self) -> &Id {
        &self.id
    }

    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn collect(&self) -> Result<Vec<Metric>, Error> {
        let body = self.client.get_text(&self.url)?;
        let report = scrape_report(&body)?;
        debug!("report = {:?}", report);

        Ok(vec![report.into()])
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Report {
    pub version: String,
    pub uptime: u64,
    pub connections_active: u64,
    pub connections_idle: u64,
    pub requests_total: u64,
    pub requests_failed: u64,
    pub queue_depth: u64,
}

/// Parses the plain text status report.
///
/// Lines may come in any order, but every one of them must be present.
pub fn scrape_report(body: &str) -> Result<Report, Error> {
    let version = capture(body, r"(?m)^\s*Version:\s+(?P<version>\S+)")?;
    let uptime = capture(body, r"(?m)^\s*Uptime:\s+(?P<uptime>\d+)")?;
    let connections = capture(body, r"(?m)^\s*Connections:\s+(?P<active>\d+)\s+active,\s+(?P<idle>\d+)\s+idle")?;
    let requests = capture(body, r"(?m)^\s*Requests:\s+(?P<total>\d+)\s+total,\s+(?P<failed>\d+)\s+failed")?;
    let queue = capture(body, r"(?m)^\s*Queue depth:\s+(?P<depth>\d+)")?;

    Ok(Report {
        version: field(&version, "version")?.to_string(),
        uptime: field(&uptime, "uptime")?.parse()?,
        connections_active: field(&connections, "active")?.parse()?,
        connections_idle: field(&connections, "idle")?.parse()?,
        requests_total: field(&requests, "total")?.parse()?,
        requests_failed: field(&requests, "failed")?.parse()?,
        queue_depth: field(&queue, "depth")?.parse()?,
    })
}

fn capture<'a>(body: &'a str, pattern: &str) -> Result<Captures<'a>, Error> {
    let re = Regex::new(pattern).map_err(|e| Error::Parse(e.to_string()))?;
    re.captures(body)
        .ok_or_else(|| Error::Parse(format!("Kraken report does not match '{}'", pattern)))
}

fn field<'a>(caps: &Captures<'a>, name: &str) -> Result<&'a str, Error> {
    caps.name(name)
        .map(|m| m.as_str())
        .ok_or_else(|| Error::MissingField(name.to_string()))
}

impl From<Report> for Metric {
    fn from(report: Report) -> Self {
        Metric::new(EVENT_TYPE, PROVIDER)
            .with("version", report.version)
            .with("uptime", report.uptime)
            .with("connectionsActive", report.connections_active)
            .with("connectionsIdle", report.connections_idle)
            .with("requestsTotal", report.requests_total)
            .with("requestsFailed", report.requests_failed)
            .with("queueDepth", report.queue_depth)
    }
}
