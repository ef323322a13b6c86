// See http://nginx.org/en/docs/http/ngx_http_stub_status_module.html

use regex::Regex;

use crate::collectors::{Collector, Error, Id};
use crate::config::{self, Env};
use crate::http::{http_url, HttpClient};
use crate::plugin::Metric;

static PLUGIN_NAME: &str = "com.infra-plugins.nginx";
static EVENT_TYPE: &str = "NginxSample";
static PROVIDER: &str = "nginx";

#[derive(Debug, Clone)]
pub struct NginxConfig {
    pub host: String,
    pub port: String,
    pub status_uri: String,
}

impl NginxConfig {
    pub fn from_env(env: &Env) -> NginxConfig {
        NginxConfig {
            host: env.get("NGINXHOST"),
            port: env.get("NGINXLISTENPORT"),
            status_uri: env.get("NGINXSTATUSURI"),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        config::require(&[
            ("NGINXHOST", &self.host),
            ("NGINXLISTENPORT", &self.port),
            ("NGINXSTATUSURI", &self.status_uri),
        ])
    }
}

pub struct Nginx {
    id: Id,
    url: String,
    client: HttpClient,
}

pub fn create_instance(env: &Env) -> Result<Box<dyn Collector>, Error> {
    let config = NginxConfig::from_env(env);
    config.validate()?;
    let port = config::parse_port("NGINXLISTENPORT", &config.port)?;

    let url = http_url(&config.host, port, &config.status_uri);
    let id = format!("nginx#{}", url);
    info!("Created instance of nginx collector: {}", id);

    Ok(Box::new(Nginx { id, url, client: HttpClient::new()? }))
}

impl Collector for Nginx {
    fn id(&self) -> &Id {
        &self.id
    }

    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn collect(&self) -> Result<Vec<Metric>, Error> {
        let body = self.client.get_text(&self.url)?;
        let status = scrape_status(&body)?;
        debug!("status = {:?}", status);

        Ok(vec![status.into()])
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct StubStatus {
    pub connections: u64,
    pub accepts: u64,
    pub handled: u64,
    pub requests: u64,
    pub reading: u64,
    pub writing: u64,
    pub waiting: u64,
}

/// Parses the stub status page.
pub fn scrape_status(body: &str) -> Result<StubStatus, Error> {
    let re = Regex::new(
        r"(?s)Active connections:\s+(?P<connections>\d+).*?server accepts handled requests\s+(?P<accepts>\d+)\s+(?P<handled>\d+)\s+(?P<requests>\d+).*?Reading:\s+(?P<reading>\d+)\s+Writing:\s+(?P<writing>\d+)\s+Waiting:\s+(?P<waiting>\d+)",
    )
    .map_err(|e| Error::Parse(e.to_string()))?;

    let caps = re
        .captures(body)
        .ok_or_else(|| Error::Parse(format!("unexpected nginx status page: '{}'", body.trim())))?;
    let field = |name: &str| -> Result<u64, Error> {
        let raw = caps.name(name).ok_or_else(|| Error::MissingField(name.to_string()))?;
        Ok(raw.as_str().parse::<u64>()?)
    };

    Ok(StubStatus {
        connections: field("connections")?,
        accepts: field("accepts")?,
        handled: field("handled")?,
        requests: field("requests")?,
        reading: field("reading")?,
        writing: field("writing")?,
        waiting: field("waiting")?,
    })
}

impl From<StubStatus> for Metric {
    fn from(status: StubStatus) -> Self {
        Metric::new(EVENT_TYPE, PROVIDER)
            .with("connections", status.connections)
            .with("accepts", status.accepts)
            .with("handled", status.handled)
            .with("requests", status.requests)
            .with("reading", status.reading)
            .with("writing", status.writing)
            .with("waiting", status.waiting)
    }
}
