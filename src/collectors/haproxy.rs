// See https://docs.haproxy.org/2.8/management.html#9.1 for the CSV column layout.

use std::collections::HashMap;

use crate::collectors::{Collector, Error, Id};
use crate::config::{self, Env};
use crate::http::{http_url, HttpClient};
use crate::plugin::Metric;
use crate::utils::as_value;

static PLUGIN_NAME: &str = "com.infra-plugins.haproxy";
static PROVIDER: &str = "haproxy";
static FRONTEND_EVENT_TYPE: &str = "HAProxyFrontendSample";
static BACKEND_EVENT_TYPE: &str = "HAProxyBackendSample";
static SERVER_EVENT_TYPE: &str = "HAProxyServerSample";

/// Metric name and CSV column for every frontend field.
static FRONTEND_FIELDS: &[(&str, &str)] = &[
    ("proxyName", "pxname"),
    ("serviceName", "svname"),
    ("sessionsCurrent", "scur"),
    ("sessionsMax", "smax"),
    ("sessionsLimit", "slim"),
    ("sessionsTotal", "stot"),
    ("bytesIn", "bin"),
    ("bytesOut", "bout"),
    ("requestsDenied", "dreq"),
    ("responsesDenied", "dresp"),
    ("requestErrors", "ereq"),
    ("status", "status"),
    ("sessionRate", "rate"),
    ("sessionRateLimit", "rate_lim"),
    ("sessionRateMax", "rate_max"),
    ("requestRate", "req_rate"),
    ("requestsTotal", "req_tot"),
];

static BACKEND_FIELDS: &[(&str, &str)] = &[
    ("proxyName", "pxname"),
    ("serviceName", "svname"),
    ("queueCurrent", "qcur"),
    ("queueMax", "qmax"),
    ("sessionsCurrent", "scur"),
    ("sessionsMax", "smax"),
    ("sessionsTotal", "stot"),
    ("bytesIn", "bin"),
    ("bytesOut", "bout"),
    ("responsesDenied", "dresp"),
    ("connectionErrors", "econ"),
    ("responseErrors", "eresp"),
    ("retries", "wretr"),
    ("redispatches", "wredis"),
    ("status", "status"),
    ("activeServers", "act"),
    ("backupServers", "bck"),
    ("downtime", "downtime"),
    ("sessionRate", "rate"),
    ("sessionRateMax", "rate_max"),
];

static SERVER_FIELDS: &[(&str, &str)] = &[
    ("proxyName", "pxname"),
    ("serviceName", "svname"),
    ("queueCurrent", "qcur"),
    ("queueMax", "qmax"),
    ("sessionsCurrent", "scur"),
    ("sessionsMax", "smax"),
    ("sessionsTotal", "stot"),
    ("bytesIn", "bin"),
    ("bytesOut", "bout"),
    ("connectionErrors", "econ"),
    ("responseErrors", "eresp"),
    ("status", "status"),
    ("weight", "weight"),
    ("checkFailures", "chkfail"),
    ("checkDowns", "chkdown"),
    ("downtime", "downtime"),
    ("sessionRate", "rate"),
    ("checkStatus", "check_status"),
];

#[derive(Debug, Clone)]
pub struct HaproxyConfig {
    pub host: String,
    pub port: String,
    pub stats_uri: String,
    pub user: String,
    pub password: String,
}

impl HaproxyConfig {
    pub fn from_env(env: &Env) -> HaproxyConfig {
        HaproxyConfig {
            host: env.get("HAPROXYHOST"),
            port: env.get("HAPROXYPORT"),
            stats_uri: env.get("HAPROXYSTATSURI"),
            user: env.get("HAPROXYUSER"),
            password: env.get_secret("HAPROXYPASS"),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        config::require(&[
            ("HAPROXYHOST", &self.host),
            ("HAPROXYPORT", &self.port),
            ("HAPROXYSTATSURI", &self.stats_uri),
        ])
    }
}

pub struct Haproxy {
    id: Id,
    url: String,
    client: HttpClient,
}

pub fn create_instance(env: &Env) -> Result<Box<dyn Collector>, Error> {
    let config = HaproxyConfig::from_env(env);
    config.validate()?;
    let port = config::parse_port("HAPROXYPORT", &config.port)?;

    let url = http_url(&config.host, port, &config.stats_uri);
    let id = format!("haproxy#{}", url);
    let client = HttpClient::new()?.with_basic_auth(&config.user, &config.password);
    info!("Created instance of HAProxy collector: {}", id);

    Ok(Box::new(Haproxy { id, url, client }))
}

impl Collector for Haproxy {
    fn id(&self) -> &Id {
        &self.id
    }

    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn collect(&self) -> Result<Vec<Metric>, Error> {
        let csv = self.client.get_text(&self.url)?;
        let metric_data = parse_stats(&csv)?;
        debug!("metric_data = {:#?}", metric_data);

        Ok(metric_data)
    }
}

/// A stats CSV header, mapping column names to their positions.
#[derive(Debug)]
struct Header {
    columns: HashMap<String, usize>,
    len: usize,
}

impl Header {
    fn parse(line: &str) -> Result<Header, Error> {
        let line = line
            .strip_prefix('#')
            .ok_or_else(|| Error::Parse(format!("expected CSV header starting with '#', got '{}'", line)))?;
        let columns: HashMap<String, usize> = line
            .split(',')
            .enumerate()
            .filter(|(_, name)| !name.trim().is_empty())
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        if !columns.contains_key("pxname") || !columns.contains_key("svname") {
            return Err(Error::Parse("CSV header lacks pxname or svname".to_string()));
        }
        Ok(Header { columns, len: line.split(',').count() })
    }

    fn field<'a>(&self, record: &[&'a str], column: &str) -> Result<&'a str, Error> {
        let index = self.columns.get(column).ok_or_else(|| Error::MissingField(column.to_string()))?;
        record.get(*index).copied().ok_or_else(|| Error::MissingField(column.to_string()))
    }

    fn to_metric(&self, record: &[&str], event_type: &str, fields: &[(&str, &str)]) -> Result<Metric, Error> {
        let mut metric = Metric::new(event_type, PROVIDER);
        for (name, column) in fields {
            // Older HAProxy versions lack some of the newer columns
            if !self.columns.contains_key(*column) {
                continue;
            }
            let raw = self.field(record, column)?;
            if !raw.is_empty() {
                metric.set(*name, as_value(raw));
            }
        }
        Ok(metric)
    }
}

/// Parses a HAProxy stats CSV export into one record per row.
///
/// Rows shorter than the header are skipped.
pub fn parse_stats(csv: &str) -> Result<Vec<Metric>, Error> {
    let mut lines = csv.lines().filter(|l| !l.trim().is_empty());
    let header = match lines.next() {
        Some(line) => Header::parse(line)?,
        None => return Err(Error::Parse("empty HAProxy stats".to_string())),
    };
    trace!("header = {:?}", header);

    let mut metrics = Vec::new();
    for line in lines {
        let record: Vec<&str> = line.split(',').collect();
        match parse_record(&header, &record) {
            Ok(metric) => metrics.push(metric),
            Err(err) => warn!("Skipping HAProxy stats row '{}', because {}", line, err),
        }
    }

    Ok(metrics)
}

fn parse_record(header: &Header, record: &[&str]) -> Result<Metric, Error> {
    if record.len() < header.len {
        return Err(Error::Parse(format!(
            "row has {} columns, header has {}",
            record.len(),
            header.len
        )));
    }
    match header.field(record, "svname")? {
        "FRONTEND" => header.to_metric(record, FRONTEND_EVENT_TYPE, FRONTEND_FIELDS),
        "BACKEND" => header.to_metric(record, BACKEND_EVENT_TYPE, BACKEND_FIELDS),
        _ => header.to_metric(record, SERVER_EVENT_TYPE, SERVER_FIELDS),
    }
}
