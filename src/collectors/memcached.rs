// See https://github.com/memcached/memcached/blob/master/doc/protocol.txt

use crate::collectors::{send_command, Collector, Error, Id};
use crate::config::{self, Env};
use crate::plugin::Metric;
use crate::utils::{as_value, camel_case};

static PLUGIN_NAME: &str = "com.infra-plugins.memcached";
static EVENT_TYPE: &str = "MemcachedSample";
static PROVIDER: &str = "memcached";
static STATS_COMMAND: &[u8] = b"stats\r\n";
static END_OF_STATS: &str = "END";
static ERROR_REPLIES: &[&str] = &["ERROR", "SERVER_ERROR", "CLIENT_ERROR"];

#[derive(Debug, Clone)]
pub struct MemcachedConfig {
    pub host: String,
    pub port: String,
}

impl MemcachedConfig {
    pub fn from_env(env: &Env) -> MemcachedConfig {
        MemcachedConfig { host: env.get("MEMCACHED_HOST"), port: env.get("MEMCACHED_PORT") }
    }

    pub fn validate(&self) -> Result<(), Error> {
        config::require(&[("MEMCACHED_HOST", &self.host), ("MEMCACHED_PORT", &self.port)])
    }
}

pub struct Memcached {
    id: Id,
    addr: String,
}

pub fn create_instance(env: &Env) -> Result<Box<dyn Collector>, Error> {
    let config = MemcachedConfig::from_env(env);
    config.validate()?;
    let port = config::parse_port("MEMCACHED_PORT", &config.port)?;

    let addr = format!("{}:{}", config.host, port);
    let id = format!("memcached#{}", addr);
    info!("Created instance of memcached collector: {}", id);

    Ok(Box::new(Memcached { id, addr }))
}

impl Collector for Memcached {
    fn id(&self) -> &Id {
        &self.id
    }

    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn collect(&self) -> Result<Vec<Metric>, Error> {
        let reply = send_command(&self.addr, STATS_COMMAND, stats_complete)?;
        let metric = parse_stats(&reply)?;
        debug!("metric_data = {:#?}", metric);

        Ok(vec![metric])
    }
}

/// A `stats` reply is complete once its last line is `END` or an error.
pub fn stats_complete(reply: &[u8]) -> bool {
    let body = match reply.strip_suffix(b"\r\n") {
        Some(body) => body,
        None => return false,
    };
    let last_line = match body.iter().rposition(|&b| b == b'\n') {
        Some(pos) => &body[pos + 1..],
        None => body,
    };
    last_line == END_OF_STATS.as_bytes() || is_error_reply(last_line)
}

fn is_error_reply(line: &[u8]) -> bool {
    ERROR_REPLIES.iter().any(|prefix| line.starts_with(prefix.as_bytes()))
}

/// Parses the `STAT <name> <value>` lines of a `stats` reply.
pub fn parse_stats(reply: &str) -> Result<Metric, Error> {
    let mut metric = Metric::new(EVENT_TYPE, PROVIDER);
    for line in reply.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line == END_OF_STATS {
            break;
        }
        if is_error_reply(line.as_bytes()) {
            return Err(Error::Parse(format!("memcached refused stats: '{}'", line)));
        }
        let mut parts = line.splitn(3, ' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("STAT"), Some(name), Some(value)) => {
                metric.set(camel_case(name), as_value(value));
            }
            _ => return Err(Error::Parse(format!("unexpected stats line '{}'", line))),
        }
    }
    Ok(metric)
}
