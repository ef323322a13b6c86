use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::num::ParseIntError;
use std::time::Duration;

use crate::config::Env;
use crate::plugin::{Inventory, Metric};

pub mod couchbase;
pub mod datastore;
pub mod fastly;
pub mod haproxy;
pub mod jenkins;
pub mod jira;
pub mod kraken;
pub mod memcached;
pub mod mysql;
pub mod nginx;
pub mod rabbitmq;
pub mod redis;
pub mod ssl_check;
pub mod zookeeper;

pub type Id = String;

static READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Name and description of every collector, in CLI order.
pub static COLLECTORS: &[(&str, &str)] = &[
    ("couchbase", "Collects cluster bucket statistics from Couchbase"),
    ("haproxy", "Collects frontend, backend and server statistics from HAProxy"),
    ("nginx", "Collects connection statistics from the nginx stub status page"),
    ("mysql", "Collects global status variables from MySQL"),
    ("redis", "Collects INFO statistics from Redis"),
    ("jenkins", "Collects executor, node and queue statistics from Jenkins"),
    ("jira", "Collects issue counts from Jira"),
    ("zookeeper", "Collects mntr statistics and configuration from Zookeeper"),
    ("rabbitmq", "Collects overview and queue statistics from RabbitMQ"),
    ("fastly", "Collects service statistics from the Fastly API"),
    ("kraken", "Collects statistics from the Kraken status report"),
    ("memcached", "Collects stats from memcached"),
    ("sslCheck", "Checks TLS certificates for expiry"),
    ("datastore", "Collects server and database statistics from MongoDB"),
];

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("missing required configuration: {}", .0.join(", "))]
    MissingConfig(Vec<String>),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unknown collector '{0}'")]
    UnknownCollector(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to decode JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse status: {0}")]
    Parse(String),
    #[error("status is missing field '{0}'")]
    MissingField(String),
    #[error("MySQL query failed: {0}")]
    Mysql(#[from] ::mysql::Error),
    #[error("MongoDB command failed: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("TLS error: {0}")]
    Tls(String),
}

impl From<ParseIntError> for Error {
    fn from(err: ParseIntError) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::Tls(err.to_string())
    }
}

/// A collector fetches the status of one monitored service and turns it into metric records.
pub trait Collector {
    fn id(&self) -> &Id;

    /// Name reported in the plugin envelope.
    fn plugin_name(&self) -> &'static str;

    fn collect(&self) -> Result<Vec<Metric>, Error>;

    fn inventory(&self) -> Result<Inventory, Error> {
        Ok(Inventory::new())
    }
}

/// Creates the collector registered under `name`, configured from `env`.
pub fn create_collector(name: &str, env: &Env) -> Result<Box<dyn Collector>, Error> {
    match name {
        "couchbase" => couchbase::create_instance(env),
        "haproxy" => haproxy::create_instance(env),
        "nginx" => nginx::create_instance(env),
        "mysql" => mysql::create_instance(env),
        "redis" => redis::create_instance(env),
        "jenkins" => jenkins::create_instance(env),
        "jira" => jira::create_instance(env),
        "zookeeper" => zookeeper::create_instance(env),
        "rabbitmq" => rabbitmq::create_instance(env),
        "fastly" => fastly::create_instance(env),
        "kraken" => kraken::create_instance(env),
        "memcached" => memcached::create_instance(env),
        "sslCheck" => ssl_check::create_instance(env),
        "datastore" => datastore::create_instance(env),
        other => Err(Error::UnknownCollector(other.to_string())),
    }
}

/// Sends one command over a fresh TCP connection and returns the reply.
///
/// Reads until `complete` accepts the reply received so far or the server
/// closes the connection. A server that stays silent for `READ_TIMEOUT`
/// fails the command.
pub(crate) fn send_command(addr: &str, command: &[u8], complete: fn(&[u8]) -> bool) -> Result<String, Error> {
    debug!("Sending '{}' to {}", String::from_utf8_lossy(command).trim(), addr);
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    stream.write_all(command)?;
    stream.flush()?;

    let mut reply = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        reply.extend_from_slice(&buf[..n]);
        if complete(&reply) {
            break;
        }
    }
    let reply = String::from_utf8_lossy(&reply).into_owned();
    trace!("Reply from {}: '{}'", addr, reply);

    Ok(reply)
}

/// Completion check for servers that close the connection after replying.
pub(crate) fn until_closed(_: &[u8]) -> bool {
    false
}
