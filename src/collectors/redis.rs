// See https://redis.io/docs/latest/commands/info/ and https://redis.io/docs/latest/develop/reference/protocol-spec/

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use crate::collectors::{Collector, Error, Id};
use crate::config::{self, Env};
use crate::plugin::Metric;
use crate::utils::{as_value, camel_case};

static PLUGIN_NAME: &str = "com.infra-plugins.redis";
static EVENT_TYPE: &str = "RedisSample";
static PROVIDER: &str = "redis";
static MAX_BULK_LEN: i64 = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: String,
    pub password: String,
    pub db: String,
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &config::mask(&self.password))
            .field("db", &self.db)
            .finish()
    }
}

impl RedisConfig {
    pub fn from_env(env: &Env) -> RedisConfig {
        RedisConfig {
            host: env.get("REDISHOST"),
            port: env.get("REDISPORT"),
            password: env.get_secret("REDISPASS"),
            db: env.get("REDISDB"),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        config::require(&[("REDISHOST", &self.host), ("REDISPORT", &self.port)])
    }
}

pub struct Redis {
    id: Id,
    addr: String,
    password: Option<String>,
    db: Option<u32>,
}

pub fn create_instance(env: &Env) -> Result<Box<dyn Collector>, Error> {
    let config = RedisConfig::from_env(env);
    config.validate()?;
    let port = config::parse_port("REDISPORT", &config.port)?;
    let db = if config.db.is_empty() {
        None
    } else {
        let db = config.db.parse::<u32>().map_err(|err| {
            Error::InvalidConfig(format!("REDISDB must be a database number, but is '{}': {}", config.db, err))
        })?;
        Some(db)
    };

    let addr = format!("{}:{}", config.host, port);
    let id = format!("redis#{}/{}", addr, db.unwrap_or(0));
    info!("Created instance of Redis collector: {}", id);

    let password = if config.password.trim().is_empty() { None } else { Some(config.password) };
    Ok(Box::new(Redis { id, addr, password, db }))
}

impl Collector for Redis {
    fn id(&self) -> &Id {
        &self.id
    }

    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn collect(&self) -> Result<Vec<Metric>, Error> {
        let mut conn = Connection::open(&self.addr)?;
        if let Some(ref password) = self.password {
            conn.command(&["AUTH", password.as_str()])?;
        }
        if let Some(db) = self.db {
            conn.command(&["SELECT", db.to_string().as_str()])?;
        }
        let info = conn.command(&["INFO"])?;
        let metric = parse_info(&info);
        debug!("metric_data = {:#?}", metric);

        Ok(vec![metric])
    }
}

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn open(addr: &str) -> Result<Connection, Error> {
        let writer = TcpStream::connect(addr)?;
        let reader = BufReader::new(writer.try_clone()?);
        Ok(Connection { reader, writer })
    }

    fn command(&mut self, args: &[&str]) -> Result<String, Error> {
        trace!("Sending {} to Redis", args[0]);
        self.writer.write_all(&encode_command(args))?;
        self.writer.flush()?;
        read_reply(&mut self.reader)
    }
}

fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut buf = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

/// Reads a single simple string, error or bulk string reply.
fn read_reply<R: BufRead>(reader: &mut R) -> Result<String, Error> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(Error::Parse("Redis closed the connection".to_string()));
    }
    let line = line.trim_end_matches("\r\n");
    let mut chars = line.chars();
    let kind = chars.next();
    let rest = chars.as_str();

    match kind {
        Some('+') | Some(':') => Ok(rest.to_string()),
        Some('-') => Err(Error::Parse(format!("Redis replied with error '{}'", rest))),
        Some('$') => {
            let len = rest.parse::<i64>()?;
            if len < 0 {
                return Ok(String::new());
            }
            if len > MAX_BULK_LEN {
                return Err(Error::Parse(format!("Redis bulk reply of {} bytes exceeds {} bytes", len, MAX_BULK_LEN)));
            }
            let mut payload = vec![0u8; len as usize + 2];
            reader.read_exact(&mut payload)?;
            payload.truncate(len as usize);
            Ok(String::from_utf8_lossy(&payload).into_owned())
        }
        _ => Err(Error::Parse(format!("unexpected Redis reply '{}'", line))),
    }
}

/// Turns an `INFO` reply into a single record.
///
/// Values holding `k=v` lists, like the keyspace section, expand into one
/// field per pair: `db0:keys=1` becomes `db0.keys`.
pub fn parse_info(info: &str) -> Metric {
    let mut metric = Metric::new(EVENT_TYPE, PROVIDER);
    for line in info.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = match line.split_once(':') {
            Some(kv) => kv,
            None => {
                trace!("Ignoring INFO line '{}'", line);
                continue;
            }
        };
        if value.contains('=') {
            for pair in value.split(',') {
                if let Some((sub_key, sub_value)) = pair.split_once('=') {
                    metric.set(camel_case(&format!("{}:{}", key, sub_key)), as_value(sub_value));
                }
            }
        } else {
            metric.set(camel_case(key), as_value(value));
        }
    }
    metric
}
