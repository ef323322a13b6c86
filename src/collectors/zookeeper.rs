// See https://zookeeper.apache.org/doc/current/zookeeperAdmin.html#sc_4lw

use std::collections::BTreeMap;

use crate::collectors::{send_command, until_closed, Collector, Error, Id};
use crate::config::{self, Env};
use crate::plugin::{Inventory, Metric};
use crate::utils::{as_value, camel_case};

static PLUGIN_NAME: &str = "com.infra-plugins.zookeeper";
static EVENT_TYPE: &str = "ZookeeperSample";
static PROVIDER: &str = "zookeeper";
static INVENTORY_PREFIX: &str = "config/";

#[derive(Debug, Clone)]
pub struct ZookeeperConfig {
    pub host: String,
    pub port: String,
}

impl ZookeeperConfig {
    pub fn from_env(env: &Env) -> ZookeeperConfig {
        ZookeeperConfig { host: env.get("ZOOKEEPER_HOST"), port: env.get("ZOOKEEPER_PORT") }
    }

    pub fn validate(&self) -> Result<(), Error> {
        config::require(&[("ZOOKEEPER_HOST", &self.host), ("ZOOKEEPER_PORT", &self.port)])
    }
}

pub struct Zookeeper {
    id: Id,
    addr: String,
}

pub fn create_instance(env: &Env) -> Result<Box<dyn Collector>, Error> {
    let config = ZookeeperConfig::from_env(env);
    config.validate()?;
    let port = config::parse_port("ZOOKEEPER_PORT", &config.port)?;

    let addr = format!("{}:{}", config.host, port);
    let id = format!("zookeeper#{}", addr);
    info!("Created instance of Zookeeper collector: {}", id);

    Ok(Box::new(Zookeeper { id, addr }))
}

impl Collector for Zookeeper {
    fn id(&self) -> &Id {
        &self.id
    }

    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn collect(&self) -> Result<Vec<Metric>, Error> {
        let ruok = send_command(&self.addr, b"ruok", until_closed)?;
        let mntr = send_command(&self.addr, b"mntr", until_closed)?;

        let mut metric = parse_mntr(&mntr)?;
        metric.set("serverOk", ruok.trim() == "imok");
        debug!("metric_data = {:#?}", metric);

        Ok(vec![metric])
    }

    fn inventory(&self) -> Result<Inventory, Error> {
        let conf = send_command(&self.addr, b"conf", until_closed)?;
        Ok(parse_conf(&conf))
    }
}

/// Parses the tab separated `mntr` reply.
pub fn parse_mntr(reply: &str) -> Result<Metric, Error> {
    if reply.contains("is not executed because it is not in the whitelist") {
        return Err(Error::Parse(reply.trim().to_string()));
    }

    let mut metric = Metric::new(EVENT_TYPE, PROVIDER);
    for line in reply.lines().filter(|l| !l.trim().is_empty()) {
        let (key, value) = line
            .split_once('\t')
            .ok_or_else(|| Error::Parse(format!("unexpected mntr line '{}'", line)))?;
        let key = key.trim().trim_start_matches("zk_");
        metric.set(camel_case(key), as_value(value));
    }
    Ok(metric)
}

/// Parses the `key=value` lines of the `conf` reply into inventory items.
pub fn parse_conf(reply: &str) -> Inventory {
    let mut inventory = Inventory::new();
    for line in reply.lines() {
        if let Some((key, value)) = line.split_once('=') {
            let mut item = BTreeMap::new();
            item.insert("value".to_string(), as_value(value));
            inventory.insert(format!("{}{}", INVENTORY_PREFIX, key.trim()), item);
        }
    }
    inventory
}
