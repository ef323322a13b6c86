// See https://dev.mysql.com/doc/refman/8.0/en/server-status-variables.html

use ::mysql as my;
use ::mysql::prelude::Queryable;

use crate::collectors::{Collector, Error, Id};
use crate::config::{self, Env};
use crate::plugin::Metric;
use crate::utils::{as_value, camel_case};

static PLUGIN_NAME: &str = "com.infra-plugins.mysql";
static EVENT_TYPE: &str = "MysqlSample";
static PROVIDER: &str = "mysql";

static STATUS_VARIABLES: &[&str] = &[
    "Aborted_clients",
    "Aborted_connects",
    "Bytes_received",
    "Bytes_sent",
    "Com_delete",
    "Com_insert",
    "Com_select",
    "Com_update",
    "Connections",
    "Created_tmp_disk_tables",
    "Created_tmp_tables",
    "Innodb_buffer_pool_pages_data",
    "Innodb_buffer_pool_pages_free",
    "Innodb_buffer_pool_pages_total",
    "Innodb_buffer_pool_read_requests",
    "Innodb_buffer_pool_reads",
    "Innodb_row_lock_waits",
    "Max_used_connections",
    "Open_tables",
    "Opened_tables",
    "Queries",
    "Questions",
    "Slow_queries",
    "Table_locks_waited",
    "Threads_cached",
    "Threads_connected",
    "Threads_created",
    "Threads_running",
    "Uptime",
];

#[derive(Clone)]
pub struct MysqlConfig {
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for MysqlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MysqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &config::mask(&self.password))
            .finish()
    }
}

impl MysqlConfig {
    pub fn from_env(env: &Env) -> MysqlConfig {
        MysqlConfig {
            host: env.get("MYSQLHOST"),
            port: env.get("MYSQLPORT"),
            user: env.get("MYSQLUSER"),
            password: env.get_secret("MYSQLPASS"),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        config::require(&[("MYSQLHOST", &self.host), ("MYSQLPORT", &self.port), ("MYSQLUSER", &self.user)])
    }
}

pub struct Mysql {
    id: Id,
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
}

pub fn create_instance(env: &Env) -> Result<Box<dyn Collector>, Error> {
    let config = MysqlConfig::from_env(env);
    config.validate()?;
    let port = config::parse_port("MYSQLPORT", &config.port)?;

    let id = format!("mysql#{}@{}:{}", config.user, config.host, port);
    info!("Created instance of MySQL collector: {}", id);

    let password = if config.password.trim().is_empty() { None } else { Some(config.password) };
    Ok(Box::new(Mysql { id, host: config.host, port, user: config.user, password }))
}

impl<'a> From<&'a Mysql> for my::OptsBuilder {
    fn from(mysql: &'a Mysql) -> Self {
        my::OptsBuilder::new()
            .ip_or_hostname(Some(mysql.host.clone()))
            .tcp_port(mysql.port)
            .user(Some(mysql.user.clone()))
            .pass(mysql.password.clone())
    }
}

impl Collector for Mysql {
    fn id(&self) -> &Id {
        &self.id
    }

    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn collect(&self) -> Result<Vec<Metric>, Error> {
        let status = query_global_status(self)?;
        trace!("global status = {:#?}", status);
        let metric = status_to_metric(status);
        debug!("metric_data = {:#?}", metric);

        Ok(vec![metric])
    }
}

#[derive(Debug)]
pub struct StatusVariable {
    name: String,
    value: Option<String>,
}

impl StatusVariable {
    pub fn new<T: Into<String>>(name: T, value: Option<T>) -> StatusVariable {
        StatusVariable { name: name.into(), value: value.map(Into::into) }
    }
}

fn query_global_status(mysql: &Mysql) -> Result<Vec<StatusVariable>, Error> {
    let pool = my::Pool::new(my::OptsBuilder::from(mysql))?;
    let mut conn = pool.get_conn()?;
    let rows: Vec<(String, Option<String>)> = conn.query("SHOW GLOBAL STATUS").map_err(|err| {
        warn!("Failed to query MySQL global status, because {}", &err);
        err
    })?;

    Ok(rows.into_iter().map(|(name, value)| StatusVariable { name, value }).collect())
}

/// Keeps the known status variables and turns them into a single record.
pub fn status_to_metric(status: Vec<StatusVariable>) -> Metric {
    let mut metric = Metric::new(EVENT_TYPE, PROVIDER);
    for variable in status {
        let known = STATUS_VARIABLES.iter().any(|v| v.eq_ignore_ascii_case(&variable.name));
        if !known {
            continue;
        }
        if let Some(value) = variable.value {
            metric.set(camel_case(&variable.name.to_lowercase()), as_value(&value));
        }
    }
    metric
}
