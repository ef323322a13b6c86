// See
// * https://www.mongodb.com/docs/manual/reference/command/serverStatus/
// * https://www.mongodb.com/docs/manual/reference/command/dbStats/

use mongodb::bson::{doc, Bson, Document};
use mongodb::sync::Client;
use serde_json::Value;
use url::Url;

use crate::collectors::{Collector, Error, Id};
use crate::config::{self, Env};
use crate::plugin::Metric;

static PLUGIN_NAME: &str = "com.infra-plugins.datastore";
static EVENT_TYPE: &str = "DatastoreSample";
static PROVIDER: &str = "mongodb";
static SERVER_SELECTION_TIMEOUT_MS: &str = "10000";

static SERVER_STATUS_FIELDS: &[(&str, &str)] = &[
    ("uptime", "uptime"),
    ("connectionsCurrent", "connections.current"),
    ("connectionsAvailable", "connections.available"),
    ("connectionsTotalCreated", "connections.totalCreated"),
    ("opcountersInsert", "opcounters.insert"),
    ("opcountersQuery", "opcounters.query"),
    ("opcountersUpdate", "opcounters.update"),
    ("opcountersDelete", "opcounters.delete"),
    ("opcountersGetmore", "opcounters.getmore"),
    ("opcountersCommand", "opcounters.command"),
    ("memResident", "mem.resident"),
    ("memVirtual", "mem.virtual"),
    ("networkBytesIn", "network.bytesIn"),
    ("networkBytesOut", "network.bytesOut"),
    ("networkNumRequests", "network.numRequests"),
];

static DB_STATS_FIELDS: &[(&str, &str)] = &[
    ("collections", "collections"),
    ("objects", "objects"),
    ("dataSize", "dataSize"),
    ("storageSize", "storageSize"),
    ("indexes", "indexes"),
    ("indexSize", "indexSize"),
];

#[derive(Clone)]
pub struct DatastoreConfig {
    pub host: String,
    pub port: String,
    pub db: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for DatastoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatastoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("user", &self.user)
            .field("password", &config::mask(&self.password))
            .finish()
    }
}

impl DatastoreConfig {
    pub fn from_env(env: &Env) -> DatastoreConfig {
        DatastoreConfig {
            host: env.get("MONGODB_HOST"),
            port: env.get("MONGODB_PORT"),
            db: env.get("MONGODB_DB"),
            user: env.get("MONGODB_USER"),
            password: env.get_secret("MONGODB_PASSWORD"),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        config::require(&[("MONGODB_HOST", &self.host), ("MONGODB_PORT", &self.port), ("MONGODB_DB", &self.db)])
    }
}

pub struct Datastore {
    id: Id,
    uri: String,
    db: String,
}

pub fn create_instance(env: &Env) -> Result<Box<dyn Collector>, Error> {
    let config = DatastoreConfig::from_env(env);
    config.validate()?;
    let port = config::parse_port("MONGODB_PORT", &config.port)?;

    let uri = connection_uri(&config, port)?;
    let user = if config.user.is_empty() { "''" } else { config.user.as_str() };
    let id = format!("datastore#{}#{}@{}:{}", config.db, user, config.host, port);
    info!("Created instance of datastore collector: {}", id);

    Ok(Box::new(Datastore { id, uri, db: config.db }))
}

impl Collector for Datastore {
    fn id(&self) -> &Id {
        &self.id
    }

    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn collect(&self) -> Result<Vec<Metric>, Error> {
        let client = Client::with_uri_str(&self.uri)?;
        let db = client.database(&self.db);

        let server_status = db.run_command(doc! { "serverStatus": 1 }, None)?;
        trace!("serverStatus: {}", server_status);
        let db_stats = db.run_command(doc! { "dbStats": 1 }, None)?;
        trace!("dbStats: {}", db_stats);

        let metric = to_metric(&self.db, &server_status, &db_stats);
        debug!("metric_data = {:#?}", metric);

        Ok(vec![metric])
    }
}

/// Builds the connection URI; credentials are percent encoded.
fn connection_uri(config: &DatastoreConfig, port: u16) -> Result<String, Error> {
    let invalid = |what: &str| Error::InvalidConfig(format!("cannot build a MongoDB URI from {}", what));

    let mut uri = Url::parse(&format!("mongodb://{}:{}/{}", config.host, port, config.db))
        .map_err(|err| invalid(&format!("MONGODB_HOST '{}': {}", config.host, err)))?;
    if !config.user.is_empty() {
        uri.set_username(&config.user).map_err(|_| invalid("MONGODB_USER"))?;
        if !config.password.trim().is_empty() {
            uri.set_password(Some(&config.password)).map_err(|_| invalid("MONGODB_PASSWORD"))?;
        }
    }
    uri.query_pairs_mut()
        .append_pair("directConnection", "true")
        .append_pair("serverSelectionTimeoutMS", SERVER_SELECTION_TIMEOUT_MS);

    Ok(uri.into())
}

/// Merges `serverStatus` and `dbStats` replies into one record.
///
/// Fields a server version does not report are left out.
pub fn to_metric(db: &str, server_status: &Document, db_stats: &Document) -> Metric {
    let mut metric = Metric::new(EVENT_TYPE, PROVIDER).with("database", db.to_string());
    if let Ok(version) = server_status.get_str("version") {
        metric.set("version", version.to_string());
    }

    for (doc, fields) in [(server_status, SERVER_STATUS_FIELDS), (db_stats, DB_STATS_FIELDS)] {
        for &(name, path) in fields {
            match lookup(doc, path).and_then(number) {
                Some(value) => {
                    metric.set(name, value);
                }
                None => debug!("MongoDB reply has no numeric '{}'", path),
            }
        }
    }

    metric
}

fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_document()?.get(part)?;
    }
    Some(current)
}

fn number(bson: &Bson) -> Option<Value> {
    match *bson {
        Bson::Int32(i) => Some(i.into()),
        Bson::Int64(i) => Some(i.into()),
        Bson::Double(f) => serde_json::Number::from_f64(f).map(Value::Number),
        _ => None,
    }
}
