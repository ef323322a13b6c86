// See https://docs.couchbase.com/server/current/rest-api/rest-bucket-stats.html

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use crate::collectors::{Collector, Error, Id};
use crate::config::{self, Env};
use crate::http::{http_url, HttpClient};
use crate::plugin::Metric;
use crate::utils::camel_case;

static PLUGIN_NAME: &str = "com.infra-plugins.couchbase";
static BUCKET_EVENT_TYPE: &str = "CouchbaseBucketSample";
static EP_STATS_EVENT_TYPE: &str = "CouchbaseEPStatsSample";
static PROVIDER: &str = "couchbase";
static EP_PREFIX: &str = "ep_";

#[derive(Clone)]
pub struct CouchbaseConfig {
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for CouchbaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouchbaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &config::mask(&self.password))
            .finish()
    }
}

impl CouchbaseConfig {
    pub fn from_env(env: &Env) -> CouchbaseConfig {
        CouchbaseConfig {
            host: env.get("COUCHBASE_HOST"),
            port: env.get("COUCHBASE_PORT"),
            user: env.get("COUCHBASE_USER"),
            password: env.get_secret("COUCHBASE_PASSWORD"),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        config::require(&[
            ("COUCHBASE_HOST", &self.host),
            ("COUCHBASE_PORT", &self.port),
            ("COUCHBASE_USER", &self.user),
            ("COUCHBASE_PASSWORD", &self.password),
        ])
    }
}

pub struct Couchbase {
    id: Id,
    base_url: String,
    client: HttpClient,
}

pub fn create_instance(env: &Env) -> Result<Box<dyn Collector>, Error> {
    let config = CouchbaseConfig::from_env(env);
    config.validate()?;
    let port = config::parse_port("COUCHBASE_PORT", &config.port)?;

    let base_url = http_url(&config.host, port, "/pools/default/buckets");
    let id = format!("couchbase#{}@{}:{}", config.user, config.host, port);
    let client = HttpClient::new()?.with_basic_auth(&config.user, &config.password);
    info!("Created instance of Couchbase collector: {}", id);

    Ok(Box::new(Couchbase { id, base_url, client }))
}

impl Collector for Couchbase {
    fn id(&self) -> &Id {
        &self.id
    }

    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn collect(&self) -> Result<Vec<Metric>, Error> {
        let buckets: Vec<Bucket> = self.client.get_json(&self.base_url)?;
        debug!("Found {} buckets", buckets.len());

        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let metric_data = fan_out(buckets, move |bucket: &Bucket| {
            let url = format!("{}/{}/stats", base_url, bucket.name);
            client.get_json::<BucketStats>(&url)
        });
        debug!("metric_data = {:#?}", metric_data);

        Ok(metric_data)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub name: String,
    #[serde(default)]
    pub bucket_type: Option<String>,
    #[serde(default)]
    pub basic_stats: BasicStats,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BasicStats {
    pub quota_percent_used: f64,
    pub ops_per_sec: f64,
    pub disk_fetches: f64,
    pub item_count: f64,
    pub disk_used: f64,
    pub data_used: f64,
    pub mem_used: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketStats {
    pub op: OpStats,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpStats {
    #[serde(default)]
    pub samples: BTreeMap<String, Vec<f64>>,
}

impl OpStats {
    /// The most recent value of every sampled series.
    fn latest(&self) -> impl Iterator<Item = (&String, f64)> {
        self.samples
            .iter()
            .filter(|(name, _)| name.as_str() != "timestamp")
            .filter_map(|(name, series)| series.last().map(|v| (name, *v)))
    }
}

/// Fetches the stats of every bucket on its own thread.
///
/// Buckets whose fetch fails are logged and left out; every other bucket
/// contributes a bucket record and an EP stats record, in arbitrary order.
pub fn fan_out<F>(buckets: Vec<Bucket>, fetch: F) -> Vec<Metric>
where
    F: Fn(&Bucket) -> Result<BucketStats, Error> + Send + Sync + 'static,
{
    let fetch = Arc::new(fetch);
    let (tx, rx) = chan::sync(buckets.len());
    let wg = chan::WaitGroup::new();
    wg.add(buckets.len() as i32);

    for bucket in buckets {
        let tx = tx.clone();
        let wg = wg.clone();
        let fetch = fetch.clone();
        thread::spawn(move || {
            trace!("Fetching stats of bucket {}", bucket.name);
            match fetch(&bucket) {
                Ok(stats) => tx.send((bucket, stats)),
                Err(err) => error!("Failed to fetch stats of bucket {}, because {}", bucket.name, err),
            }
            wg.done();
        });
    }
    wg.wait();
    drop(tx);

    rx.iter()
        .flat_map(|(bucket, stats)| bucket_to_metrics(&bucket, &stats))
        .collect()
}

fn bucket_to_metrics(bucket: &Bucket, stats: &BucketStats) -> Vec<Metric> {
    let basic = &bucket.basic_stats;
    let mut bucket_metric = Metric::new(BUCKET_EVENT_TYPE, PROVIDER)
        .with("bucketName", bucket.name.clone())
        .with("quotaPercentUsed", basic.quota_percent_used)
        .with("opsPerSec", basic.ops_per_sec)
        .with("diskFetches", basic.disk_fetches)
        .with("itemCount", basic.item_count)
        .with("diskUsed", basic.disk_used)
        .with("dataUsed", basic.data_used)
        .with("memUsed", basic.mem_used);
    if let Some(ref bucket_type) = bucket.bucket_type {
        bucket_metric.set("bucketType", bucket_type.clone());
    }
    let mut ep_metric = Metric::new(EP_STATS_EVENT_TYPE, PROVIDER).with("bucketName", bucket.name.clone());

    for (name, value) in stats.op.latest() {
        if name.starts_with(EP_PREFIX) {
            ep_metric.set(camel_case(name), value);
        } else {
            bucket_metric.set(camel_case(name), value);
        }
    }

    vec![bucket_metric, ep_metric]
}
