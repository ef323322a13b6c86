// See https://www.rabbitmq.com/docs/http-api-reference

use serde::Deserialize;

use crate::collectors::{Collector, Error, Id};
use crate::config::{self, Env};
use crate::http::{http_url, HttpClient};
use crate::plugin::Metric;

static PLUGIN_NAME: &str = "com.infra-plugins.rabbitmq";
static OVERVIEW_EVENT_TYPE: &str = "RabbitmqOverviewSample";
static QUEUE_EVENT_TYPE: &str = "RabbitmqQueueSample";
static PROVIDER: &str = "rabbitmq";

#[derive(Clone)]
pub struct RabbitmqConfig {
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for RabbitmqConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RabbitmqConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &config::mask(&self.password))
            .finish()
    }
}

impl RabbitmqConfig {
    pub fn from_env(env: &Env) -> RabbitmqConfig {
        RabbitmqConfig {
            host: env.get("RABBITMQ_HOST"),
            port: env.get("RABBITMQ_PORT"),
            user: env.get("RABBITMQ_USER"),
            password: env.get_secret("RABBITMQ_PASSWORD"),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        config::require(&[
            ("RABBITMQ_HOST", &self.host),
            ("RABBITMQ_PORT", &self.port),
            ("RABBITMQ_USER", &self.user),
            ("RABBITMQ_PASSWORD", &self.password),
        ])
    }
}

pub struct Rabbitmq {
    id: Id,
    overview_url: String,
    queues_url: String,
    client: HttpClient,
}

pub fn create_instance(env: &Env) -> Result<Box<dyn Collector>, Error> {
    let config = RabbitmqConfig::from_env(env);
    config.validate()?;
    let port = config::parse_port("RABBITMQ_PORT", &config.port)?;

    let id = format!("rabbitmq#{}@{}:{}", config.user, config.host, port);
    let client = HttpClient::new()?.with_basic_auth(&config.user, &config.password);
    info!("Created instance of RabbitMQ collector: {}", id);

    Ok(Box::new(Rabbitmq {
        id,
        overview_url: http_url(&config.host, port, "/api/overview"),
        queues_url: http_url(&config.host, port, "/api/queues"),
        client,
    }))
}

impl Collector for Rabbitmq {
    fn id(&self) -> &Id {
        &self.id
    }

    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn collect(&self) -> Result<Vec<Metric>, Error> {
        let overview: Overview = self.client.get_json(&self.overview_url)?;
        let queues: Vec<Queue> = self.client.get_json(&self.queues_url)?;

        let mut metric_data = vec![overview.into()];
        metric_data.extend(queues.into_iter().map(Metric::from));
        debug!("metric_data = {:#?}", metric_data);

        Ok(metric_data)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Overview {
    pub cluster_name: Option<String>,
    pub rabbitmq_version: Option<String>,
    pub object_totals: ObjectTotals,
    pub queue_totals: QueueTotals,
    pub message_stats: MessageStats,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ObjectTotals {
    pub connections: u64,
    pub channels: u64,
    pub exchanges: u64,
    pub queues: u64,
    pub consumers: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QueueTotals {
    pub messages: u64,
    pub messages_ready: u64,
    pub messages_unacknowledged: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MessageStats {
    pub publish: u64,
    pub deliver_get: u64,
    pub ack: u64,
    pub redeliver: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Queue {
    pub name: String,
    pub vhost: String,
    pub state: Option<String>,
    pub messages: u64,
    pub messages_ready: u64,
    pub messages_unacknowledged: u64,
    pub consumers: u64,
    pub memory: u64,
}

impl From<Overview> for Metric {
    fn from(overview: Overview) -> Self {
        let mut metric = Metric::new(OVERVIEW_EVENT_TYPE, PROVIDER)
            .with("connections", overview.object_totals.connections)
            .with("channels", overview.object_totals.channels)
            .with("exchanges", overview.object_totals.exchanges)
            .with("queues", overview.object_totals.queues)
            .with("consumers", overview.object_totals.consumers)
            .with("messages", overview.queue_totals.messages)
            .with("messagesReady", overview.queue_totals.messages_ready)
            .with("messagesUnacknowledged", overview.queue_totals.messages_unacknowledged)
            .with("messagesPublished", overview.message_stats.publish)
            .with("messagesDelivered", overview.message_stats.deliver_get)
            .with("messagesAcknowledged", overview.message_stats.ack)
            .with("messagesRedelivered", overview.message_stats.redeliver);
        if let Some(cluster_name) = overview.cluster_name {
            metric.set("clusterName", cluster_name);
        }
        if let Some(version) = overview.rabbitmq_version {
            metric.set("version", version);
        }
        metric
    }
}

impl From<Queue> for Metric {
    fn from(queue: Queue) -> Self {
        let mut metric = Metric::new(QUEUE_EVENT_TYPE, PROVIDER)
            .with("queueName", queue.name)
            .with("vhost", queue.vhost)
            .with("messages", queue.messages)
            .with("messagesReady", queue.messages_ready)
            .with("messagesUnacknowledged", queue.messages_unacknowledged)
            .with("consumers", queue.consumers)
            .with("memory", queue.memory);
        if let Some(state) = queue.state {
            metric.set("state", state);
        }
        metric
    }
}
