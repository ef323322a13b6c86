use serde::Deserialize;

use crate::collectors::{Collector, Error, Id};
use crate::config::{self, Env};
use crate::http::HttpClient;
use crate::plugin::Metric;

static PLUGIN_NAME: &str = "com.infra-plugins.jenkins";
static EVENT_TYPE: &str = "JenkinsSample";
static NODE_EVENT_TYPE: &str = "JenkinsNodeSample";
static PROVIDER: &str = "jenkins";

#[derive(Clone)]
pub struct JenkinsConfig {
    pub url: String,
    pub user: String,
    pub api_token: String,
}

impl std::fmt::Debug for JenkinsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JenkinsConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("api_token", &config::mask(&self.api_token))
            .finish()
    }
}

impl JenkinsConfig {
    pub fn from_env(env: &Env) -> JenkinsConfig {
        JenkinsConfig {
            url: env.get("JENKINS_URL"),
            user: env.get("JENKINS_USER"),
            api_token: env.get_secret("JENKINS_API_TOKEN"),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        config::require(&[("JENKINS_URL", &self.url)])?;
        if !self.api_token.trim().is_empty() && self.user.is_empty() {
            return Err(Error::MissingConfig(vec!["JENKINS_USER".to_string()]));
        }
        Ok(())
    }
}

pub struct Jenkins {
    id: Id,
    url: String,
    client: HttpClient,
}

pub fn create_instance(env: &Env) -> Result<Box<dyn Collector>, Error> {
    let config = JenkinsConfig::from_env(env);
    config.validate()?;

    let url = config.url.trim_end_matches('/').to_string();
    let id = format!("jenkins#{}", url);
    let client = HttpClient::new()?.with_basic_auth(&config.user, &config.api_token);
    info!("Created instance of Jenkins collector: {}", id);

    Ok(Box::new(Jenkins { id, url, client }))
}

impl Collector for Jenkins {
    fn id(&self) -> &Id {
        &self.id
    }

    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn collect(&self) -> Result<Vec<Metric>, Error> {
        let computers: ComputerSet = self.client.get_json(&format!("{}/computer/api/json", self.url))?;
        let queue: Queue = self.client.get_json(&format!("{}/queue/api/json", self.url))?;
        let metric_data = to_metrics(&computers, &queue);
        debug!("metric_data = {:#?}", metric_data);

        Ok(metric_data)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputerSet {
    #[serde(default)]
    pub busy_executors: u64,
    #[serde(default)]
    pub total_executors: u64,
    #[serde(default)]
    pub computer: Vec<Computer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Computer {
    pub display_name: String,
    #[serde(default)]
    pub idle: bool,
    #[serde(default)]
    pub offline: bool,
    #[serde(default)]
    pub temporarily_offline: bool,
    #[serde(default)]
    pub num_executors: u64,
}

#[derive(Debug, Deserialize)]
pub struct Queue {
    #[serde(default)]
    pub items: Vec<QueueItem>,
}

#[derive(Debug, Deserialize)]
pub struct QueueItem {
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub buildable: bool,
    #[serde(default)]
    pub stuck: bool,
}

/// One summary record plus one record per build node.
pub fn to_metrics(computers: &ComputerSet, queue: &Queue) -> Vec<Metric> {
    let offline = computers.computer.iter().filter(|c| c.offline).count();
    let online = computers.computer.len() - offline;
    let count = |pred: fn(&QueueItem) -> bool| queue.items.iter().filter(|i| pred(i)).count();

    let mut metrics = vec![Metric::new(EVENT_TYPE, PROVIDER)
        .with("busyExecutors", computers.busy_executors)
        .with("totalExecutors", computers.total_executors)
        .with("idleExecutors", computers.total_executors.saturating_sub(computers.busy_executors))
        .with("onlineNodes", online)
        .with("offlineNodes", offline)
        .with("queueLength", queue.items.len())
        .with("queueBlocked", count(|i| i.blocked))
        .with("queueBuildable", count(|i| i.buildable))
        .with("queueStuck", count(|i| i.stuck))];

    metrics.extend(computers.computer.iter().map(|computer| {
        Metric::new(NODE_EVENT_TYPE, PROVIDER)
            .with("nodeName", computer.display_name.clone())
            .with("idle", computer.idle)
            .with("offline", computer.offline)
            .with("temporarilyOffline", computer.temporarily_offline)
            .with("numExecutors", computer.num_executors)
    }));

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static COMPUTERS: &str = r#"{
        "_class": "hudson.model.ComputerSet",
        "busyExecutors": 3,
        "computer": [
            {"displayName": "master", "idle": false, "offline": false, "temporarilyOffline": false, "numExecutors": 2},
            {"displayName": "agent-1", "idle": true, "offline": false, "temporarilyOffline": false, "numExecutors": 4},
            {"displayName": "agent-2", "idle": true, "offline": true, "temporarilyOffline": true, "numExecutors": 4}
        ],
        "displayName": "Nodes",
        "totalExecutors": 10
    }"#;

    static QUEUE: &str = r#"{"items": [
        {"blocked": true, "buildable": false, "stuck": false},
        {"blocked": false, "buildable": true, "stuck": true}
    ]}"#;

    #[test]
    fn summary_and_node_records() {
        let computers: ComputerSet = serde_json::from_str(COMPUTERS).unwrap();
        let queue: Queue = serde_json::from_str(QUEUE).unwrap();

        let metrics = to_metrics(&computers, &queue);

        assert_eq!(metrics.len(), 4);
        let summary = &metrics[0];
        assert_eq!(summary.event_type(), Some("JenkinsSample"));
        assert_eq!(summary.get("busyExecutors"), Some(&json!(3)));
        assert_eq!(summary.get("idleExecutors"), Some(&json!(7)));
        assert_eq!(summary.get("onlineNodes"), Some(&json!(2)));
        assert_eq!(summary.get("offlineNodes"), Some(&json!(1)));
        assert_eq!(summary.get("queueLength"), Some(&json!(2)));
        assert_eq!(summary.get("queueStuck"), Some(&json!(1)));

        let agent = &metrics[3];
        assert_eq!(agent.event_type(), Some("JenkinsNodeSample"));
        assert_eq!(agent.get("nodeName"), Some(&json!("agent-2")));
        assert_eq!(agent.get("offline"), Some(&json!(true)));
    }

    #[test]
    fn token_requires_user() {
        let env = Env::from_pairs(vec![("JENKINS_URL", "http://ci"), ("JENKINS_API_TOKEN", "t0k3n")]);

        assert!(JenkinsConfig::from_env(&env).validate().is_err());
    }

    #[test]
    fn anonymous_access_is_allowed() {
        let env = Env::from_pairs(vec![("JENKINS_URL", "http://ci")]);

        assert!(JenkinsConfig::from_env(&env).validate().is_ok());
    }
}
