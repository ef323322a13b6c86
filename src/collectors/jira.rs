use serde::Deserialize;
use url::Url;

use crate::collectors::{Collector, Error, Id};
use crate::config::{self, Env};
use crate::http::HttpClient;
use crate::plugin::Metric;

static PLUGIN_NAME: &str = "com.infra-plugins.jira";
static EVENT_TYPE: &str = "JiraSample";
static PROVIDER: &str = "jira";
static DEFAULT_JQL: &str = "resolution = Unresolved";

#[derive(Clone)]
pub struct JiraConfig {
    pub url: String,
    pub user: String,
    pub auth_token: String,
    pub jql: String,
}

impl std::fmt::Debug for JiraConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiraConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("auth_token", &config::mask(&self.auth_token))
            .field("jql", &self.jql)
            .finish()
    }
}

impl JiraConfig {
    pub fn from_env(env: &Env) -> JiraConfig {
        JiraConfig {
            url: env.get("JIRA_URL"),
            user: env.get("JIRA_USER"),
            auth_token: env.get_secret("JIRA_AUTH_TOKEN"),
            jql: env.get_or("JIRA_JQL", DEFAULT_JQL),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        config::require(&[("JIRA_URL", &self.url), ("JIRA_USER", &self.user), ("JIRA_AUTH_TOKEN", &self.auth_token)])
    }
}

pub struct Jira {
    id: Id,
    search_url: String,
    jql: String,
    client: HttpClient,
}

pub fn create_instance(env: &Env) -> Result<Box<dyn Collector>, Error> {
    let config = JiraConfig::from_env(env);
    config.validate()?;

    let search_url = search_url(&config.url, &config.jql)?;
    let id = format!("jira#{}@{}", config.user, config.url);
    let client = HttpClient::new()?.with_basic_auth(&config.user, &config.auth_token);
    info!("Created instance of Jira collector: {}", id);

    Ok(Box::new(Jira { id, search_url, jql: config.jql, client }))
}

impl Collector for Jira {
    fn id(&self) -> &Id {
        &self.id
    }

    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn collect(&self) -> Result<Vec<Metric>, Error> {
        let result: SearchResult = self.client.get_json(&self.search_url)?;
        let metric = Metric::new(EVENT_TYPE, PROVIDER)
            .with("jql", self.jql.clone())
            .with("issueCount", result.total);
        debug!("metric_data = {:#?}", metric);

        Ok(vec![metric])
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchResult {
    pub total: u64,
}

/// Builds the search URL that only asks for the number of matching issues.
fn search_url(base: &str, jql: &str) -> Result<String, Error> {
    let base = format!("{}/rest/api/2/search", base.trim_end_matches('/'));
    let url = Url::parse_with_params(&base, &[("jql", jql), ("maxResults", "0")])
        .map_err(|err| Error::InvalidConfig(format!("JIRA_URL '{}' is not a valid URL: {}", base, err)))?;
    Ok(url.into())
}
