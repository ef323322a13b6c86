//! Single-shot HTTP GET helper shared by all HTTP based collectors.

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;

use crate::collectors::Error;

#[derive(Debug, Clone)]
struct BasicAuth {
    user: String,
    password: Option<String>,
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    auth: Option<BasicAuth>,
    headers: HeaderMap,
}

impl HttpClient {
    pub fn new() -> Result<HttpClient, Error> {
        let client = Client::builder().use_rustls_tls().build()?;
        Ok(HttpClient { client, auth: None, headers: HeaderMap::new() })
    }

    /// Uses basic auth for every request if `user` is not empty.
    pub fn with_basic_auth(mut self, user: &str, password: &str) -> Self {
        if !user.is_empty() {
            let password = if password.trim().is_empty() { None } else { Some(password.to_string()) };
            self.auth = Some(BasicAuth { user: user.to_string(), password });
        }
        self
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Result<Self, Error> {
        let value = HeaderValue::from_str(value)
            .map_err(|err| Error::InvalidConfig(format!("Invalid value for header {}: {}", name, err)))?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    /// Fetches `url` and returns the body; any status but 200 is an error.
    pub fn get_text(&self, url: &str) -> Result<String, Error> {
        debug!("Fetching {}", url);
        let mut request = self.client.get(url).headers(self.headers.clone());
        if let Some(ref auth) = self.auth {
            request = request.basic_auth(&auth.user, auth.password.as_ref());
        }

        let response = request.send()?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::Status { url: url.to_string(), status: status.as_u16() });
        }
        let body = response.text()?;
        trace!("Response from {}: '{}'", url, body);

        Ok(body)
    }

    pub fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, Error> {
        let body = self.get_text(url)?;
        let value = serde_json::from_str(&body)?;
        Ok(value)
    }
}

/// Joins `host`, `port` and `path` into an `http://` URL.
pub fn http_url(host: &str, port: u16, path: &str) -> String {
    if path.starts_with('/') {
        format!("http://{}:{}{}", host, port, path)
    } else {
        format!("http://{}:{}/{}", host, port, path)
    }
}
