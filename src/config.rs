use std::collections::HashMap;
use std::env;

use crate::collectors::Error;

/// A snapshot of the environment variables a collector reads its configuration from.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: HashMap<String, String>,
}

impl Env {
    /// Captures the environment of the current process.
    pub fn from_process() -> Env {
        Env::from_pairs(env::vars())
    }

    /// Builds an environment from explicit key value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Env
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Env { vars }
    }

    /// Returns the trimmed value of `key`; unset variables read as empty.
    pub fn get(&self, key: &str) -> String {
        self.vars.get(key).map(|v| v.trim().to_string()).unwrap_or_default()
    }

    /// Returns the value of `key` exactly as set, for passwords and tokens.
    pub fn get_secret(&self, key: &str) -> String {
        self.vars.get(key).cloned().unwrap_or_default()
    }

    /// Returns the value of `key` or `default` if it is unset or empty.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        let value = self.get(key);
        if value.is_empty() {
            default.to_string()
        } else {
            value
        }
    }
}

/// Checks that every required variable holds a value.
///
/// All empty variables are reported at once, in the given order.
pub fn require(fields: &[(&str, &str)]) -> Result<(), Error> {
    let missing: Vec<String> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingConfig(missing))
    }
}

/// Parses a port number held by the variable `name`.
pub fn parse_port(name: &str, value: &str) -> Result<u16, Error> {
    value
        .parse::<u16>()
        .map_err(|err| Error::InvalidConfig(format!("{} must be a port number, but is '{}': {}", name, value, err)))
}

/// Prints secrets in `Debug` output as a fixed mask.
pub fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        "''"
    } else {
        "****"
    }
}
