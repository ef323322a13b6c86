use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;

use crate::collectors::Error;

pub static PROTOCOL_VERSION: &str = "1";
static PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");
static STATUS_OK: &str = "ok";

/// Inventory items, keyed by item name; each item is a flat map of attributes.
pub type Inventory = BTreeMap<String, BTreeMap<String, Value>>;

/// A single flat metric record as consumed by the monitoring agent.
///
/// Every record carries `event_type` and `provider`; everything else is
/// technology specific.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Metric {
    fields: BTreeMap<String, Value>,
}

#[allow(clippy::len_without_is_empty)]
impl Metric {
    pub fn new<T: Into<String>, U: Into<String>>(event_type: T, provider: U) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("event_type".to_string(), Value::String(event_type.into()));
        fields.insert("provider".to_string(), Value::String(provider.into()));
        Metric { fields }
    }

    pub fn set<K: Into<String>, V: Into<Value>>(&mut self, key: K, value: V) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn event_type(&self) -> Option<&str> {
        self.get("event_type").and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// The envelope every plugin prints exactly once per run.
#[derive(Debug, Serialize)]
pub struct PluginData {
    pub name: String,
    pub protocol_version: String,
    pub plugin_version: String,
    pub metrics: Vec<Metric>,
    pub inventory: Inventory,
    pub events: Vec<Value>,
    pub status: String,
}

impl PluginData {
    pub fn new<T: Into<String>>(name: T) -> Self {
        PluginData {
            name: name.into(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            plugin_version: PLUGIN_VERSION.to_string(),
            metrics: Vec::new(),
            inventory: Inventory::new(),
            events: Vec::new(),
            status: STATUS_OK.to_string(),
        }
    }
}

/// Serializes the envelope to `out`, followed by a newline.
pub fn emit<W: Write>(out: &mut W, data: &PluginData, pretty_print: bool) -> Result<(), Error> {
    let json = if pretty_print {
        serde_json::to_string_pretty(data)?
    } else {
        serde_json::to_string(data)?
    };
    writeln!(out, "{}", json)?;
    out.flush()?;

    Ok(())
}
