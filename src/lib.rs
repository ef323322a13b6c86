//! infra-plugins: single-shot metrics collectors that print one JSON document per run.

#[macro_use]
extern crate log;

pub mod collectors;
pub mod config;
pub mod http;
pub mod plugin;
pub mod utils;

pub use collectors::{Collector, Error};
pub use config::Env;
pub use plugin::{Inventory, Metric, PluginData};

/// Runs a single collector once and wraps its output into the plugin envelope.
pub fn run(collector: &dyn Collector) -> Result<PluginData, Error> {
    info!("Running collector {}", collector.id());

    let metrics = collector.collect()?;
    debug!("Collector {} produced {} metric records", collector.id(), metrics.len());
    let inventory = collector.inventory()?;

    let mut data = PluginData::new(collector.plugin_name());
    data.metrics = metrics;
    data.inventory = inventory;

    Ok(data)
}
