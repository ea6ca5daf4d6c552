use rdkafka::config::RDKafkaLogLevel;
use rdkafka::ClientConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// librdkafka option that carries the bootstrap broker list.
pub const BROKER_LIST_OPTION: &str = "metadata.broker.list";

/// Backend option names mapped to their values.
///
/// Options pass through to librdkafka verbatim. Setting the same name twice
/// keeps the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigOptions(BTreeMap<String, String>);

impl ConfigOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl ToString) {
        self.0.insert(name.into(), value.to_string());
    }

    /// Merges `options` into this set, overwriting names that already exist.
    pub fn merge<I, K, V>(&mut self, options: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        for (name, value) in options {
            self.set(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The set handed to the backend: the broker list first, then these
    /// options on top so callers can still override it.
    pub fn resolve_for(&self, broker: &str) -> ConfigOptions {
        let mut resolved = ConfigOptions::new();
        resolved.set(BROKER_LIST_OPTION, broker);
        resolved.merge(self.iter());
        resolved
    }

    pub fn to_client_config(&self, debug: bool) -> ClientConfig {
        let mut client = ClientConfig::new();
        for (name, value) in self.iter() {
            client.set(name, value);
        }
        if debug {
            client.set("debug", "all");
            client.set_log_level(RDKafkaLogLevel::Debug);
        }
        client
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for ConfigOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = ConfigOptions::new();
        options.merge(iter);
        options
    }
}
