use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub kafka: KafkaConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_consumer_poll_timeout_ms")]
    pub consumer_poll_timeout_ms: u64,
    /// Start the context with dispatch routed to the fake recorder.
    #[serde(default)]
    pub fake: bool,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            flush_timeout_ms: default_flush_timeout_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
            consumer_poll_timeout_ms: default_consumer_poll_timeout_ms(),
            fake: false,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(env_source())
            .build()?;

        settings.try_deserialize()
    }

    pub fn from_env() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder().add_source(env_source()).build()?;

        settings.try_deserialize()
    }
}

impl KafkaConfig {
    pub fn brokers_string(&self) -> String {
        self.brokers.join(",")
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn consumer_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.consumer_poll_timeout_ms)
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix("KAFKA_COURIER")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("kafka.brokers")
        .try_parsing(true)
}

fn default_brokers() -> Vec<String> {
    vec!["localhost:9092".to_string()]
}

fn default_flush_timeout_ms() -> u64 {
    1000
}

fn default_poll_timeout_ms() -> u64 {
    0
}

fn default_consumer_poll_timeout_ms() -> u64 {
    1000
}
