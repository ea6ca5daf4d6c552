use crate::kafka::options::ConfigOptions;
use crate::{Error, Result};
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Headers as _, Message as _};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const DEFAULT_GROUP_ID: &str = "group";
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Accumulates consumer settings. Nothing touches the network until
/// [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct ConsumerBuilder {
    broker: String,
    topics: Vec<String>,
    group_id: String,
    options: ConfigOptions,
    auto_commit: bool,
    max_messages: Option<u64>,
    poll_timeout: Duration,
    debug: bool,
}

impl ConsumerBuilder {
    pub(crate) fn new<I, T>(broker: impl Into<String>, topics: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let broker = broker.into();
        if broker.trim().is_empty() {
            return Err(Error::Validation("broker must not be empty".to_string()));
        }

        let mut unique = Vec::new();
        for topic in topics {
            let topic = topic.into();
            if topic.trim().is_empty() {
                return Err(Error::Validation("topic names must not be empty".to_string()));
            }
            if !unique.contains(&topic) {
                unique.push(topic);
            }
        }
        if unique.is_empty() {
            return Err(Error::Validation("at least one topic is required".to_string()));
        }

        Ok(Self {
            broker,
            topics: unique,
            group_id: DEFAULT_GROUP_ID.to_string(),
            options: ConfigOptions::new(),
            auto_commit: true,
            max_messages: None,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            debug: false,
        })
    }

    pub fn with_consumer_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    pub fn with_auto_commit(mut self, enabled: bool) -> Self {
        self.auto_commit = enabled;
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.options.set(name, value);
        self
    }

    pub fn with_options<I, K, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.options.merge(options);
        self
    }

    /// Stop consuming after this many handled messages.
    pub fn with_max_messages(mut self, max: u64) -> Self {
        self.max_messages = Some(max);
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn with_debug_enabled(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn broker(&self) -> &str {
        &self.broker
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn options(&self) -> &ConfigOptions {
        &self.options
    }

    pub fn is_auto_commit(&self) -> bool {
        self.auto_commit
    }

    pub fn max_messages(&self) -> Option<u64> {
        self.max_messages
    }

    /// Client options in the order they are applied: defaults, then caller overrides.
    ///
    /// With auto-commit on, offsets are stored by the consume loop only after
    /// the handler succeeds, so the periodic commit never covers a message
    /// whose handler failed.
    pub fn resolved_options(&self) -> ConfigOptions {
        let mut defaults = ConfigOptions::new();
        defaults.set("group.id", &self.group_id);
        defaults.set("enable.auto.commit", self.auto_commit);
        if self.auto_commit {
            defaults.set("enable.auto.offset.store", false);
        }
        defaults.set("auto.offset.reset", "latest");
        defaults.merge(self.options.iter());
        defaults.resolve_for(&self.broker)
    }

    /// Creates the consumer and subscribes it to the topics.
    pub fn build(self) -> Result<KafkaConsumer> {
        let consumer: BaseConsumer = self
            .resolved_options()
            .to_client_config(self.debug)
            .create()?;

        let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topics)?;

        info!(
            broker = %self.broker,
            topics = ?self.topics,
            group_id = %self.group_id,
            "Kafka consumer subscribed"
        );

        Ok(KafkaConsumer {
            consumer,
            auto_commit: self.auto_commit,
            max_messages: self.max_messages,
            poll_timeout: self.poll_timeout,
            stopped: AtomicBool::new(false),
        })
    }
}

/// A message received from the broker, detached from the client buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumedMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub headers: BTreeMap<String, String>,
}

impl ConsumedMessage {
    fn from_borrowed(message: &BorrowedMessage<'_>) -> Self {
        let headers: BTreeMap<String, String> = message
            .headers()
            .map(|headers| {
                headers
                    .iter()
                    .map(|h| {
                        let value = h
                            .value
                            .map(|v| String::from_utf8_lossy(v).into_owned())
                            .unwrap_or_default();
                        (h.key.to_string(), value)
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().unwrap_or_default().to_vec(),
            headers,
        }
    }

    pub fn key_str(&self) -> Option<&str> {
        self.key.as_deref().and_then(|k| std::str::from_utf8(k).ok())
    }

    /// Decodes the payload as JSON.
    pub fn body(&self) -> Result<serde_json::Value> {
        serde_json::from_slice(&self.payload).map_err(Into::into)
    }
}

/// A subscribed consumer.
pub struct KafkaConsumer {
    consumer: BaseConsumer,
    auto_commit: bool,
    max_messages: Option<u64>,
    poll_timeout: Duration,
    stopped: AtomicBool,
}

impl KafkaConsumer {
    /// Polls and hands every message to `handler` until `max_messages` have
    /// been handled or [`stop`](Self::stop) is called. Returns how many
    /// messages were handled.
    ///
    /// A handler error ends the loop and that message's offset is neither
    /// stored nor committed, so the group resumes from it. Overriding
    /// `enable.auto.offset.store` through the options gives that up.
    #[instrument(skip_all)]
    pub fn consume<F>(&self, mut handler: F) -> Result<u64>
    where
        F: FnMut(&ConsumedMessage) -> Result<()>,
    {
        let mut handled = 0u64;

        while !self.stopped.load(Ordering::SeqCst) {
            if self.max_messages.is_some_and(|max| handled >= max) {
                break;
            }

            let message = match self.consumer.poll(self.poll_timeout) {
                None => continue,
                Some(Err(KafkaError::PartitionEOF(partition))) => {
                    debug!(partition, "Reached end of partition");
                    continue;
                }
                Some(Err(e)) => {
                    warn!("Consumer poll failed: {}", e);
                    return Err(Error::Kafka(e));
                }
                Some(Ok(message)) => message,
            };

            let consumed = ConsumedMessage::from_borrowed(&message);
            handler(&consumed)?;

            if self.auto_commit {
                self.consumer.store_offset_from_message(&message)?;
            } else {
                self.consumer.commit_message(&message, CommitMode::Sync)?;
            }
            handled += 1;
        }

        info!(handled, "Consumer loop finished");
        Ok(handled)
    }

    /// Ends the consume loop after the message in flight.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}
