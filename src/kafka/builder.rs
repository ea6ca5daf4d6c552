use crate::kafka::dispatch::{Dispatch, PublishSnapshot};
use crate::kafka::message::{headers_from_json, Headers, Message};
use crate::kafka::options::ConfigOptions;
use crate::{Error, Result};
use chrono::Utc;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument};

/// Fluent builder for a single message bound to one broker and topic.
///
/// Created by [`Kafka::publish_on`](crate::Kafka::publish_on). Every `with_*`
/// call overrides whatever an earlier call set, [`with_message`](Self::with_message)
/// included.
///
/// The body starts out as JSON `null`. Sending without setting one publishes
/// the four-byte payload `null`, not an empty record.
pub struct ProducerBuilder {
    broker: String,
    topic: String,
    message: Message,
    options: ConfigOptions,
    debug: bool,
    dispatcher: Arc<dyn Dispatch>,
}

impl ProducerBuilder {
    pub(crate) fn new(
        broker: impl Into<String>,
        topic: impl Into<String>,
        dispatcher: Arc<dyn Dispatch>,
    ) -> Result<Self> {
        let broker = broker.into();
        let topic = topic.into();

        if broker.trim().is_empty() {
            return Err(Error::Validation("broker must not be empty".to_string()));
        }
        if topic.trim().is_empty() {
            return Err(Error::Validation("topic must not be empty".to_string()));
        }

        Ok(Self {
            broker,
            topic,
            message: Message::default(),
            options: ConfigOptions::new(),
            debug: false,
            dispatcher,
        })
    }

    pub fn with_config_options<I, K, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.options.merge(options);
        self
    }

    pub fn with_config_option(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.options.set(name, value);
        self
    }

    /// Sets the routing key. Same as [`with_message_key`](Self::with_message_key).
    pub fn with_kafka_key(self, key: impl Into<String>) -> Self {
        self.with_message_key(key)
    }

    pub fn with_message_key(mut self, key: impl Into<String>) -> Self {
        self.message = self.message.with_key(key);
        self
    }

    /// Replaces the headers of the message being built.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.message = self.message.with_headers(headers);
        self
    }

    /// Replaces the headers from a JSON object, rejecting nested values.
    pub fn with_headers_json(mut self, headers: &Value) -> Result<Self> {
        let headers: Headers = headers_from_json(headers)?;
        self.message = self.message.with_headers(headers);
        Ok(self)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.message = self.message.with_body(body);
        self
    }

    /// Sets one field of the body. A body that is not a JSON object is
    /// replaced by an object first.
    pub fn with_body_key(self, field: impl Into<String>, value: Value) -> Self {
        let mut body = match self.message.body() {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        body.insert(field.into(), value);
        self.with_body(Value::Object(body))
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.message = self.message.with_partition(partition);
        self
    }

    /// Adopts a pre-built message, replacing key, headers, body and partition.
    pub fn with_message(mut self, message: Message) -> Self {
        self.message = message;
        self
    }

    /// Turns on librdkafka's verbose diagnostics for the live backend.
    pub fn with_debug_enabled(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn broker(&self) -> &str {
        &self.broker
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn options(&self) -> &ConfigOptions {
        &self.options
    }

    pub fn is_debug_enabled(&self) -> bool {
        self.debug
    }

    /// Freezes the builder state into what would be dispatched right now.
    pub fn snapshot(&self) -> PublishSnapshot {
        PublishSnapshot {
            topic: self.topic.clone(),
            broker: self.broker.clone(),
            message: self.message.clone(),
            options: self.options.resolve_for(&self.broker),
            debug: self.debug,
            recorded_at: Utc::now(),
        }
    }

    /// Dispatches the message once. Calling `send` again dispatches again.
    #[instrument(skip(self), fields(topic = %self.topic, broker = %self.broker))]
    pub fn send(&self) -> Result<()> {
        let snapshot = self.snapshot();
        self.dispatcher.dispatch(&snapshot)?;

        info!(
            key = snapshot.message.key().unwrap_or_default(),
            debug = snapshot.debug,
            "Message published"
        );
        Ok(())
    }
}

impl fmt::Debug for ProducerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerBuilder")
            .field("broker", &self.broker)
            .field("topic", &self.topic)
            .field("message", &self.message)
            .field("options", &self.options)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}
