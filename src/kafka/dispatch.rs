use crate::kafka::message::Message;
use crate::kafka::options::ConfigOptions;
use crate::kafka::producer::{BackendFactory, OutboundRecord, ProducerSettings};
use crate::kafka::serializer::JsonSerializer;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Everything a builder resolved at the moment `send` was called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishSnapshot {
    pub topic: String,
    pub broker: String,
    pub message: Message,
    /// Resolved options, including the injected broker list.
    pub options: ConfigOptions,
    pub debug: bool,
    pub recorded_at: DateTime<Utc>,
}

impl PublishSnapshot {
    pub fn producer_settings(&self) -> ProducerSettings {
        ProducerSettings {
            options: self.options.clone(),
            debug: self.debug,
        }
    }
}

/// Destination of a resolved publish attempt.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, snapshot: &PublishSnapshot) -> Result<()>;
}

/// Sends snapshots through a real producer backend.
pub struct LiveDispatcher {
    factory: Box<dyn BackendFactory>,
    poll_timeout: Duration,
    flush_timeout: Duration,
}

impl LiveDispatcher {
    pub fn new(
        factory: impl BackendFactory + 'static,
        poll_timeout: Duration,
        flush_timeout: Duration,
    ) -> Self {
        Self {
            factory: Box::new(factory),
            poll_timeout,
            flush_timeout,
        }
    }
}

impl Dispatch for LiveDispatcher {
    #[instrument(skip_all, fields(topic = %snapshot.topic, broker = %snapshot.broker))]
    fn dispatch(&self, snapshot: &PublishSnapshot) -> Result<()> {
        let backend = self.factory.producer(&snapshot.producer_settings())?;
        let topic = backend.new_topic(&snapshot.topic)?;

        let record = OutboundRecord {
            topic,
            partition: snapshot.message.partition(),
            payload: JsonSerializer::serialize(&snapshot.message)?,
            key: snapshot.message.key().map(str::to_string),
            headers: snapshot.message.headers().clone(),
        };
        backend.produce(record)?;
        backend.poll(self.poll_timeout);

        match backend.flush(self.flush_timeout) {
            Ok(()) => {
                debug!("Message delivered");
                Ok(())
            }
            Err(code) => {
                warn!(%code, "Flush reported outstanding messages");
                Err(Error::Delivery { code })
            }
        }
    }
}
