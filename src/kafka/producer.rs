use crate::kafka::message::Headers;
use crate::kafka::options::ConfigOptions;
use crate::{Error, Result};
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{BaseProducer, BaseRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Handle for a topic the backend has agreed to produce to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicHandle {
    name: String,
}

impl TopicHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A fully encoded record ready to be enqueued.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRecord {
    pub topic: TopicHandle,
    pub partition: Option<i32>,
    pub payload: Vec<u8>,
    pub key: Option<String>,
    pub headers: Headers,
}

/// The producer primitives the dispatcher drives, in order:
/// `new_topic`, `produce`, `poll`, `flush`.
#[cfg_attr(test, mockall::automock)]
pub trait ProducerBackend: Send + Sync {
    fn new_topic(&self, name: &str) -> Result<TopicHandle>;

    /// Enqueues the record without waiting for delivery.
    fn produce(&self, record: OutboundRecord) -> Result<()>;

    /// Serves queued delivery callbacks.
    fn poll(&self, timeout: Duration);

    /// Blocks until all outstanding records are acknowledged or the timeout expires.
    fn flush(&self, timeout: Duration) -> std::result::Result<(), RDKafkaErrorCode>;
}

/// The frozen client settings a backend handle is created from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProducerSettings {
    pub options: ConfigOptions,
    pub debug: bool,
}

/// Creates or reuses backend producer handles.
pub trait BackendFactory: Send + Sync {
    fn producer(&self, settings: &ProducerSettings) -> Result<Arc<dyn ProducerBackend>>;
}

impl<F> BackendFactory for F
where
    F: Fn(&ProducerSettings) -> Result<Arc<dyn ProducerBackend>> + Send + Sync,
{
    fn producer(&self, settings: &ProducerSettings) -> Result<Arc<dyn ProducerBackend>> {
        self(settings)
    }
}

/// [`ProducerBackend`] over an rdkafka [`BaseProducer`].
pub struct RdKafkaProducer {
    producer: BaseProducer,
    topics: Mutex<HashSet<String>>,
}

impl RdKafkaProducer {
    pub fn new(settings: &ProducerSettings) -> Result<Self> {
        let producer: BaseProducer = settings
            .options
            .to_client_config(settings.debug)
            .create()
            .map_err(Error::Kafka)?;

        info!(
            options = settings.options.len(),
            debug = settings.debug,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            topics: Mutex::new(HashSet::new()),
        })
    }
}

impl ProducerBackend for RdKafkaProducer {
    fn new_topic(&self, name: &str) -> Result<TopicHandle> {
        if name.is_empty() {
            return Err(Error::Validation("topic must not be empty".to_string()));
        }

        let mut topics = self
            .topics
            .lock()
            .map_err(|_| Error::InternalConsistency("topic cache lock poisoned".to_string()))?;
        if topics.insert(name.to_string()) {
            debug!("Topic '{}' registered with producer", name);
        }

        Ok(TopicHandle::new(name))
    }

    fn produce(&self, record: OutboundRecord) -> Result<()> {
        let headers = record
            .headers
            .iter()
            .fold(OwnedHeaders::new(), |headers, (key, value)| {
                headers.insert(Header {
                    key: key.as_str(),
                    value: Some(value.as_str()),
                })
            });

        let mut base = BaseRecord::<str, [u8]>::to(record.topic.name())
            .payload(record.payload.as_slice())
            .headers(headers);
        if let Some(key) = record.key.as_deref() {
            base = base.key(key);
        }
        if let Some(partition) = record.partition {
            base = base.partition(partition);
        }

        self.producer.send(base).map_err(|(e, _)| Error::Kafka(e))
    }

    fn poll(&self, timeout: Duration) {
        self.producer.poll(timeout);
    }

    fn flush(&self, timeout: Duration) -> std::result::Result<(), RDKafkaErrorCode> {
        self.producer.flush(timeout).map_err(|e| match e {
            KafkaError::Flush(code) => code,
            other => other.rdkafka_error_code().unwrap_or(RDKafkaErrorCode::Fail),
        })
    }
}

/// Builds rdkafka producers and keeps one per distinct settings value, so
/// repeated sends with the same configuration share a connection.
///
/// The cache is never pruned on its own: every distinct (options, debug)
/// pair keeps a live producer and its broker connections until
/// [`clear`](Self::clear) is called or the factory is dropped.
#[derive(Default)]
pub struct RdKafkaFactory {
    producers: Mutex<HashMap<ProducerSettings, Arc<RdKafkaProducer>>>,
}

impl RdKafkaFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of producer handles currently cached.
    pub fn cached(&self) -> usize {
        self.cache().len()
    }

    /// Drops every cached handle. Handles still held by callers stay open
    /// until they are released.
    pub fn clear(&self) {
        let released = {
            let mut producers = self.cache();
            let released = producers.len();
            producers.clear();
            released
        };
        debug!(released, "Cleared cached Kafka producers");
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<ProducerSettings, Arc<RdKafkaProducer>>> {
        self.producers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl BackendFactory for RdKafkaFactory {
    fn producer(&self, settings: &ProducerSettings) -> Result<Arc<dyn ProducerBackend>> {
        let mut producers = self.cache();

        if let Some(existing) = producers.get(settings) {
            debug!("Reusing cached Kafka producer");
            return Ok(existing.clone());
        }

        let producer = Arc::new(RdKafkaProducer::new(settings)?);
        producers.insert(settings.clone(), producer.clone());
        Ok(producer)
    }
}
