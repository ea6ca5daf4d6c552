//! The entry point applications hold on to.
//!
//! A [`Kafka`] value decides where builders send: a live backend or the
//! [`FakeRecorder`]. Each builder captures the destination that was active
//! when it was created.

use crate::config::KafkaConfig;
use crate::kafka::builder::ProducerBuilder;
use crate::kafka::consumer::ConsumerBuilder;
use crate::kafka::dispatch::{Dispatch, LiveDispatcher};
use crate::kafka::fake::FakeRecorder;
use crate::kafka::producer::{BackendFactory, RdKafkaFactory};
use crate::Result;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::info;

struct ContextState {
    live: Arc<dyn Dispatch>,
    recorder: FakeRecorder,
    active: RwLock<Arc<dyn Dispatch>>,
    consumer_poll_timeout: Duration,
}

/// Producer and consumer entry point.
///
/// Cloning is cheap and every clone shares the same mode and recorder.
///
/// # Example
///
/// ```rust,no_run
/// use kafka_courier::{Kafka, KafkaConfig};
///
/// let kafka = Kafka::new(KafkaConfig::default());
///
/// kafka
///     .publish_on("localhost:9092", "orders")?
///     .with_config_options([("acks", "all")])
///     .with_kafka_key("order-1")
///     .with_headers([("source", "checkout")])
///     .send()?;
/// # Ok::<(), kafka_courier::Error>(())
/// ```
#[derive(Clone)]
pub struct Kafka {
    state: Arc<ContextState>,
}

impl Kafka {
    /// Live mode over rdkafka, or fake mode when `config.fake` is set.
    pub fn new(config: KafkaConfig) -> Self {
        Self::with_backend(config, RdKafkaFactory::new())
    }

    /// Like [`Kafka::new`] but producing through `factory`.
    pub fn with_backend(config: KafkaConfig, factory: impl BackendFactory + 'static) -> Self {
        let live: Arc<dyn Dispatch> = Arc::new(LiveDispatcher::new(
            factory,
            config.poll_timeout(),
            config.flush_timeout(),
        ));

        let kafka = Self {
            state: Arc::new(ContextState {
                live: live.clone(),
                recorder: FakeRecorder::new(),
                active: RwLock::new(live),
                consumer_poll_timeout: config.consumer_poll_timeout(),
            }),
        };

        if config.fake {
            kafka.fake();
        }
        kafka
    }

    /// Routes builders created from now on to the recorder.
    pub fn fake(&self) -> FakeRecorder {
        let recorder = self.state.recorder.clone();
        recorder.enable();
        *self.active_mut() = recorder.dispatcher();
        info!("Kafka fake mode enabled");
        recorder
    }

    /// Routes builders created from now on back to the live backend.
    ///
    /// Builders created while faking stay bound to that fake session and fail
    /// with [`Error::InternalConsistency`](crate::Error::InternalConsistency)
    /// on `send`, including after a later [`fake`](Self::fake).
    pub fn disable_fake(&self) {
        self.state.recorder.disable();
        *self.active_mut() = self.state.live.clone();
        info!("Kafka fake mode disabled");
    }

    pub fn is_fake(&self) -> bool {
        self.state.recorder.is_enabled()
    }

    pub fn recorder(&self) -> &FakeRecorder {
        &self.state.recorder
    }

    /// Starts a message for `topic` on `broker`, bound to the current mode.
    /// The body defaults to JSON `null` until one is set.
    pub fn publish_on(
        &self,
        broker: impl Into<String>,
        topic: impl Into<String>,
    ) -> Result<ProducerBuilder> {
        let dispatcher = self
            .state
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        ProducerBuilder::new(broker, topic, dispatcher)
    }

    /// Validates the inputs and returns an unconnected consumer builder.
    pub fn create_consumer<I, T>(
        &self,
        broker: impl Into<String>,
        topics: I,
    ) -> Result<ConsumerBuilder>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let builder = ConsumerBuilder::new(broker, topics)?;
        Ok(builder.with_poll_timeout(self.state.consumer_poll_timeout))
    }

    fn active_mut(&self) -> std::sync::RwLockWriteGuard<'_, Arc<dyn Dispatch>> {
        self.state
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
