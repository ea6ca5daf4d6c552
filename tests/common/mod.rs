#![allow(dead_code)]

use kafka_courier::kafka::{OutboundRecord, ProducerBackend, ProducerSettings, TopicHandle};
use kafka_courier::{Kafka, KafkaConfig, Result};
use rdkafka::types::RDKafkaErrorCode;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One call made against the stub backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    NewTopic(String),
    Produce(OutboundRecord),
    Poll(Duration),
    Flush(Duration),
}

/// Producer backend that remembers every call and answers `flush` with a
/// fixed result.
pub struct StubBackend {
    calls: Mutex<Vec<BackendCall>>,
    flush_result: std::result::Result<(), RDKafkaErrorCode>,
}

impl StubBackend {
    pub fn succeeding() -> Arc<Self> {
        Self::with_flush(Ok(()))
    }

    pub fn with_flush(flush_result: std::result::Result<(), RDKafkaErrorCode>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            flush_result,
        })
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn produced(&self) -> Vec<OutboundRecord> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Produce(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    fn push(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ProducerBackend for StubBackend {
    fn new_topic(&self, name: &str) -> Result<TopicHandle> {
        self.push(BackendCall::NewTopic(name.to_string()));
        Ok(TopicHandle::new(name))
    }

    fn produce(&self, record: OutboundRecord) -> Result<()> {
        self.push(BackendCall::Produce(record));
        Ok(())
    }

    fn poll(&self, timeout: Duration) {
        self.push(BackendCall::Poll(timeout));
    }

    fn flush(&self, timeout: Duration) -> std::result::Result<(), RDKafkaErrorCode> {
        self.push(BackendCall::Flush(timeout));
        self.flush_result
    }
}

/// Get test configuration, honouring TEST_KAFKA_BROKERS when set
pub fn get_test_config() -> KafkaConfig {
    KafkaConfig {
        brokers: env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        flush_timeout_ms: 100,
        poll_timeout_ms: 0,
        consumer_poll_timeout_ms: 100,
        fake: false,
    }
}

/// A live-mode context whose every producer handle is `backend`.
pub fn kafka_with_stub(backend: Arc<StubBackend>) -> Kafka {
    Kafka::with_backend(
        get_test_config(),
        move |_: &ProducerSettings| -> Result<Arc<dyn ProducerBackend>> { Ok(backend.clone()) },
    )
}
