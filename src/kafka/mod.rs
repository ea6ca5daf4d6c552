pub mod builder;
pub mod consumer;
pub mod context;
pub mod dispatch;
pub mod fake;
pub mod message;
pub mod options;
pub mod producer;
pub mod serializer;

#[cfg(test)]
mod tests;

pub use builder::ProducerBuilder;
pub use consumer::{ConsumedMessage, ConsumerBuilder, KafkaConsumer};
pub use context::Kafka;
pub use dispatch::{Dispatch, LiveDispatcher, PublishSnapshot};
pub use fake::FakeRecorder;
pub use message::{headers_from_json, Headers, Message};
pub use options::{ConfigOptions, BROKER_LIST_OPTION};
pub use producer::{
    BackendFactory, OutboundRecord, ProducerBackend, ProducerSettings, RdKafkaFactory,
    RdKafkaProducer, TopicHandle,
};
pub use serializer::JsonSerializer;
