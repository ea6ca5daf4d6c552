pub mod config;
pub mod error;

pub mod kafka;

pub use config::{Config, KafkaConfig};
pub use error::{Error, Result};
pub use kafka::{ConsumerBuilder, FakeRecorder, Kafka, Message, ProducerBuilder, PublishSnapshot};
