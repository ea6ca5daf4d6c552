//! Error types and result handling for kafka-courier.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use kafka_courier::{Error, Kafka, KafkaConfig};
//!
//! let kafka = Kafka::new(KafkaConfig::default());
//!
//! match kafka.publish_on("", "orders") {
//!     Ok(_) => println!("Builder ready"),
//!     Err(Error::Validation(msg)) => eprintln!("Rejected: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use rdkafka::types::RDKafkaErrorCode;
use thiserror::Error;

/// The main error type for kafka-courier operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input to a builder method, raised at the offending call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The broker did not acknowledge the message within the flush window.
    #[error("Delivery failed: {code}")]
    Delivery {
        /// Raw error code reported by librdkafka
        code: RDKafkaErrorCode,
    },

    /// The fake recorder was asked to record while disabled.
    ///
    /// This points at a dispatch bug and is never retried.
    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),

    /// Kafka client creation or enqueue error.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// JSON serialization error when encoding message bodies.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Returns the librdkafka error code when the error originated in the backend.
    pub fn kafka_code(&self) -> Option<RDKafkaErrorCode> {
        match self {
            Error::Delivery { code } => Some(*code),
            Error::Kafka(e) => e.rdkafka_error_code(),
            _ => None,
        }
    }
}

/// A convenient Result type alias for kafka-courier operations.
///
/// This is equivalent to `std::result::Result<T, kafka_courier::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
