//! The unit of work handed to a producer.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Flat string-to-string header mapping.
pub type Headers = BTreeMap<String, String>;

/// An immutable message: body, routing key, headers and an optional target partition.
///
/// The `with_*` methods consume the message and return a new value, so a
/// message that has been handed to a builder is never changed behind its back.
///
/// # Example
///
/// ```rust
/// use kafka_courier::Message;
/// use serde_json::json;
///
/// let message = Message::new(json!({"order_id": 42}))
///     .with_key("order-42")
///     .with_headers([("source", "checkout")]);
///
/// assert_eq!(message.key(), Some("order-42"));
/// assert_eq!(message.headers()["source"], "checkout");
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    body: Value,
    key: Option<String>,
    #[serde(default)]
    headers: Headers,
    partition: Option<i32>,
}

impl Message {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            ..Self::default()
        }
    }

    /// Builds a message whose body is the JSON form of `body`.
    pub fn from_serializable<T: Serialize + ?Sized>(body: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(body)?))
    }

    pub fn with_body(self, body: Value) -> Self {
        Self { body, ..self }
    }

    pub fn with_key(self, key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..self
        }
    }

    pub fn with_headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..self
        }
    }

    pub fn with_partition(self, partition: i32) -> Self {
        Self {
            partition: Some(partition),
            ..self
        }
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Target partition, `None` leaves the choice to the partitioner.
    pub fn partition(&self) -> Option<i32> {
        self.partition
    }
}

/// Converts a JSON object into [`Headers`].
///
/// Strings are taken as-is, numbers and booleans are stringified. Anything
/// nested (arrays, objects) or null is rejected.
pub fn headers_from_json(value: &Value) -> Result<Headers> {
    let object = value.as_object().ok_or_else(|| {
        Error::Validation(format!("headers must be a JSON object, got {}", value))
    })?;

    let mut headers = Headers::new();
    for (name, value) in object {
        let value = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(Error::Validation(format!(
                    "header '{}' must be a flat string value, got {}",
                    name, other
                )));
            }
        };
        headers.insert(name.clone(), value);
    }

    Ok(headers)
}
