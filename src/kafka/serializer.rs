use crate::kafka::message::Message;
use crate::Result;
use serde_json::Value;

pub struct JsonSerializer;

impl JsonSerializer {
    /// Encodes the message body. String bodies go out as their raw UTF-8
    /// bytes, everything else as compact JSON.
    pub fn serialize(message: &Message) -> Result<Vec<u8>> {
        match message.body() {
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            body => serde_json::to_vec(body).map_err(Into::into),
        }
    }
}
