use super::producer::MockProducerBackend;
use super::*;
use crate::config::KafkaConfig;
use crate::Error;
use rdkafka::types::RDKafkaErrorCode;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn create_test_kafka_config() -> KafkaConfig {
    KafkaConfig {
        brokers: vec!["localhost:9092".to_string()],
        flush_timeout_ms: 50,
        poll_timeout_ms: 0,
        consumer_poll_timeout_ms: 50,
        fake: false,
    }
}

fn kafka_with(mock: MockProducerBackend) -> Kafka {
    let backend: Arc<dyn ProducerBackend> = Arc::new(mock);
    Kafka::with_backend(
        create_test_kafka_config(),
        move |_: &ProducerSettings| -> crate::Result<Arc<dyn ProducerBackend>> {
            Ok(backend.clone())
        },
    )
}

fn untouched_backend() -> MockProducerBackend {
    let mut mock = MockProducerBackend::new();
    mock.expect_new_topic().never();
    mock.expect_produce().never();
    mock.expect_poll().never();
    mock.expect_flush().never();
    mock
}

fn accepting_backend(flush: Result<(), RDKafkaErrorCode>) -> MockProducerBackend {
    let mut mock = MockProducerBackend::new();
    mock.expect_new_topic()
        .withf(|name| name == "test-topic")
        .times(1)
        .returning(|name| Ok(TopicHandle::new(name)));
    mock.expect_produce()
        .withf(|record| {
            record.topic.name() == "test-topic"
                && record.key.as_deref() == Some("k")
                && record.headers.get("h").map(String::as_str) == Some("v")
        })
        .times(1)
        .returning(|_| Ok(()));
    mock.expect_poll().times(1..).return_const(());
    mock.expect_flush().times(1).return_const(flush);
    mock
}

#[test]
fn test_live_send_drives_backend_in_order() {
    let kafka = kafka_with(accepting_backend(Ok(())));

    let result = kafka
        .publish_on("localhost:9092", "test-topic")
        .unwrap()
        .with_config_options([("metadata.broker.list", "broker")])
        .with_message_key("k")
        .with_headers([("h", "v")])
        .with_debug_enabled(true)
        .send();

    assert!(result.is_ok());
    kafka.recorder().assert_nothing_published();
}

#[test]
fn test_live_flush_failure_is_delivery_error() {
    let kafka = kafka_with(accepting_backend(Err(RDKafkaErrorCode::MessageTimedOut)));

    let result = kafka
        .publish_on("localhost:9092", "test-topic")
        .unwrap()
        .with_config_options([("metadata.broker.list", "broker")])
        .with_message_key("k")
        .with_headers([("h", "v")])
        .send();

    match result {
        Err(Error::Delivery { code }) => assert_eq!(code, RDKafkaErrorCode::MessageTimedOut),
        other => panic!("expected delivery error, got {:?}", other),
    }
    kafka.recorder().assert_nothing_published();
}

#[test]
fn test_produce_failure_skips_flush() {
    let mut mock = MockProducerBackend::new();
    mock.expect_new_topic()
        .times(1)
        .returning(|name| Ok(TopicHandle::new(name)));
    mock.expect_produce().times(1).returning(|_| {
        Err(Error::Kafka(rdkafka::error::KafkaError::MessageProduction(
            RDKafkaErrorCode::QueueFull,
        )))
    });
    mock.expect_poll().never();
    mock.expect_flush().never();
    let kafka = kafka_with(mock);

    let err = kafka
        .publish_on("localhost:9092", "test-topic")
        .unwrap()
        .send()
        .unwrap_err();

    assert_eq!(err.kafka_code(), Some(RDKafkaErrorCode::QueueFull));
}

#[test]
fn test_fake_send_never_reaches_backend() {
    let kafka = kafka_with(untouched_backend());
    let recorder = kafka.fake();

    let result = kafka
        .publish_on("localhost:9092", "test-topic")
        .unwrap()
        .with_config_options([("metadata.broker.list", "broker")])
        .with_kafka_key("uuid-like-key")
        .with_message_key("k")
        .with_headers([("h", "v")])
        .with_debug_enabled(true)
        .send();

    assert!(result.is_ok());
    assert_eq!(recorder.count(), 1);

    let snapshot = recorder.all().next().unwrap();
    assert_eq!(snapshot.topic, "test-topic");
    assert_eq!(snapshot.broker, "localhost:9092");
    assert_eq!(snapshot.message.key(), Some("k"));
    assert_eq!(snapshot.message.headers().len(), 1);
    assert_eq!(snapshot.message.headers()["h"], "v");
    assert_eq!(snapshot.options.get("metadata.broker.list"), Some("broker"));
    assert!(snapshot.debug);
}

#[test]
fn test_with_message_wins_over_earlier_fields() {
    let message = Message::new(json!({"foo": "bar"}))
        .with_headers([("foo", "bar")])
        .with_key("message-key");

    let mut mock = MockProducerBackend::new();
    mock.expect_new_topic()
        .times(1)
        .returning(|name| Ok(TopicHandle::new(name)));
    mock.expect_produce()
        .withf(|record| {
            record.key.as_deref() == Some("message-key")
                && record.headers.len() == 1
                && record.headers.get("foo").map(String::as_str) == Some("bar")
                && record.payload == br#"{"foo":"bar"}"#.to_vec()
                && record.partition.is_none()
        })
        .times(1)
        .returning(|_| Ok(()));
    mock.expect_poll().return_const(());
    mock.expect_flush().times(1).return_const(Ok(()));
    let kafka = kafka_with(mock);

    kafka
        .publish_on("localhost:9092", "test-topic")
        .unwrap()
        .with_kafka_key("discarded")
        .with_headers([("discarded", "header")])
        .with_message(message)
        .with_debug_enabled(false)
        .send()
        .unwrap();
}

#[test]
fn test_factory_receives_resolved_settings() {
    let seen: Arc<Mutex<Vec<ProducerSettings>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = seen.clone();

    let mut mock = MockProducerBackend::new();
    mock.expect_new_topic()
        .returning(|name| Ok(TopicHandle::new(name)));
    mock.expect_produce().returning(|_| Ok(()));
    mock.expect_poll().return_const(());
    mock.expect_flush().return_const(Ok(()));
    let backend: Arc<dyn ProducerBackend> = Arc::new(mock);

    let kafka = Kafka::with_backend(
        create_test_kafka_config(),
        move |settings: &ProducerSettings| -> crate::Result<Arc<dyn ProducerBackend>> {
            captured.lock().unwrap().push(settings.clone());
            Ok(backend.clone())
        },
    );

    kafka
        .publish_on("localhost:9092", "test-topic")
        .unwrap()
        .with_config_options([("acks", "1"), ("linger.ms", "5")])
        .with_config_options([("acks", "all")])
        .with_debug_enabled(true)
        .send()
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].debug);
    assert_eq!(seen[0].options.get(BROKER_LIST_OPTION), Some("localhost:9092"));
    assert_eq!(seen[0].options.get("acks"), Some("all"));
    assert_eq!(seen[0].options.get("linger.ms"), Some("5"));
}

#[test]
fn test_sending_twice_dispatches_twice() {
    let kafka = kafka_with(untouched_backend());
    let recorder = kafka.fake();

    let builder = kafka
        .publish_on("localhost:9092", "test-topic")
        .unwrap()
        .with_body(json!({"n": 1}));
    builder.send().unwrap();
    builder.send().unwrap();

    recorder.assert_published_times(|s| s.message.body() == &json!({"n": 1}), 2);
}

#[test]
fn test_builder_created_while_faking_fails_after_disable() {
    let kafka = kafka_with(accepting_backend(Ok(())));
    kafka.fake();
    let stale = kafka.publish_on("localhost:9092", "test-topic").unwrap();

    kafka.disable_fake();
    assert!(!kafka.is_fake());

    let err = stale.send().unwrap_err();
    assert!(matches!(err, Error::InternalConsistency(_)));

    kafka
        .publish_on("localhost:9092", "test-topic")
        .unwrap()
        .with_message_key("k")
        .with_headers([("h", "v")])
        .send()
        .unwrap();
    kafka.recorder().assert_nothing_published();
}

#[test]
fn test_stale_builder_rejected_after_faking_again() {
    let kafka = kafka_with(untouched_backend());
    kafka.fake();
    let stale = kafka.publish_on("localhost:9092", "test-topic").unwrap();

    kafka.disable_fake();
    let recorder = kafka.fake();

    let err = stale.send().unwrap_err();
    assert!(matches!(err, Error::InternalConsistency(_)));
    recorder.assert_nothing_published();

    kafka
        .publish_on("localhost:9092", "test-topic")
        .unwrap()
        .send()
        .unwrap();
    assert_eq!(recorder.count(), 1);
}

#[test]
fn test_send_without_body_publishes_json_null() {
    let mut mock = MockProducerBackend::new();
    mock.expect_new_topic()
        .times(1)
        .returning(|name| Ok(TopicHandle::new(name)));
    mock.expect_produce()
        .withf(|record| record.payload == b"null".to_vec())
        .times(1)
        .returning(|_| Ok(()));
    mock.expect_poll().return_const(());
    mock.expect_flush().times(1).return_const(Ok(()));
    let kafka = kafka_with(mock);

    let builder = kafka.publish_on("localhost:9092", "test-topic").unwrap();
    assert!(builder.message().body().is_null());
    builder.send().unwrap();
}

#[test]
fn test_fake_mode_from_config() {
    let config = KafkaConfig {
        fake: true,
        ..create_test_kafka_config()
    };
    let kafka = Kafka::with_backend(
        config,
        |_: &ProducerSettings| -> crate::Result<Arc<dyn ProducerBackend>> {
            panic!("backend must not be created in fake mode")
        },
    );

    assert!(kafka.is_fake());
    kafka
        .publish_on("localhost:9092", "test-topic")
        .unwrap()
        .send()
        .unwrap();
    assert_eq!(kafka.recorder().count(), 1);
}

#[test]
fn test_create_consumer_does_not_dispatch() {
    let kafka = kafka_with(untouched_backend());

    let consumer = kafka.create_consumer("broker", ["topic"]).unwrap();

    assert_eq!(consumer.broker(), "broker");
    assert_eq!(consumer.topics(), &["topic".to_string()]);
    kafka.recorder().assert_nothing_published();
}

#[test]
#[ignore] // Requires running Kafka
fn test_send_against_real_broker() {
    let kafka = Kafka::new(create_test_kafka_config());

    let result = kafka
        .publish_on("localhost:9092", "test-topic")
        .unwrap()
        .with_message_key("k")
        .with_body(json!({"hello": "world"}))
        .send();

    assert!(result.is_ok());
}
