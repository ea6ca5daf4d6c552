//! In-memory stand-in for the producer backend.
//!
//! While the recorder is enabled, every `send` lands here instead of on the
//! network. Tests then assert against what would have been published.
//!
//! # Example
//!
//! ```rust
//! use kafka_courier::{Kafka, KafkaConfig};
//!
//! let kafka = Kafka::new(KafkaConfig::default());
//! let recorder = kafka.fake();
//!
//! kafka
//!     .publish_on("localhost:9092", "orders")?
//!     .with_message_key("order-1")
//!     .send()?;
//!
//! recorder.assert_published_on("orders", |s| s.message.key() == Some("order-1"));
//! # Ok::<(), kafka_courier::Error>(())
//! ```

use crate::kafka::dispatch::{Dispatch, PublishSnapshot};
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

#[derive(Default)]
struct RecorderState {
    enabled: AtomicBool,
    /// Bumped on every `disable`, so dispatchers handed out earlier go stale.
    session: AtomicU64,
    published: Mutex<Vec<PublishSnapshot>>,
}

/// Shared handle to the recorded publish attempts. Clones see the same log.
#[derive(Clone, Default)]
pub struct FakeRecorder {
    state: Arc<RecorderState>,
}

impl FakeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self) {
        self.state.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.state.enabled.store(false, Ordering::SeqCst);
        self.state.session.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::SeqCst)
    }

    /// A dispatcher bound to the current fake session.
    ///
    /// Once the recorder is disabled, the dispatcher keeps failing with
    /// [`Error::InternalConsistency`], even after the recorder is enabled
    /// again.
    pub fn dispatcher(&self) -> Arc<dyn Dispatch> {
        Arc::new(SessionDispatcher {
            recorder: self.clone(),
            session: self.state.session.load(Ordering::SeqCst),
        })
    }

    /// Appends a snapshot to the log.
    ///
    /// Recording on a disabled recorder means a builder was routed here after
    /// fake mode was switched off. That is reported as
    /// [`Error::InternalConsistency`] and nothing is recorded.
    pub fn record(&self, snapshot: PublishSnapshot) -> Result<()> {
        if !self.is_enabled() {
            error!(topic = %snapshot.topic, "Fake recorder invoked while disabled");
            return Err(Error::InternalConsistency(format!(
                "fake recorder is disabled, refusing to record publish on '{}'",
                snapshot.topic
            )));
        }

        debug!(topic = %snapshot.topic, broker = %snapshot.broker, "Recorded fake publish");
        self.entries().push(snapshot);
        Ok(())
    }

    /// Iterates over a copy of the log taken at call time. Call again to
    /// start over.
    pub fn all(&self) -> std::vec::IntoIter<PublishSnapshot> {
        self.published().into_iter()
    }

    pub fn published(&self) -> Vec<PublishSnapshot> {
        self.entries().clone()
    }

    pub fn count(&self) -> usize {
        self.entries().len()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Panics unless at least one recorded snapshot matches.
    pub fn assert_published<P>(&self, predicate: P)
    where
        P: Fn(&PublishSnapshot) -> bool,
    {
        let entries = self.entries();
        assert!(
            entries.iter().any(|s| predicate(s)),
            "expected a matching message to be published, none of {} recorded attempts matched",
            entries.len()
        );
    }

    /// Panics unless exactly `times` recorded snapshots match.
    pub fn assert_published_times<P>(&self, predicate: P, times: usize)
    where
        P: Fn(&PublishSnapshot) -> bool,
    {
        let matched = self.entries().iter().filter(|s| predicate(s)).count();
        assert_eq!(
            matched, times,
            "expected {} matching published messages, found {}",
            times, matched
        );
    }

    /// Panics unless a snapshot on `topic` matches.
    pub fn assert_published_on<P>(&self, topic: &str, predicate: P)
    where
        P: Fn(&PublishSnapshot) -> bool,
    {
        let entries = self.entries();
        assert!(
            entries.iter().any(|s| s.topic == topic && predicate(s)),
            "expected a matching message to be published on '{}'",
            topic
        );
    }

    pub fn assert_nothing_published(&self) {
        let count = self.count();
        assert_eq!(count, 0, "expected nothing published, found {} messages", count);
    }

    fn entries(&self) -> MutexGuard<'_, Vec<PublishSnapshot>> {
        self.state
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

struct SessionDispatcher {
    recorder: FakeRecorder,
    session: u64,
}

impl Dispatch for SessionDispatcher {
    fn dispatch(&self, snapshot: &PublishSnapshot) -> Result<()> {
        let current = self.recorder.state.session.load(Ordering::SeqCst);
        if current != self.session {
            error!(
                topic = %snapshot.topic,
                session = self.session,
                current,
                "Builder from an earlier fake session"
            );
            return Err(Error::InternalConsistency(format!(
                "builder for '{}' was created in an earlier fake session",
                snapshot.topic
            )));
        }
        self.recorder.record(snapshot.clone())
    }
}
