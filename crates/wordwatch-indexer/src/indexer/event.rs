//! Timestamped change events and the sink producers push them through.

use crate::clock::Timestamp;
use crate::scanner::ScanProgress;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// What happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File was created or its content may have changed
    Update,
    /// File was deleted
    Delete,
}

/// A change to one path at a logical point in time.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Absolute path of the changed file
    pub path: PathBuf,
    /// Kind of change
    pub kind: ChangeKind,
    /// When the change was observed
    pub timestamp: Timestamp,
    /// Initial-scan progress to tick once the event is handled
    progress: Option<Arc<ScanProgress>>,
}

impl ChangeEvent {
    pub fn new(path: PathBuf, kind: ChangeKind, timestamp: Timestamp) -> Self {
        Self {
            path,
            kind,
            timestamp,
            progress: None,
        }
    }

    pub fn update(path: impl Into<PathBuf>, timestamp: Timestamp) -> Self {
        Self::new(path.into(), ChangeKind::Update, timestamp)
    }

    pub fn delete(path: impl Into<PathBuf>, timestamp: Timestamp) -> Self {
        Self::new(path.into(), ChangeKind::Delete, timestamp)
    }

    /// Report completion of this event to a scan's progress counters.
    pub fn with_progress(mut self, progress: Arc<ScanProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Mark the event as handled, whether it was applied or dropped.
    pub(crate) fn complete(&self) {
        if let Some(progress) = &self.progress {
            progress.file_indexed();
        }
    }
}

/// Producer handle onto the indexer's unbounded event queue.
///
/// Closing a sink is final. Live events are stamped while the sink's read
/// lock is held, so once [`EventSink::close`] returns no event sent through
/// this sink can carry a timestamp later than the caller's next reading.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<ChangeEvent>,
    open: Arc<RwLock<bool>>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<ChangeEvent>) -> Self {
        Self {
            tx,
            open: Arc::new(RwLock::new(true)),
        }
    }

    /// Stamp a change with the current time and enqueue it.
    pub fn send(&self, kind: ChangeKind, path: PathBuf) -> bool {
        let open = self.open.read();
        if !*open {
            return false;
        }
        self.tx
            .send(ChangeEvent::new(path, kind, Timestamp::now()))
            .is_ok()
    }

    /// Enqueue an already stamped event.
    pub fn send_event(&self, event: ChangeEvent) -> bool {
        let open = self.open.read();
        *open && self.tx.send(event).is_ok()
    }

    /// Stop accepting events. Waits for in-progress sends to finish.
    pub fn close(&self) {
        *self.open.write() = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_sink_stamps_increasing_timestamps() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);

        assert!(sink.send(ChangeKind::Update, PathBuf::from("/a")));
        assert!(sink.send(ChangeKind::Delete, PathBuf::from("/a")));

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.kind, ChangeKind::Update);
        assert_eq!(second.kind, ChangeKind::Delete);
        assert!(second.timestamp > first.timestamp);
    }

    #[test]
    fn test_closed_sink_rejects_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        let clone = sink.clone();

        sink.close();
        assert!(!clone.send(ChangeKind::Update, PathBuf::from("/a")));
        assert!(!clone.send_event(ChangeEvent::update("/a", Timestamp::now())));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_orders_before_later_timestamps() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);

        sink.send(ChangeKind::Update, PathBuf::from("/a"));
        sink.close();
        let after_close = Timestamp::now();

        while let Ok(event) = rx.try_recv() {
            assert!(event.timestamp < after_close);
        }
    }

    #[test]
    fn test_complete_ticks_progress() {
        let progress = Arc::new(ScanProgress::new());
        progress.file_discovered();
        progress.finish_discovery();

        let event = ChangeEvent::update("/a", Timestamp::now()).with_progress(progress.clone());
        assert!(!progress.is_done());
        event.complete();
        assert!(progress.is_done());

        // Events without progress are a no-op
        ChangeEvent::delete("/a", Timestamp::now()).complete();
    }
}
