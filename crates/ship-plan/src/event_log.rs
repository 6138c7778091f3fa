//! Per-task append-only event log with replaying subscriptions.
//!
//! A log has exactly one [`LogWriter`] (held by the planner worker) and any
//! number of [`LogReader`]s. Every [`Subscription`] starts at the first event,
//! so late joiners see the full history, then waits for new appends. Nothing
//! is ever dropped: unlike a broadcast channel there is no lag.

use futures::Stream;
use parking_lot::RwLock;
use ship_core::events::{PlanEvent, PlanOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("event log is sealed; refused to append {event}")]
    Sealed { event: &'static str },
}

#[derive(Debug, Default)]
struct LogState {
    events: Vec<PlanEvent>,
    sealed: bool,
}

#[derive(Debug)]
struct Shared {
    state: RwLock<LogState>,
    // Carries the current event count; receivers wake on every append.
    appended: watch::Sender<usize>,
    subscribers: AtomicUsize,
}

impl Shared {
    fn event_at(&self, index: usize) -> Option<PlanEvent> {
        self.state.read().events.get(index).cloned()
    }
}

/// Creates an empty log and returns its writer and a reader.
pub fn event_log() -> (LogWriter, LogReader) {
    let (appended, _) = watch::channel(0);
    let shared = Arc::new(Shared {
        state: RwLock::new(LogState::default()),
        appended,
        subscribers: AtomicUsize::new(0),
    });
    (
        LogWriter {
            shared: shared.clone(),
        },
        LogReader { shared },
    )
}

/// The single writing end of a log. Not `Clone`.
#[derive(Debug)]
pub struct LogWriter {
    shared: Arc<Shared>,
}

impl LogWriter {
    /// Appends one event and returns its position.
    ///
    /// Appending a terminal event seals the log; every later append fails.
    pub fn append(&self, event: PlanEvent) -> Result<usize, EventLogError> {
        let position = {
            let mut state = self.shared.state.write();
            if state.sealed {
                return Err(EventLogError::Sealed {
                    event: event.name(),
                });
            }
            state.sealed = event.is_terminal();
            state.events.push(event);
            state.events.len() - 1
        };
        self.shared.appended.send_replace(position + 1);
        Ok(position)
    }

    pub fn is_sealed(&self) -> bool {
        self.shared.state.read().sealed
    }

    pub fn reader(&self) -> LogReader {
        LogReader {
            shared: self.shared.clone(),
        }
    }
}

impl Drop for LogWriter {
    // A writer that goes away unsealed would leave subscribers waiting forever.
    fn drop(&mut self) {
        if self.is_sealed() {
            return;
        }
        warn!("event log writer dropped before a terminal event; sealing with an error");
        let _ = self.append(PlanEvent::error("planner stopped before producing a result"));
    }
}

#[derive(Debug, Clone)]
pub struct LogReader {
    shared: Arc<Shared>,
}

impl LogReader {
    pub fn snapshot(&self) -> Vec<PlanEvent> {
        self.shared.state.read().events.clone()
    }

    pub fn len(&self) -> usize {
        self.shared.state.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_sealed(&self) -> bool {
        self.shared.state.read().sealed
    }

    /// The terminal result, once the log is sealed.
    pub fn outcome(&self) -> Option<PlanOutcome> {
        PlanOutcome::from_events(&self.shared.state.read().events)
    }

    pub fn open_subscriptions(&self) -> usize {
        self.shared.subscribers.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> Subscription {
        let open = self.shared.subscribers.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(open, "event log subscription opened");
        Subscription {
            shared: self.shared.clone(),
            changes: self.shared.appended.subscribe(),
            cursor: 0,
            finished: false,
        }
    }
}

/// One consumer's ordered view of a log, from the first event.
///
/// Dropping it (or calling [`Subscription::unsubscribe`]) only detaches this
/// consumer; the writer and other subscribers are unaffected.
#[derive(Debug)]
pub struct Subscription {
    shared: Arc<Shared>,
    changes: watch::Receiver<usize>,
    cursor: usize,
    finished: bool,
}

impl Subscription {
    /// Waits for the next event. Returns `None` after the terminal event.
    pub async fn next(&mut self) -> Option<PlanEvent> {
        if self.finished {
            return None;
        }
        loop {
            // Mark the current version seen before reading so an append racing
            // with this check still wakes `changed()`.
            let _ = self.changes.borrow_and_update();
            if let Some(event) = self.shared.event_at(self.cursor) {
                self.cursor += 1;
                if event.is_terminal() {
                    self.finished = true;
                }
                return Some(event);
            }
            if self.changes.changed().await.is_err() {
                self.finished = true;
                return None;
            }
        }
    }

    pub fn delivered(&self) -> usize {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn unsubscribe(self) {}

    pub fn into_stream(self) -> impl Stream<Item = PlanEvent> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            let event = subscription.next().await?;
            Some((event, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let open = self.shared.subscribers.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(open, delivered = self.cursor, "event log subscription closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn progress(message: &str) -> PlanEvent {
        PlanEvent::progress(message)
    }

    #[test]
    fn terminal_event_seals_the_log() {
        let (writer, reader) = event_log();
        assert_eq!(writer.append(progress("a")).expect("append"), 0);
        assert_eq!(writer.append(PlanEvent::Done {}).expect("append done"), 1);
        assert!(reader.is_sealed());

        let err = writer
            .append(progress("late"))
            .expect_err("sealed log rejects appends");
        assert!(matches!(err, EventLogError::Sealed { event: "progress" }));
        assert_eq!(reader.len(), 2);
    }

    #[tokio::test]
    async fn late_subscriber_replays_history_then_follows() {
        let (writer, reader) = event_log();
        writer.append(progress("compiling carriers")).expect("append");

        let mut early = reader.subscribe();
        assert_eq!(early.next().await, Some(progress("compiling carriers")));

        writer.append(progress("scoring routes")).expect("append");
        let mut late = reader.subscribe();
        assert_eq!(late.next().await, Some(progress("compiling carriers")));
        assert_eq!(late.next().await, Some(progress("scoring routes")));
        assert_eq!(early.next().await, Some(progress("scoring routes")));

        writer.append(PlanEvent::Done {}).expect("append done");
        assert_eq!(early.next().await, Some(PlanEvent::Done {}));
        assert_eq!(late.next().await, Some(PlanEvent::Done {}));
        assert_eq!(early.next().await, None);
        assert!(late.is_finished());
    }

    #[tokio::test]
    async fn subscriber_waits_for_appends_from_another_task() {
        let (writer, reader) = event_log();
        let stream = reader.subscribe().into_stream();

        let producer = tokio::spawn(async move {
            for step in ["analyzing", "matching", "ranking"] {
                tokio::time::sleep(Duration::from_millis(5)).await;
                writer.append(progress(step)).expect("append");
            }
            writer.append(PlanEvent::Done {}).expect("append done");
        });

        let received = tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
            .await
            .expect("stream completes");
        producer.await.expect("producer joins");

        assert_eq!(
            received,
            vec![
                progress("analyzing"),
                progress("matching"),
                progress("ranking"),
                PlanEvent::Done {},
            ]
        );
    }

    #[tokio::test]
    async fn unsubscribing_leaves_other_subscribers_intact() {
        let (writer, reader) = event_log();
        let first = reader.subscribe();
        let mut second = reader.subscribe();
        assert_eq!(reader.open_subscriptions(), 2);

        first.unsubscribe();
        assert_eq!(reader.open_subscriptions(), 1);

        writer.append(progress("a")).expect("append");
        writer.append(PlanEvent::error("boom")).expect("append error");
        assert_eq!(second.next().await, Some(progress("a")));
        assert_eq!(second.next().await, Some(PlanEvent::error("boom")));
        assert_eq!(second.next().await, None);
        assert_eq!(reader.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn dropped_writer_seals_with_error() {
        let (writer, reader) = event_log();
        let mut subscription = reader.subscribe();
        writer.append(progress("a")).expect("append");
        drop(writer);

        assert_eq!(subscription.next().await, Some(progress("a")));
        let last = subscription.next().await.expect("terminal event");
        assert!(matches!(last, PlanEvent::Error { .. }));
        assert!(reader.outcome().is_some());
    }
}
