//! Append-only, trace-scoped event bus with buffered asynchronous
//! persistence and in-process fan-out.
//!
//! `emit` is the core concurrency contract: it assigns the per-trace
//! sequence number, appends to the in-memory buffer, and notifies
//! listeners without ever touching durable storage; the expensive tail
//! (the batch write) runs on the background flusher's schedule. A storage
//! outage degrades emission into "buffer grows, listeners still fire",
//! never into a caller-visible error.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use voxflow_core::config::BusConfig;
use voxflow_core::{ConversationEvent, EventDraft, EventStore, EventType, Sanitizer, StoreError, TraceId};

pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;
pub type EventListener = Arc<dyn Fn(ConversationEvent) -> Result<(), ListenerError> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventSelector {
    Type(EventType),
    All,
}

impl EventSelector {
    fn matches(&self, event_type: EventType) -> bool {
        match self {
            Self::Type(selected) => *selected == event_type,
            Self::All => true,
        }
    }
}

struct ListenerEntry {
    selector: EventSelector,
    sender: mpsc::Sender<ConversationEvent>,
}

struct BusInner {
    store: Arc<dyn EventStore>,
    sanitizer: Sanitizer,
    options: BusConfig,
    sequences: Mutex<HashMap<TraceId, u64>>,
    buffer: Mutex<VecDeque<ConversationEvent>>,
    listeners: Mutex<HashMap<u64, ListenerEntry>>,
    next_subscription: AtomicU64,
    flush_signal: Notify,
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new(store: Arc<dyn EventStore>, sanitizer: Sanitizer, options: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                store,
                sanitizer,
                options,
                sequences: Mutex::new(HashMap::new()),
                buffer: Mutex::new(VecDeque::new()),
                listeners: Mutex::new(HashMap::new()),
                next_subscription: AtomicU64::new(1),
                flush_signal: Notify::new(),
            }),
        }
    }

    /// Sanitizes the payload, assigns the next sequence number for the
    /// trace (generating a trace id when absent), buffers the event, and
    /// fans it out to listeners. Synchronous and non-blocking; sequence
    /// assignment happening here, not at flush time, is what makes
    /// per-trace order match emission order.
    pub fn emit(&self, draft: EventDraft) -> ConversationEvent {
        let event_type = draft.event_type;
        let trace_id = draft.trace_id.clone().unwrap_or_else(TraceId::generate);

        let sequence_number = {
            let mut sequences = lock(&self.inner.sequences);
            let counter = sequences.entry(trace_id.clone()).or_insert(0);
            *counter += 1;
            let assigned = *counter;
            // The terminal event releases the counter; the trace's order
            // is carried by storage from here on.
            if event_type.is_terminal() {
                sequences.remove(&trace_id);
            }
            assigned
        };

        let data = self.inner.sanitizer.sanitize(&draft.data);
        let event = draft.into_event(trace_id, sequence_number, data);

        let buffered = {
            let mut buffer = lock(&self.inner.buffer);
            buffer.push_back(event.clone());
            buffer.len()
        };
        if buffered >= self.inner.options.flush_threshold {
            self.inner.flush_signal.notify_one();
        }

        self.fan_out(&event);
        event
    }

    fn fan_out(&self, event: &ConversationEvent) {
        let mut closed = Vec::new();
        {
            let listeners = lock(&self.inner.listeners);
            for (id, entry) in listeners.iter() {
                if !entry.selector.matches(event.event_type) {
                    continue;
                }
                match entry.sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(
                            subscription = id,
                            event_type = %event.event_type,
                            "listener queue full; event dropped for this listener"
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }
        if !closed.is_empty() {
            let mut listeners = lock(&self.inner.listeners);
            for id in closed {
                listeners.remove(&id);
            }
        }
    }

    /// Registers a listener for one event type, or for every event via
    /// `EventSelector::All`. Each subscription owns a bounded queue drained
    /// by its own task, so a slow listener can only lose its own events.
    pub fn on(&self, selector: EventSelector, listener: EventListener) -> Subscription {
        let (sender, mut receiver) =
            mpsc::channel::<ConversationEvent>(self.inner.options.listener_queue_depth);
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.listeners).insert(id, ListenerEntry { selector, sender });

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(error) = listener(event) {
                    warn!(subscription = id, error = %error, "event listener failed");
                }
            }
        });

        Subscription { id, bus: Arc::downgrade(&self.inner) }
    }

    /// Drains the buffer and batch-writes it to durable storage. On
    /// failure the batch goes back to the front of the buffer, ahead of
    /// anything emitted meanwhile, preserving per-trace order for the next
    /// attempt. At-least-once: the store's `(trace, sequence)` key absorbs
    /// duplicate writes.
    pub async fn flush(&self) -> Result<usize, StoreError> {
        let batch: Vec<ConversationEvent> = {
            let mut buffer = lock(&self.inner.buffer);
            buffer.drain(..).collect()
        };
        if batch.is_empty() {
            return Ok(0);
        }

        match self.inner.store.append_batch(&batch).await {
            Ok(()) => {
                debug!(events = batch.len(), "flushed event buffer");
                Ok(batch.len())
            }
            Err(error) => {
                let requeued = batch.len();
                let mut buffer = lock(&self.inner.buffer);
                for event in batch.into_iter().rev() {
                    buffer.push_front(event);
                }
                warn!(events = requeued, error = %error, "flush failed; events re-buffered");
                Err(error)
            }
        }
    }

    /// All events for a trace in sequence order, regardless of how they
    /// are currently split between the buffer and durable storage.
    pub async fn replay(&self, trace_id: &TraceId) -> Result<Vec<ConversationEvent>, StoreError> {
        let stored = self.inner.store.events_for_trace(trace_id).await?;

        let mut by_event_id: HashMap<String, ConversationEvent> = stored
            .into_iter()
            .map(|event| (event.event_id.clone(), event))
            .collect();
        {
            let buffer = lock(&self.inner.buffer);
            for event in buffer.iter().filter(|event| &event.trace_id == trace_id) {
                by_event_id.entry(event.event_id.clone()).or_insert_with(|| event.clone());
            }
        }

        let mut events: Vec<ConversationEvent> = by_event_id.into_values().collect();
        events.sort_by_key(|event| event.sequence_number);
        Ok(events)
    }

    /// Spawns the periodic flusher: flushes on a fixed interval, and
    /// immediately once the buffer crosses the size threshold. Failures
    /// are logged and retried on the next cycle, never surfaced.
    pub fn start_flusher(&self) -> FlusherHandle {
        let bus = self.clone();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let interval = Duration::from_secs(bus.inner.options.flush_interval_secs.max(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = bus.inner.flush_signal.notified() => {}
                    _ = shutdown_rx.recv() => break,
                }
                if let Err(error) = bus.flush().await {
                    warn!(error = %error, "background flush failed");
                }
            }
            if let Err(error) = bus.flush().await {
                warn!(error = %error, "final flush on shutdown failed");
            }
        });

        FlusherHandle { shutdown: shutdown_tx, task }
    }

    pub fn buffered_len(&self) -> usize {
        lock(&self.inner.buffer).len()
    }

    pub fn active_trace_count(&self) -> usize {
        lock(&self.inner.sequences).len()
    }
}

/// Registration handle returned by `EventBus::on`. Dropping it without
/// unsubscribing leaves the listener attached for the life of the bus.
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.bus.upgrade() {
            // Removing the sender closes the queue and ends the drain task.
            lock(&inner.listeners).remove(&self.id);
        }
    }
}

pub struct FlusherHandle {
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl FlusherHandle {
    /// Stops the background flusher after one final flush.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(()).await;
        let _ = self.task.await;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// `(trace, sequence)`-idempotent in-memory store, used by tests and by
/// `voxflow simulate`.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<Mutex<Vec<ConversationEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<ConversationEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait::async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_batch(&self, events: &[ConversationEvent]) -> Result<(), StoreError> {
        let mut stored = lock(&self.events);
        for event in events {
            let duplicate = stored.iter().any(|existing| {
                existing.trace_id == event.trace_id
                    && existing.sequence_number == event.sequence_number
            });
            if !duplicate {
                stored.push(event.clone());
            }
        }
        Ok(())
    }

    async fn events_for_trace(
        &self,
        trace_id: &TraceId,
    ) -> Result<Vec<ConversationEvent>, StoreError> {
        let mut events: Vec<ConversationEvent> = lock(&self.events)
            .iter()
            .filter(|event| &event.trace_id == trace_id)
            .cloned()
            .collect();
        events.sort_by_key(|event| event.sequence_number);
        Ok(events)
    }
}
