//! Typed, async, fire-and-forget event emission (C5).
//!
//! `emit` schedules handlers onto the runtime and returns immediately; it
//! never awaits them. Handlers registered for one event type run in
//! registration order relative to each other; ordering across types is not
//! guaranteed (design note: event emission / message passing).

use crate::types::{Document, Entity, Relationship, ScopeId};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    EntityCreated,
    EntityUpdated,
    EntityDeleted,
    RelationshipCreated,
    RelationshipUpdated,
    RelationshipDeleted,
    DocumentCreated,
    DocumentUpdated,
    DocumentDeleted,
    LearnStarted,
    LearnCompleted,
    LearnFailed,
    ExtractionStarted,
    ExtractionCompleted,
    QueryStarted,
    QueryCompleted,
    BatchProgress,
    BatchCompleted,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::EntityCreated => "entity.created",
            EventType::EntityUpdated => "entity.updated",
            EventType::EntityDeleted => "entity.deleted",
            EventType::RelationshipCreated => "relationship.created",
            EventType::RelationshipUpdated => "relationship.updated",
            EventType::RelationshipDeleted => "relationship.deleted",
            EventType::DocumentCreated => "document.created",
            EventType::DocumentUpdated => "document.updated",
            EventType::DocumentDeleted => "document.deleted",
            EventType::LearnStarted => "learn.started",
            EventType::LearnCompleted => "learn.completed",
            EventType::LearnFailed => "learn.failed",
            EventType::ExtractionStarted => "extraction.started",
            EventType::ExtractionCompleted => "extraction.completed",
            EventType::QueryStarted => "query.started",
            EventType::QueryCompleted => "query.completed",
            EventType::BatchProgress => "batch.progress",
            EventType::BatchCompleted => "batch.completed",
        };
        write!(f, "{}", s)
    }
}

/// Payload carried by an event, keyed to its `EventType`.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Entity(Entity),
    Relationship(Relationship),
    Document(Document),
    Summary(Value),
    Text(String),
    Error(String),
    Progress { current: usize, total: usize, completed: usize, failed: usize },
    Empty,
}

#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type_name: String,
    pub timestamp: DateTime<Utc>,
    pub scope_id: Option<ScopeId>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(event_type: EventType, scope_id: Option<ScopeId>, payload: EventPayload) -> Self {
        Self {
            event_type_name: event_type.to_string(),
            timestamp: Utc::now(),
            scope_id,
            payload,
        }
    }
}

/// A registered handler: an async closure boxed for storage.
pub type HandlerFn = Arc<
    dyn Fn(Event) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

struct Registration {
    id: u64,
    handler: HandlerFn,
    once: bool,
}

/// Typed pub/sub used by the ingestion and retrieval pipelines to publish
/// lifecycle notifications without blocking on subscribers.
#[derive(Default)]
pub struct EventEmitter {
    handlers: RwLock<HashMap<EventType, Vec<Registration>>>,
    next_id: AtomicU64,
    enabled: bool,
}

impl EventEmitter {
    pub fn new(enabled: bool) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            enabled,
        }
    }

    /// Register a handler for `event_type`. Returns a token usable with `off`.
    pub async fn on(&self, event_type: EventType, handler: HandlerFn) -> u64 {
        self.register(event_type, handler, false).await
    }

    /// Register a handler removed automatically after its first invocation.
    pub async fn once(&self, event_type: EventType, handler: HandlerFn) -> u64 {
        self.register(event_type, handler, true).await
    }

    async fn register(&self, event_type: EventType, handler: HandlerFn, once: bool) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut handlers = self.handlers.write().await;
        handlers
            .entry(event_type)
            .or_insert_with(Vec::new)
            .push(Registration { id, handler, once });
        id
    }

    /// Unregister a handler previously returned by `on`/`once`.
    pub async fn off(&self, event_type: EventType, token: u64) {
        let mut handlers = self.handlers.write().await;
        if let Some(list) = handlers.get_mut(&event_type) {
            list.retain(|r| r.id != token);
        }
    }

    /// Schedule all handlers for `event.event_type` and return immediately.
    /// Handler panics/errors are caught and logged; they never propagate.
    pub async fn emit(&self, event_type: EventType, event: Event) {
        if !self.enabled {
            return;
        }

        let to_run: Vec<HandlerFn> = {
            let mut handlers = self.handlers.write().await;
            match handlers.get_mut(&event_type) {
                Some(list) => {
                    let runnable: Vec<HandlerFn> = list.iter().map(|r| r.handler.clone()).collect();
                    list.retain(|r| !r.once);
                    runnable
                }
                None => return,
            }
        };

        if to_run.is_empty() {
            return;
        }

        tokio::spawn(async move {
            // Handlers for one type run in registration order, but the
            // emitting caller never awaits this task.
            for handler in to_run {
                let fut = AssertUnwindSafe(handler(event.clone())).catch_unwind();
                if let Err(panic) = fut.await {
                    error!("event handler panicked: {}", panic_message(&panic));
                }
            }
        });
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn emit_is_non_blocking_and_handler_eventually_runs() {
        let emitter = EventEmitter::new(true);
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();

        emitter
            .on(
                EventType::EntityCreated,
                Arc::new(move |_event| {
                    let ran = ran2.clone();
                    Box::pin(async move {
                        sleep(Duration::from_millis(20)).await;
                        ran.fetch_add(1, AtomicOrdering::SeqCst);
                    })
                }),
            )
            .await;

        let start = std::time::Instant::now();
        emitter
            .emit(
                EventType::EntityCreated,
                Event::new(EventType::EntityCreated, None, EventPayload::Empty),
            )
            .await;
        let elapsed = start.elapsed();
        assert!(elapsed < Duration::from_millis(10), "emit should not block");

        sleep(Duration::from_millis(60)).await;
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn once_handler_runs_exactly_once() {
        let emitter = EventEmitter::new(true);
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();

        emitter
            .once(
                EventType::QueryStarted,
                Arc::new(move |_event| {
                    let count = count2.clone();
                    Box::pin(async move {
                        count.fetch_add(1, AtomicOrdering::SeqCst);
                    })
                }),
            )
            .await;

        for _ in 0..3 {
            emitter
                .emit(
                    EventType::QueryStarted,
                    Event::new(EventType::QueryStarted, None, EventPayload::Empty),
                )
                .await;
        }
        sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_panic_does_not_propagate() {
        let emitter = EventEmitter::new(true);
        emitter
            .on(
                EventType::LearnFailed,
                Arc::new(|_event| Box::pin(async move { panic!("boom") })),
            )
            .await;

        emitter
            .emit(
                EventType::LearnFailed,
                Event::new(EventType::LearnFailed, None, EventPayload::Empty),
            )
            .await;
        sleep(Duration::from_millis(20)).await;
        // Reaching here means the panic was caught inside the spawned task.
    }
}
