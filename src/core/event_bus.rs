//! Pub/Sub event bus carrying animator notifications to the UI layer.
//!
//! Architecture:
//! - UI components subscribe to event types with callbacks (immediate invocation)
//! - emit() invokes callbacks immediately AND queues for deferred processing
//! - poll() returns queued events for batch processing in the host loop
//!
//! Callback order: FIFO (first-subscribed, first-called) within same event type.
//! Cross-type order undefined - don't rely on ordering between different event types.
//!
//! Several animators can share one bus; every notification carries the
//! [`AnimatorId`](crate::core::events::AnimatorId) of its sender.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use log::warn;

use super::events::AnimatorId;

/// Maximum events in queue before oldest are evicted
const MAX_QUEUE_SIZE: usize = 1000;

/// Marker trait for events. Events must be Send + Sync + 'static.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Type-erased callback
type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Boxed event for queue storage
pub type BoxedEvent = Box<dyn Event>;

/// Subscribers and queue, shared by the bus and every emitter handle.
#[derive(Default)]
struct Shared {
    subscribers: RwLock<HashMap<TypeId, Vec<Callback>>>,
    queue: Mutex<Vec<BoxedEvent>>,
}

impl Shared {
    fn emit<E: Event + Clone>(&self, event: E) {
        // Invoke immediate callbacks
        if let Some(cbs) = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
        {
            for cb in cbs {
                cb(&event);
            }
        }

        // Queue for deferred processing with eviction
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= MAX_QUEUE_SIZE {
            let evict_count = queue.len() / 2;
            warn!("EventBus queue full ({} events), evicting oldest {}", queue.len(), evict_count);
            queue.drain(0..evict_count);
        }
        queue.push(Box::new(event));
    }
}

/// Pub/Sub event bus with deferred processing support.
///
/// Two modes of operation:
/// 1. Immediate: subscribe() + emit() triggers callbacks instantly
/// 2. Deferred: emit() also queues events for poll() in the host loop
#[derive(Clone, Default)]
pub struct EventBus {
    shared: Arc<Shared>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events of type E.
    ///
    /// # Example
    /// ```ignore
    /// bus.subscribe::<FrameChangedEvent, _>(|e| {
    ///     println!("frame {} -> {}", e.frame, e.url);
    /// });
    /// ```
    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    /// Emit event: invoke callbacks immediately AND queue for poll().
    pub fn emit<E: Event + Clone>(&self, event: E) {
        self.shared.emit(event);
    }

    /// Take all events emitted since last poll.
    pub fn poll(&self) -> Vec<BoxedEvent> {
        std::mem::take(&mut *self.shared.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Emitter handle bound to one animator.
    pub fn emitter(&self, animator: AnimatorId) -> AnimatorEmitter {
        AnimatorEmitter {
            animator,
            shared: Some(Arc::clone(&self.shared)),
        }
    }

    /// Clear subscribers for type E
    pub fn unsubscribe_all<E: Event>(&self) {
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&TypeId::of::<E>());
    }

    /// Clear all subscribers and queue
    pub fn clear(&self) {
        self.shared.subscribers.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.shared.queue.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Emitter handle owned by one animator (engine and loader hold clones).
///
/// A detached emitter (see [`AnimatorEmitter::detached`]) drops everything,
/// which is what unit tests of the engine use.
#[derive(Clone)]
pub struct AnimatorEmitter {
    animator: AnimatorId,
    shared: Option<Arc<Shared>>,
}

impl AnimatorEmitter {
    /// No-op emitter
    pub fn detached(animator: AnimatorId) -> Self {
        Self { animator, shared: None }
    }

    pub fn animator(&self) -> AnimatorId {
        self.animator
    }

    /// Emit event (no-op if detached)
    pub fn emit<E: Event + Clone>(&self, event: E) {
        if let Some(shared) = &self.shared {
            shared.emit(event);
        }
    }
}

impl std::fmt::Debug for AnimatorEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimatorEmitter")
            .field("animator", &self.animator)
            .field("attached", &self.shared.is_some())
            .finish()
    }
}

/// Helper: downcast BoxedEvent to concrete type
///
/// Must deref to `dyn Event` before `as_any()`; otherwise the blanket impl for
/// `Box<dyn Event>` answers and the downcast always fails.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::{FrameChangedEvent, PlayStateChangedEvent};
    use crate::entities::PlayMode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    fn frame_event(animator: AnimatorId, frame: usize) -> FrameChangedEvent {
        FrameChangedEvent {
            animator,
            frame,
            url: format!("img/{frame}.png"),
        }
    }

    #[test]
    fn test_subscribe_emit_immediate() {
        let bus = EventBus::new();
        let id = Uuid::new_v4();
        let sum = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&sum);

        bus.subscribe::<FrameChangedEvent, _>(move |e| {
            s.fetch_add(e.frame, Ordering::SeqCst);
        });

        bus.emit(frame_event(id, 3));
        assert_eq!(sum.load(Ordering::SeqCst), 3);

        bus.emitter(id).emit(frame_event(id, 4));
        assert_eq!(sum.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_emit_queues_for_poll() {
        let bus = EventBus::new();
        let id = Uuid::new_v4();
        let emitter = bus.emitter(id);

        emitter.emit(frame_event(id, 1));
        emitter.emit(PlayStateChangedEvent { animator: id, mode: PlayMode::Playing });

        let events = bus.poll();
        assert_eq!(events.len(), 2);
        assert!(bus.poll().is_empty());

        let frame = downcast_event::<FrameChangedEvent>(&events[0]).map(|e| e.frame);
        assert_eq!(frame, Some(1));
        assert!(downcast_event::<FrameChangedEvent>(&events[1]).is_none());
    }

    #[test]
    fn test_detached_emitter_drops_events() {
        let bus = EventBus::new();
        let id = Uuid::new_v4();
        let emitter = AnimatorEmitter::detached(id);

        emitter.emit(frame_event(id, 0));
        assert_eq!(bus.queue_len(), 0);
        assert_eq!(emitter.animator(), id);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let id = Uuid::new_v4();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);

        bus.subscribe::<FrameChangedEvent, _>(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(frame_event(id, 0));
        bus.unsubscribe_all::<FrameChangedEvent>();
        bus.emit(frame_event(id, 1));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Still queued without subscribers
        assert_eq!(bus.poll().len(), 2);
    }
}
