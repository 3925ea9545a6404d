//! Change notification bus shared by the timeline, the registry and the host.
//!
//! - Subscribers register per event type and are called synchronously on emit
//! - Every emitted event is also queued; the host drains the queue with poll()
//! - Model objects hold a [`Notifier`], which may be silent (tests, batch tools)
//!
//! Callback order: FIFO within one event type. No ordering across types.

use log::warn;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

/// Queue length before the oldest half is dropped
const MAX_QUEUE_SIZE: usize = 1000;

/// Marker trait for events. Blanket-implemented for every Send + Sync type.
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

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

pub type BoxedEvent = Box<dyn Event>;

#[derive(Default)]
struct Channels {
    subscribers: RwLock<HashMap<TypeId, Vec<Callback>>>,
    queue: Mutex<Vec<BoxedEvent>>,
}

impl Channels {
    fn publish(&self, type_id: TypeId, event: BoxedEvent) {
        // (*event) goes through the dyn Event vtable, see downcast_event
        if let Some(cbs) = self.subscribers.read().unwrap_or_else(|e| e.into_inner()).get(&type_id) {
            for cb in cbs {
                cb((*event).as_any());
            }
        }

        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= MAX_QUEUE_SIZE {
            let evict = queue.len() / 2;
            warn!("Event queue full ({} events), dropping oldest {}", queue.len(), evict);
            queue.drain(0..evict);
        }
        queue.push(event);
    }
}

/// Publish/subscribe bus with a deferred queue.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Channels>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").field("queued", &self.queue_len()).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `callback` for every future event of type E.
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
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    pub fn emit<E: Event>(&self, event: E) {
        self.inner.publish(TypeId::of::<E>(), Box::new(event));
    }

    /// Take every queued event.
    pub fn poll(&self) -> Vec<BoxedEvent> {
        std::mem::take(&mut *self.inner.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Take the queued events of type E, leaving the others queued.
    pub fn drain<E: Event + Clone>(&self) -> Vec<E> {
        let mut queue = self.inner.queue.lock().unwrap_or_else(|e| e.into_inner());
        let mut taken = Vec::new();
        queue.retain(|ev| match downcast_event::<E>(ev) {
            Some(e) => {
                taken.push(e.clone());
                false
            }
            None => true,
        });
        taken
    }

    /// Handle for model objects.
    pub fn notifier(&self) -> Notifier {
        Notifier {
            inner: Some(Arc::clone(&self.inner)),
        }
    }

    pub fn unsubscribe_all<E: Event>(&self) {
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&TypeId::of::<E>());
    }

    pub fn clear(&self) {
        self.inner.subscribers.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.inner.queue.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Emitting side of the bus. A silent notifier drops everything.
#[derive(Clone, Default)]
pub struct Notifier {
    inner: Option<Arc<Channels>>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier").field("connected", &self.inner.is_some()).finish()
    }
}

impl PartialEq for Notifier {
    /// Notifiers never make two models differ.
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Notifier {
    pub fn silent() -> Self {
        Self { inner: None }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_some()
    }

    pub fn emit<E: Event>(&self, event: E) {
        if let Some(inner) = &self.inner {
            inner.publish(TypeId::of::<E>(), Box::new(event));
        }
    }
}

/// Downcast a queued event.
///
/// Derefs to `dyn Event` before `as_any()`: the blanket impl also covers
/// `Box<dyn Event>` itself, and calling through the box would hand back the
/// box instead of the event.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[derive(Clone, Debug, PartialEq)]
    struct Moved {
        frames: i32,
    }

    #[derive(Clone, Debug)]
    struct Renamed(String);

    #[test]
    fn test_subscribe_emit_immediate() {
        let bus = EventBus::new();
        let total = Arc::new(AtomicI32::new(0));
        let t = Arc::clone(&total);
        bus.subscribe::<Moved, _>(move |e| {
            t.fetch_add(e.frames, Ordering::SeqCst);
        });

        bus.emit(Moved { frames: 10 });
        bus.emit(Moved { frames: 5 });
        assert_eq!(total.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn test_notifier_reaches_bus() {
        let bus = EventBus::new();
        let n = bus.notifier();
        n.emit(Moved { frames: 1 });
        n.emit(Renamed("V2".into()));
        assert_eq!(bus.queue_len(), 2);

        assert_eq!(bus.drain::<Moved>(), vec![Moved { frames: 1 }]);
        let rest = bus.poll();
        assert_eq!(rest.len(), 1);
        assert!(downcast_event::<Renamed>(&rest[0]).is_some());
    }

    #[test]
    fn test_silent_notifier() {
        let n = Notifier::silent();
        assert!(!n.is_connected());
        n.emit(Moved { frames: 1 });
    }

    #[test]
    fn test_unsubscribe_keeps_queue() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicI32::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe::<Moved, _>(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(Moved { frames: 0 });
        bus.unsubscribe_all::<Moved>();
        bus.emit(Moved { frames: 0 });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.poll().len(), 2);
    }

    #[test]
    fn test_queue_eviction() {
        let bus = EventBus::new();
        for i in 0..(MAX_QUEUE_SIZE as i32 + 1) {
            bus.emit(Moved { frames: i });
        }
        assert_eq!(bus.queue_len(), MAX_QUEUE_SIZE / 2 + 1);
    }
}
