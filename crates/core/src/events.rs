//! Named publish/subscribe primitive.
//!
//! [`EventEmitter`] fans a payload out to every handler registered under an
//! event name. Emission is synchronous: `emit` returns once every handler has
//! run. Handlers are invoked after the internal lock is released, so a handler
//! may subscribe, unsubscribe or emit again without deadlocking.
//!
//! Three kinds of subscription exist:
//! - `on(name, ..)`: fires on every emission of `name`
//! - `once(name, ..)`: fires on the next emission of `name`, then is removed
//! - `on_any(..)`: the `"*"` subscription, fires for every name

use parking_lot::Mutex;
use pk_protocol::ipc::names;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Handle returned by every registration, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Handler<A> = Arc<dyn Fn(&A) + Send + Sync>;
type AnyHandler<A> = Arc<dyn Fn(&str, &A) + Send + Sync>;

struct Listeners<A> {
    next_id: u64,
    on: HashMap<String, Vec<(SubscriptionId, Handler<A>)>>,
    once: HashMap<String, Vec<(SubscriptionId, Handler<A>)>>,
    any: Vec<(SubscriptionId, AnyHandler<A>)>,
}

impl<A> Listeners<A> {
    fn next_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }
}

/// A cloneable handle to a shared set of subscriptions.
///
/// Clones share the same listeners, so a clone handed to another task can
/// emit to subscribers registered through the original.
pub struct EventEmitter<A> {
    listeners: Arc<Mutex<Listeners<A>>>,
}

impl<A> Clone for EventEmitter<A> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<A> Default for EventEmitter<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for EventEmitter<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock();
        f.debug_struct("EventEmitter")
            .field("events", &listeners.on.keys().collect::<Vec<_>>())
            .field("once", &listeners.once.keys().collect::<Vec<_>>())
            .field("any", &listeners.any.len())
            .finish()
    }
}

impl<A> EventEmitter<A> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                on: HashMap::new(),
                once: HashMap::new(),
                any: Vec::new(),
            })),
        }
    }

    /// Subscribe to every emission of `name`.
    pub fn on<F>(&self, name: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock();
        let id = listeners.next_id();
        listeners
            .on
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Subscribe to the next emission of `name` only.
    pub fn once<F>(&self, name: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock();
        let id = listeners.next_id();
        listeners
            .once
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Subscribe to every emission regardless of name.
    pub fn on_any<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&str, &A) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.lock();
        let id = listeners.next_id();
        listeners.any.push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    ///
    /// Wildcard subscriptions are removed with the `"*"` name.
    pub fn off(&self, name: &str, id: SubscriptionId) -> bool {
        let mut guard = self.listeners.lock();
        let listeners = &mut *guard;

        if name == names::ANY {
            let before = listeners.any.len();
            listeners.any.retain(|(sub, _)| *sub != id);
            return listeners.any.len() != before;
        }

        let mut removed = false;
        for table in [&mut listeners.on, &mut listeners.once] {
            if let Some(handlers) = table.get_mut(name) {
                let before = handlers.len();
                handlers.retain(|(sub, _)| *sub != id);
                removed |= handlers.len() != before;
                if handlers.is_empty() {
                    table.remove(name);
                }
            }
        }
        removed
    }

    /// Deliver `args` to every handler subscribed to `name`, then to every
    /// wildcard handler.
    ///
    /// One-shot handlers are detached before any handler runs, so they fire
    /// at most once even if a handler re-emits the same event.
    pub fn emit(&self, name: &str, args: A) {
        let (once, on, any) = {
            let mut listeners = self.listeners.lock();
            let once = listeners.once.remove(name).unwrap_or_default();
            let on = listeners.on.get(name).cloned().unwrap_or_default();
            let any = listeners.any.clone();
            (once, on, any)
        };

        for (_, handler) in once.iter().chain(on.iter()) {
            handler(&args);
        }
        for (_, handler) in &any {
            handler(name, &args);
        }
    }

    /// Drop every subscription.
    pub fn stop_listening(&self) {
        let mut listeners = self.listeners.lock();
        listeners.on.clear();
        listeners.once.clear();
        listeners.any.clear();
    }

    /// Number of handlers that would receive an emission of `name`,
    /// wildcard subscriptions included.
    pub fn listener_count(&self, name: &str) -> usize {
        let listeners = self.listeners.lock();
        let named = |table: &HashMap<String, Vec<(SubscriptionId, Handler<A>)>>| {
            table.get(name).map_or(0, Vec::len)
        };
        named(&listeners.on) + named(&listeners.once) + listeners.any.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&i32) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&count);
        (count, move |_: &i32| {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_on_fires_for_every_emission() {
        let emitter = EventEmitter::new();
        let (count, handler) = counter();
        emitter.on("tick", handler);

        emitter.emit("tick", 1);
        emitter.emit("tick", 2);
        emitter.emit("other", 3);

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_once_fires_at_most_once() {
        let emitter = EventEmitter::new();
        let (count, handler) = counter();
        emitter.once("tick", handler);

        emitter.emit("tick", 1);
        emitter.emit("tick", 2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count("tick"), 0);
    }

    #[test]
    fn test_once_is_detached_before_reentrant_emit() {
        let emitter: EventEmitter<i32> = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));

        let inner = emitter.clone();
        let seen = Arc::clone(&count);
        emitter.once("tick", move |n| {
            seen.fetch_add(1, Ordering::SeqCst);
            if *n == 0 {
                inner.emit("tick", 1);
            }
        });

        emitter.emit("tick", 0);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wildcard_receives_name_and_args() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        emitter.on_any(move |name, n: &i32| sink.lock().push((name.to_string(), *n)));

        emitter.emit("a", 1);
        emitter.emit("b", 2);

        assert_eq!(
            *seen.lock(),
            vec![("a".to_string(), 1), ("b".to_string(), 2)]
        );
    }

    #[test]
    fn test_off_removes_single_subscription() {
        let emitter = EventEmitter::new();
        let (first, handler_a) = counter();
        let (second, handler_b) = counter();
        let id = emitter.on("tick", handler_a);
        emitter.on("tick", handler_b);

        assert!(emitter.off("tick", id));
        assert!(!emitter.off("tick", id));
        emitter.emit("tick", 1);

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_removes_once_subscription() {
        let emitter = EventEmitter::new();
        let (count, handler) = counter();
        let id = emitter.once("tick", handler);
        emitter.on("tick", |_| {});

        assert!(emitter.off("tick", id));
        assert_eq!(emitter.listener_count("tick"), 1);
        emitter.emit("tick", 1);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!emitter.off("tick", id));
    }

    #[test]
    fn test_off_wildcard() {
        let emitter = EventEmitter::<i32>::new();
        let id = emitter.on_any(|_, _| {});
        assert_eq!(emitter.listener_count("anything"), 1);
        assert!(emitter.off(names::ANY, id));
        assert_eq!(emitter.listener_count("anything"), 0);
    }

    #[test]
    fn test_stop_listening_clears_everything() {
        let emitter = EventEmitter::new();
        let (count, handler) = counter();
        emitter.on("tick", handler);
        emitter.once("tick", |_| {});
        emitter.on_any(|_, _| {});

        emitter.stop_listening();
        emitter.emit("tick", 1);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(emitter.listener_count("tick"), 0);
    }

    #[test]
    fn test_handler_may_subscribe_during_emit() {
        let emitter: EventEmitter<i32> = EventEmitter::new();
        let inner = emitter.clone();
        emitter.on("tick", move |_| {
            inner.on("tock", |_| {});
        });

        emitter.emit("tick", 1);
        assert_eq!(emitter.listener_count("tock"), 1);
    }
}
