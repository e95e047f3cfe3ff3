//! Per-object event registry with synchronous dispatch
//!
//! An [`EventEmitter`] owns a registry mapping event names to ordered handler
//! lists. Registration order is dispatch order, and handlers bound to the
//! reserved `"all"` event see every trigger with the real event name prepended
//! to their arguments.
//!
//! Dispatch always works on a snapshot of the handler lists taken when
//! `trigger` starts, so handlers may freely call `on`/`off`/`stop_listening`
//! on the emitter that is currently dispatching.

use crate::callback::Callback;
use crate::listening::{internal_stop_listening, ListeningRegistry};
use crate::utils::{split_names, ALL_EVENTS};
use dashmap::DashMap;
use serde_json::Value;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Stable identity of an emitter, used as handler context and for relation
/// lookups. Identifiers are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EmitterId(u64);

impl EmitterId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

/// A registered callback and the context it was bound with
#[derive(Debug, Clone)]
pub(crate) struct Handler {
    pub(crate) callback: Callback,
    pub(crate) context: Option<EmitterId>,
}

impl Handler {
    pub(crate) fn new(callback: Callback, context: Option<EmitterId>) -> Self {
        Self { callback, context }
    }

    /// A handler is selected iff every supplied filter matches it
    fn is_selected(&self, callback: Option<&Callback>, context: Option<EmitterId>) -> bool {
        callback.map_or(true, |cb| self.callback.matches(cb))
            && context.map_or(true, |ctx| self.context == Some(ctx))
    }
}

pub(crate) type Handlers = SmallVec<[Handler; 4]>;

/// Event name to ordered handlers. Names never map to an empty list.
#[derive(Default)]
pub(crate) struct EventRegistry {
    events: DashMap<String, Handlers>,
}

impl EventRegistry {
    pub(crate) fn add(&self, name: &str, handler: Handler) {
        self.events.entry(name.to_string()).or_default().push(handler);
    }

    /// Remove handlers selected by the filters, returning how many went away.
    ///
    /// `name` may hold several whitespace-separated names; `None` means every
    /// registered event. Without `callback` and `context` every handler of the
    /// named events is removed.
    pub(crate) fn remove(
        &self,
        name: Option<&str>,
        callback: Option<&Callback>,
        context: Option<EmitterId>,
    ) -> usize {
        let names: Vec<String> = match name {
            Some(names) => split_names(names).map(str::to_string).collect(),
            None => self.names(),
        };

        let mut removed = 0;
        for name in names {
            self.events.remove_if_mut(&name, |_, handlers| {
                let before = handlers.len();
                if callback.is_none() && context.is_none() {
                    handlers.clear();
                } else {
                    handlers.retain(|handler| !handler.is_selected(callback, context));
                }
                removed += before - handlers.len();
                handlers.is_empty()
            });
        }
        removed
    }

    pub(crate) fn snapshot(&self, name: &str) -> Option<Handlers> {
        self.events.get(name).map(|handlers| handlers.value().clone())
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.events.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub(crate) fn count(&self, name: &str) -> usize {
        self.events.get(name).map(|handlers| handlers.len()).unwrap_or(0)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub(crate) struct EmitterInner {
    pub(crate) id: EmitterId,
    pub(crate) events: EventRegistry,
    pub(crate) listening: ListeningRegistry,
}

/// Handle to an object's event registry.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone)]
pub struct EventEmitter {
    pub(crate) inner: Arc<EmitterInner>,
}

impl EventEmitter {
    /// Create an emitter with an empty registry and a fresh identity
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                id: EmitterId::next(),
                events: EventRegistry::default(),
                listening: ListeningRegistry::default(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<EmitterInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<EmitterInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn id(&self) -> EmitterId {
        self.inner.id
    }

    /// Bind `callback` to one or more whitespace-separated event names.
    ///
    /// Passing `"all"` binds the callback to every event fired.
    pub fn on(&self, names: &str, callback: Callback, context: Option<EmitterId>) -> &Self {
        for name in split_names(names) {
            self.inner
                .events
                .add(name, Handler::new(callback.clone(), context));
            debug!("📝 {} registered handler for '{}'", self.id(), name);
        }
        self
    }

    /// Bind every `name -> callback` pair of a map, all with the same context
    pub fn on_map<I, S>(&self, map: I, context: Option<EmitterId>) -> &Self
    where
        I: IntoIterator<Item = (S, Callback)>,
        S: AsRef<str>,
    {
        for (names, callback) in map {
            self.on(names.as_ref(), callback, context);
        }
        self
    }

    /// Bind a callback that runs at most once per event name; it is removed
    /// right before its first invocation.
    pub fn once(&self, names: &str, callback: Callback, context: Option<EmitterId>) -> &Self {
        for name in split_names(names) {
            let emitter = self.downgrade();
            let event = name.to_string();
            let wrapper = Callback::once(callback.clone(), move |me| {
                if let Some(inner) = emitter.upgrade() {
                    EventEmitter::from_inner(inner).off(Some(&event), Some(me), None);
                }
            });
            self.on(name, wrapper, context);
        }
        self
    }

    /// Remove callbacks.
    ///
    /// With no arguments every handler of every event is removed. With only
    /// `name`, all handlers of that event. With `callback` and/or `context`,
    /// only handlers matching every supplied filter. Listeners whose relations
    /// depended on the removed bindings are pruned as well.
    pub fn off(
        &self,
        name: Option<&str>,
        callback: Option<&Callback>,
        context: Option<EmitterId>,
    ) -> &Self {
        let removed = self.inner.events.remove(name, callback, context);
        if removed > 0 {
            debug!(
                "🗑️ {} removed {} handler(s) for {}",
                self.id(),
                removed,
                name.unwrap_or("every event")
            );
        }

        // Listeners always bind themselves as the context, so a context
        // narrows the search down to that listener.
        let listeners = match context {
            Some(id) => vec![id],
            None => self.inner.listening.listener_ids(),
        };
        for id in listeners {
            if let Some(listener) = self.inner.listening.listener(id) {
                internal_stop_listening(&listener, Some(self.id()), name, callback, false);
            }
        }

        self
    }

    /// Fire one or more whitespace-separated events.
    ///
    /// Every handler bound to the event runs with `args`, in registration
    /// order, followed by every `"all"` handler with the event name prepended.
    pub fn trigger(&self, names: &str, args: &[Value]) -> &Self {
        for name in split_names(names) {
            let handlers = self.inner.events.snapshot(name);
            let all = self.inner.events.snapshot(ALL_EVENTS);

            trace!(
                "📤 {} triggering '{}' ({} handler(s), {} catch-all)",
                self.id(),
                name,
                handlers.as_ref().map_or(0, |h| h.len()),
                all.as_ref().map_or(0, |h| h.len())
            );

            if let Some(handlers) = handlers {
                for handler in handlers.iter() {
                    handler.callback.call(args);
                }
            }

            if let Some(all) = all {
                let mut named = Vec::with_capacity(args.len() + 1);
                named.push(Value::from(name));
                named.extend_from_slice(args);
                for handler in all.iter() {
                    handler.callback.call(&named);
                }
            }
        }
        self
    }

    pub fn has_handlers(&self, name: &str) -> bool {
        self.inner.events.count(name) > 0
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.inner.events.count(name)
    }

    /// Names with at least one handler, sorted
    pub fn event_names(&self) -> Vec<String> {
        self.inner.events.names()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for EventEmitter {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for EventEmitter {}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("id", &self.id())
            .field("events", &self.event_names())
            .field("listening_to", &self.listening_count())
            .finish()
    }
}

/// Event capability for types that own an [`EventEmitter`].
///
/// Implementors only provide [`Events::emitter`]; every operation forwards to
/// the owned registry and returns `self` for chaining.
pub trait Events {
    fn emitter(&self) -> &EventEmitter;

    fn emitter_id(&self) -> EmitterId {
        self.emitter().id()
    }

    fn on(&self, names: &str, callback: Callback, context: Option<EmitterId>) -> &Self {
        self.emitter().on(names, callback, context);
        self
    }

    fn once(&self, names: &str, callback: Callback, context: Option<EmitterId>) -> &Self {
        self.emitter().once(names, callback, context);
        self
    }

    fn off(
        &self,
        name: Option<&str>,
        callback: Option<&Callback>,
        context: Option<EmitterId>,
    ) -> &Self {
        self.emitter().off(name, callback, context);
        self
    }

    fn trigger(&self, names: &str, args: &[Value]) -> &Self {
        self.emitter().trigger(names, args);
        self
    }
}

impl Events for EventEmitter {
    fn emitter(&self) -> &EventEmitter {
        self
    }
}
