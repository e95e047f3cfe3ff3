//! Inversion-of-control listening.
//!
//! `listener.listen_to(source, ...)` binds a callback on `source` with the
//! listener as context and records the relation on both sides: the listener
//! tracks which events it bound on which source, and the source keeps a
//! reverse index of who listens to it. Either side can then tear the binding
//! down (`stop_listening` on the listener, `off` on the source) and both sides
//! end up consistent.
//!
//! Both directions hold weak references, so listening never keeps an object
//! alive.

use crate::callback::Callback;
use crate::emitter::{EmitterId, EmitterInner, EventEmitter, EventRegistry, Events, Handler};
use crate::utils::split_names;
use dashmap::DashMap;
use std::sync::Weak;
use tracing::debug;

/// What one listener bound on one source
pub(crate) struct ListeningRelation {
    source: Weak<EmitterInner>,
    events: EventRegistry,
}

impl ListeningRelation {
    fn new(source: &EventEmitter) -> Self {
        Self {
            source: source.downgrade(),
            events: EventRegistry::default(),
        }
    }
}

#[derive(Default)]
pub(crate) struct ListeningRegistry {
    /// Relations this object holds, keyed by source id
    listening_to: DashMap<EmitterId, ListeningRelation>,
    /// Objects listening to this one, keyed by listener id
    listeners: DashMap<EmitterId, Weak<EmitterInner>>,
}

impl ListeningRegistry {
    pub(crate) fn listener_ids(&self) -> Vec<EmitterId> {
        self.listeners.iter().map(|entry| *entry.key()).collect()
    }

    /// Resolve a listener, dropping the entry if it no longer exists
    pub(crate) fn listener(&self, id: EmitterId) -> Option<EventEmitter> {
        let inner = self.listeners.get(&id).map(|weak| weak.upgrade())?;
        match inner {
            Some(inner) => Some(EventEmitter::from_inner(inner)),
            None => {
                self.listeners.remove(&id);
                None
            }
        }
    }
}

/// Prune the listener's relations matching the filters.
///
/// With `off_events` the matching handlers are also removed from each source's
/// registry; `off` passes `false` because it already did that itself.
pub(crate) fn internal_stop_listening(
    listener: &EventEmitter,
    source: Option<EmitterId>,
    name: Option<&str>,
    callback: Option<&Callback>,
    off_events: bool,
) {
    let registry = &listener.inner.listening;
    let ids: Vec<EmitterId> = match source {
        Some(id) => vec![id],
        None => registry.listening_to.iter().map(|entry| *entry.key()).collect(),
    };

    for id in ids {
        let source = match registry.listening_to.get(&id) {
            Some(relation) => relation.source.upgrade().map(EventEmitter::from_inner),
            None => continue,
        };

        let Some(source) = source else {
            registry.listening_to.remove(&id);
            continue;
        };

        if off_events {
            source.inner.events.remove(name, callback, Some(listener.id()));
        }

        let emptied = registry
            .listening_to
            .remove_if_mut(&id, |_, relation| {
                relation.events.remove(name, callback, None);
                relation.events.is_empty()
            })
            .is_some();

        if emptied {
            source.inner.listening.listeners.remove(&listener.id());
            debug!("🔕 {} stopped listening to {}", listener.id(), id);
        }
    }
}

impl EventEmitter {
    /// Tell this object to listen to events on `source`, keeping track of the
    /// binding so it can be removed later without remembering `source`.
    ///
    /// A `None` source is a no-op.
    pub fn listen_to(&self, source: Option<&EventEmitter>, names: &str, callback: Callback) -> &Self {
        let Some(source) = source else {
            return self;
        };

        let listening = &self.inner.listening;
        if !listening.listening_to.contains_key(&source.id()) {
            listening
                .listening_to
                .insert(source.id(), ListeningRelation::new(source));
            source
                .inner
                .listening
                .listeners
                .insert(self.id(), self.downgrade());
            debug!("👂 {} started listening to {}", self.id(), source.id());
        }

        source.on(names, callback.clone(), Some(self.id()));

        if let Some(relation) = listening.listening_to.get(&source.id()) {
            for name in split_names(names) {
                relation.events.add(name, Handler::new(callback.clone(), None));
            }
        }

        self
    }

    /// Like [`EventEmitter::listen_to`], but each binding runs at most once and
    /// drops its tracked relation when it fires.
    pub fn listen_to_once(
        &self,
        source: Option<&EventEmitter>,
        names: &str,
        callback: Callback,
    ) -> &Self {
        let Some(source) = source else {
            return self;
        };

        for name in split_names(names) {
            let listener = self.downgrade();
            let target = source.downgrade();
            let event = name.to_string();
            let wrapper = Callback::once(callback.clone(), move |me| {
                if let (Some(listener), Some(target)) = (listener.upgrade(), target.upgrade()) {
                    EventEmitter::from_inner(listener).stop_listening(
                        Some(&EventEmitter::from_inner(target)),
                        Some(&event),
                        Some(me),
                    );
                }
            });
            self.listen_to(Some(source), name, wrapper);
        }

        self
    }

    /// Stop listening to specific events on `source`, or to everything this
    /// object listens to when `source` is `None`.
    pub fn stop_listening(
        &self,
        source: Option<&EventEmitter>,
        name: Option<&str>,
        callback: Option<&Callback>,
    ) -> &Self {
        internal_stop_listening(self, source.map(EventEmitter::id), name, callback, true);
        self
    }

    pub fn is_listening_to(&self, source: &EventEmitter) -> bool {
        self.inner.listening.listening_to.contains_key(&source.id())
    }

    /// Number of sources this object currently listens to
    pub fn listening_count(&self) -> usize {
        self.inner.listening.listening_to.len()
    }

    /// Number of objects currently listening to this one
    pub fn listener_count(&self) -> usize {
        self.inner.listening.listeners.len()
    }

    /// Event names this object tracks on `source`, sorted
    pub fn tracked_events(&self, source: &EventEmitter) -> Vec<String> {
        self.inner
            .listening
            .listening_to
            .get(&source.id())
            .map(|relation| relation.events.names())
            .unwrap_or_default()
    }
}

/// Listening capability for types that own an [`EventEmitter`]
pub trait Listening: Events {
    fn listen_to<S>(&self, source: Option<&S>, names: &str, callback: Callback) -> &Self
    where
        S: Events + ?Sized,
    {
        self.emitter()
            .listen_to(source.map(|s| s.emitter()), names, callback);
        self
    }

    fn listen_to_once<S>(&self, source: Option<&S>, names: &str, callback: Callback) -> &Self
    where
        S: Events + ?Sized,
    {
        self.emitter()
            .listen_to_once(source.map(|s| s.emitter()), names, callback);
        self
    }

    fn stop_listening<S>(
        &self,
        source: Option<&S>,
        name: Option<&str>,
        callback: Option<&Callback>,
    ) -> &Self
    where
        S: Events + ?Sized,
    {
        self.emitter()
            .stop_listening(source.map(|s| s.emitter()), name, callback);
        self
    }
}

impl Listening for EventEmitter {}
