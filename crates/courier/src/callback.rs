//! Shared, comparable callback handles
//!
//! Handlers are stored in several registries at once (the source's event
//! registry, the listener's relation index, the messenger's reverse index), so
//! they are reference counted and compared by identity rather than by value.

use crate::bus::Envelope;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

type EventFn = dyn Fn(&[Value]) + Send + Sync;
type MessageFn = dyn Fn(&Value, &Envelope) + Send + Sync;
type AccessorFn = dyn Fn(&[Value]) -> Value + Send + Sync;

fn same_fn<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Local event handler invoked with the arguments passed to `trigger`.
///
/// Two callbacks are equal when they share an allocation. A one-shot wrapper
/// also remembers the callback it wraps, so removing the original removes the
/// wrapper too.
#[derive(Clone)]
pub struct Callback {
    func: Arc<EventFn>,
    wrapped: Option<Arc<EventFn>>,
}

impl Callback {
    /// Wrap a closure as an event callback
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(f),
            wrapped: None,
        }
    }

    /// Invoke the callback
    pub fn call(&self, args: &[Value]) {
        (self.func)(args)
    }

    /// Whether `filter` identifies this callback, either directly or as the
    /// callback a one-shot wrapper was built around.
    pub fn matches(&self, filter: &Callback) -> bool {
        same_fn(&self.func, &filter.func)
            || self
                .wrapped
                .as_ref()
                .is_some_and(|wrapped| same_fn(wrapped, &filter.func))
    }

    /// Build a wrapper that runs `callback` at most once.
    ///
    /// On the first call the wrapper hands itself to `offer` (which is expected
    /// to unregister it) and only then invokes the original. Later calls,
    /// including reentrant ones made from inside the original, do nothing.
    pub(crate) fn once<O>(callback: Callback, offer: O) -> Callback
    where
        O: Fn(&Callback) + Send + Sync + 'static,
    {
        let fired = AtomicBool::new(false);
        let slot: Arc<OnceLock<Weak<EventFn>>> = Arc::new(OnceLock::new());
        let own = slot.clone();
        let original = callback.clone();

        let func: Arc<EventFn> = Arc::new(move |args: &[Value]| {
            if fired.swap(true, Ordering::SeqCst) {
                return;
            }
            if let Some(func) = own.get().and_then(Weak::upgrade) {
                offer(&Callback {
                    func,
                    wrapped: Some(original.func.clone()),
                });
            }
            original.call(args);
        });
        let _ = slot.set(Arc::downgrade(&func));

        Callback {
            func,
            wrapped: Some(callback.func),
        }
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        same_fn(&self.func, &other.func)
    }
}

impl Eq for Callback {}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("ptr", &(Arc::as_ptr(&self.func) as *const ()))
            .field("once", &self.wrapped.is_some())
            .finish()
    }
}

/// Bus message handler, invoked with `(data, envelope)`
#[derive(Clone)]
pub struct MessageCallback(Arc<MessageFn>);

impl MessageCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &Envelope) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, data: &Value, envelope: &Envelope) {
        (self.0)(data, envelope)
    }
}

impl PartialEq for MessageCallback {
    fn eq(&self, other: &Self) -> bool {
        same_fn(&self.0, &other.0)
    }
}

impl Eq for MessageCallback {}

impl fmt::Debug for MessageCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageCallback")
            .field(&(Arc::as_ptr(&self.0) as *const ()))
            .finish()
    }
}

/// Computes the published payload from the arguments of a local trigger
#[derive(Clone)]
pub struct Accessor(Arc<AccessorFn>);

impl Accessor {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Pass the first trigger argument through unchanged (`null` if absent)
    pub fn identity() -> Self {
        Self::new(|args| args.first().cloned().unwrap_or(Value::Null))
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }
}

impl Default for Accessor {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Accessor")
            .field(&(Arc::as_ptr(&self.0) as *const ()))
            .finish()
    }
}
