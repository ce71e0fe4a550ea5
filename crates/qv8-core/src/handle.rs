//! Owning wrapper around one engine value reference
//!
//! Every wrapper holds exactly one engine reference. Creating a wrapper
//! acquires it, dropping the wrapper releases it. A shared
//! [`HandleCounters`] records both so leaks show up as a non-zero
//! [`HandleCounters::live`].

use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Persistent, Value};
use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::{CoreError, CoreResult};

/// How the owner of a wrapper intends to keep it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// Tracked by a handle scope, released when the scope pops
    Ordinary,
    /// Owned by the embedder or by isolate bookkeeping
    PersistentValue,
    /// Lives until the isolate is disposed
    Eternal,
}

/// Acquire/release bookkeeping shared by all wrappers of one isolate
#[derive(Debug, Default)]
pub struct HandleCounters {
    acquired: Cell<u64>,
    released: Cell<u64>,
}

impl HandleCounters {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Total references acquired
    pub fn acquired(&self) -> u64 {
        self.acquired.get()
    }

    /// Total references released
    pub fn released(&self) -> u64 {
        self.released.get()
    }

    /// References currently held
    pub fn live(&self) -> u64 {
        self.acquired.get() - self.released.get()
    }

    fn on_acquire(&self) {
        self.acquired.set(self.acquired.get() + 1);
    }

    fn on_release(&self) {
        self.released.set(self.released.get() + 1);
    }
}

/// A JavaScript value with one engine reference held
///
/// The reference outlives any single `Context::with` call, so a handle
/// can be stored in isolate bookkeeping and restored later.
///
/// # Thread Safety
///
/// This type is `!Send` and `!Sync`. The engine runtime it references
/// belongs to one thread at a time.
pub struct JsHandle {
    value: Persistent<Value<'static>>,
    kind: HandleKind,
    counters: Rc<HandleCounters>,
    _not_send: PhantomData<*mut ()>,
}

impl fmt::Debug for JsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsHandle").field("kind", &self.kind).finish()
    }
}

impl JsHandle {
    /// Take a reference to `value`
    pub fn new<'js>(
        ctx: &Ctx<'js>,
        value: Value<'js>,
        kind: HandleKind,
        counters: &Rc<HandleCounters>,
    ) -> Self {
        counters.on_acquire();
        Self {
            value: Persistent::save(ctx, value),
            kind,
            counters: counters.clone(),
            _not_send: PhantomData,
        }
    }

    /// A second, independently owned reference to the same value
    pub fn acquire(&self, kind: HandleKind) -> Self {
        self.counters.on_acquire();
        Self {
            value: self.value.clone(),
            kind,
            counters: self.counters.clone(),
            _not_send: PhantomData,
        }
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    /// Borrow the value inside an engine call
    pub fn restore<'js>(&self, ctx: &Ctx<'js>) -> CoreResult<Value<'js>> {
        Ok(self.value.clone().restore(ctx)?)
    }

    /// True when both handles reference the same counters, i.e. the same isolate
    pub fn same_owner(&self, other: &JsHandle) -> bool {
        Rc::ptr_eq(&self.counters, &other.counters)
    }
}

impl Drop for JsHandle {
    fn drop(&mut self) {
        self.counters.on_release();
    }
}

/// Extract a structured error from a thrown value
///
/// Error objects keep their `name`, `message` and `stack`; anything else
/// thrown is converted with ToString.
pub fn describe_error<'js>(value: &Value<'js>) -> CoreError {
    if let Some(object) = value.as_object() {
        let error_type = object
            .get::<_, Option<Coerced<String>>>("name")
            .ok()
            .flatten()
            .map(|name| name.0)
            .unwrap_or_else(|| "Error".to_string());
        let message = object
            .get::<_, Option<Coerced<String>>>("message")
            .ok()
            .flatten()
            .map(|message| message.0)
            .unwrap_or_default();
        let stack = object
            .get::<_, Option<Coerced<String>>>("stack")
            .ok()
            .flatten()
            .map(|stack| stack.0)
            .filter(|stack| !stack.is_empty());
        return CoreError::ScriptError {
            error_type,
            message,
            stack,
        };
    }

    let message = value
        .get::<Coerced<String>>()
        .map(|text| text.0)
        .unwrap_or_else(|_| "Unknown error".to_string());
    CoreError::script_error("Error", message)
}
