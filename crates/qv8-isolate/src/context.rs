//! Realms and the context stack
//!
//! Each context is a separate engine realm sharing the isolate's heap.
//! Entering a context makes it the realm later engine calls run in;
//! leaving restores the realm that was active before.

use qv8_core::HandleKind;
use rquickjs::Context;
use std::ops::{Deref, DerefMut};

use crate::bootstrap::install_globals;
use crate::error::{IsolateError, IsolateResult, UsageError};
use crate::isolate::{Isolate, Realm};
use crate::local::Local;

/// A realm created by [`Isolate::new_context`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub(crate) usize);

impl ContextId {
    /// The realm created together with the isolate
    pub const BOOTSTRAP: ContextId = ContextId(0);
}

#[derive(Debug, Clone, Copy)]
struct ContextEntry {
    context: ContextId,
    previous: ContextId,
}

/// Entered contexts, innermost last
#[derive(Debug)]
pub(crate) struct ContextStack {
    entries: Vec<ContextEntry>,
    active: ContextId,
}

impl ContextStack {
    pub fn new(bootstrap: ContextId) -> Self {
        Self {
            entries: vec![ContextEntry {
                context: bootstrap,
                previous: bootstrap,
            }],
            active: bootstrap,
        }
    }

    pub fn push(&mut self, context: ContextId) {
        self.entries.push(ContextEntry {
            context,
            previous: self.active,
        });
        self.active = context;
    }

    pub fn pop(&mut self) -> Result<ContextId, UsageError> {
        if self.entries.len() <= 1 {
            return Err(UsageError::PopOutermostContext);
        }
        let entry = self
            .entries
            .pop()
            .ok_or(UsageError::PopOutermostContext)?;
        self.active = entry.previous;
        Ok(entry.context)
    }

    pub fn active(&self) -> ContextId {
        self.active
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }
}

impl Isolate {
    pub(crate) fn realm(&self, id: ContextId) -> IsolateResult<&Realm> {
        self.realms
            .get(id.0)
            .ok_or_else(|| self.usage_error(UsageError::UnknownContext(id.0)))
    }

    /// Create a fresh realm with the global hooks installed
    pub fn new_context(&mut self) -> IsolateResult<ContextId> {
        let context = Context::full(&self.runtime)
            .map_err(|err| IsolateError::context_creation(err.to_string()))?;
        let outcome = self.enter_realm(&context, |ctx, isolate| {
            install_globals(ctx, isolate)?;
            Ok(isolate.wrap(ctx, ctx.globals().into_value(), HandleKind::PersistentValue))
        });
        let global = self.settle(outcome)?;

        let id = ContextId(self.realms.len());
        self.realms.push(Realm { context, global });
        tracing::debug!(target: "qv8", isolate = %self.id(), context = id.0, "context created");
        Ok(id)
    }

    /// Make `id` the current realm until the matching [`Isolate::pop_context`]
    pub fn push_context(&mut self, id: ContextId) -> IsolateResult<()> {
        self.realm(id)?;
        self.contexts.push(id);
        self.make_current();
        tracing::trace!(target: "qv8", context = id.0, depth = self.contexts.depth(), "enter context");
        Ok(())
    }

    /// Leave the innermost context, restoring the previous realm
    pub fn pop_context(&mut self) -> IsolateResult<ContextId> {
        let id = self.contexts.pop().map_err(|err| self.usage_error(err))?;
        tracing::trace!(target: "qv8", context = id.0, depth = self.contexts.depth(), "exit context");
        Ok(id)
    }

    pub fn current_context(&self) -> ContextId {
        self.contexts.active()
    }

    /// Entered contexts, counting the bootstrap realm
    pub fn context_depth(&self) -> usize {
        self.contexts.depth()
    }

    pub fn context_count(&self) -> usize {
        self.realms.len()
    }

    /// Global object of a realm
    pub fn context_global(&mut self, id: ContextId) -> IsolateResult<Local> {
        let global = self.realm(id)?.global.acquire(HandleKind::Ordinary);
        self.track(global)
    }

    /// Global object of the current realm
    pub fn global_object(&mut self) -> IsolateResult<Local> {
        self.context_global(self.current_context())
    }
}

/// Enters a context for its lifetime
pub struct ContextScope<'i> {
    isolate: &'i mut Isolate,
}

impl<'i> ContextScope<'i> {
    pub fn new(isolate: &'i mut Isolate, context: ContextId) -> IsolateResult<Self> {
        isolate.push_context(context)?;
        Ok(Self { isolate })
    }
}

impl Deref for ContextScope<'_> {
    type Target = Isolate;

    fn deref(&self) -> &Isolate {
        self.isolate
    }
}

impl DerefMut for ContextScope<'_> {
    fn deref_mut(&mut self) -> &mut Isolate {
        self.isolate
    }
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        let _ = self.isolate.pop_context();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_restores_previous() {
        let mut stack = ContextStack::new(ContextId::BOOTSTRAP);
        assert_eq!(stack.pop().unwrap_err(), UsageError::PopOutermostContext);

        stack.push(ContextId(1));
        stack.push(ContextId(2));
        assert_eq!(stack.active(), ContextId(2));
        assert_eq!(stack.depth(), 3);

        assert_eq!(stack.pop().unwrap(), ContextId(2));
        assert_eq!(stack.active(), ContextId(1));
        assert_eq!(stack.pop().unwrap(), ContextId(1));
        assert_eq!(stack.active(), ContextId::BOOTSTRAP);
    }

    #[test]
    fn test_same_context_entered_twice() {
        let mut stack = ContextStack::new(ContextId::BOOTSTRAP);
        stack.push(ContextId(1));
        stack.push(ContextId(1));
        stack.pop().unwrap();
        assert_eq!(stack.active(), ContextId(1));
    }
}
