//! Handle scopes
//!
//! Every wrapper created through the isolate is tracked by the innermost
//! open scope and released when that scope pops. Scopes are strictly
//! nested; the RAII guards in this module pop on every exit path.

use qv8_core::JsHandle;
use std::ops::{Deref, DerefMut};

use crate::error::{IsolateError, IsolateResult, UsageError};
use crate::isolate::Isolate;
use crate::local::{HandleArena, HandleId, Local, LocalRepr};

/// Flavor of an open scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleScopeKind {
    Normal,
    /// May hand one of its values to the enclosing scope
    Escapable,
    /// Forbids creating handles until closed
    Sealed,
}

/// Identity of an open scope, checked on pop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeToken(pub(crate) u64);

/// Snapshot of the innermost scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleScopeInfo {
    pub kind: HandleScopeKind,
    pub token: ScopeToken,
    pub tracked: usize,
}

struct ScopeFrame {
    kind: HandleScopeKind,
    token: ScopeToken,
    handles: Vec<HandleId>,
}

/// The isolate's stack of open scopes and the wrappers they own
#[derive(Default)]
pub(crate) struct ScopeStack {
    frames: Vec<ScopeFrame>,
    arena: HandleArena,
}

impl ScopeStack {
    pub fn push(&mut self, kind: HandleScopeKind, token: ScopeToken) {
        self.frames.push(ScopeFrame {
            kind,
            token,
            handles: Vec::new(),
        });
    }

    /// Pop the innermost scope, releasing its wrappers
    pub fn pop(&mut self, token: ScopeToken) -> Result<usize, UsageError> {
        match self.frames.last() {
            Some(frame) if frame.token == token => {}
            Some(frame) => {
                return Err(UsageError::HandleScopeMismatch {
                    expected: frame.token.0,
                    found: token.0,
                });
            }
            None => return Err(UsageError::NoActiveHandleScope),
        }

        let Some(frame) = self.frames.pop() else {
            return Err(UsageError::NoActiveHandleScope);
        };
        let released = frame.handles.len();
        for id in frame.handles {
            drop(self.arena.remove(id));
        }
        Ok(released)
    }

    pub fn track(&mut self, handle: JsHandle) -> Result<HandleId, UsageError> {
        let frame = self
            .frames
            .last_mut()
            .ok_or(UsageError::NoActiveHandleScope)?;
        if frame.kind == HandleScopeKind::Sealed {
            return Err(UsageError::SealedHandleScope);
        }
        let id = self.arena.insert(handle);
        frame.handles.push(id);
        Ok(id)
    }

    /// True when a new wrapper could be tracked right now
    pub fn accepts(&self) -> Result<(), UsageError> {
        match self.frames.last() {
            None => Err(UsageError::NoActiveHandleScope),
            Some(frame) if frame.kind == HandleScopeKind::Sealed => {
                Err(UsageError::SealedHandleScope)
            }
            Some(_) => Ok(()),
        }
    }

    /// Move `id` from the innermost scope to its parent
    ///
    /// Returns false when the innermost scope does not own `id`.
    pub fn escape(&mut self, id: HandleId) -> Result<bool, UsageError> {
        let depth = self.frames.len();
        if depth < 2 {
            return Err(UsageError::EscapeFromOutermostScope);
        }
        let current = &mut self.frames[depth - 1];
        let Some(position) = current.handles.iter().position(|tracked| *tracked == id) else {
            return Ok(false);
        };
        current.handles.remove(position);
        self.frames[depth - 2].handles.push(id);
        Ok(true)
    }

    pub fn get(&self, id: HandleId) -> Option<&JsHandle> {
        self.arena.get(id)
    }

    pub fn current(&self) -> Option<HandleScopeInfo> {
        self.frames.last().map(|frame| HandleScopeInfo {
            kind: frame.kind,
            token: frame.token,
            tracked: frame.handles.len(),
        })
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn tracked(&self) -> usize {
        self.arena.len()
    }

    /// Drop all frames and wrappers
    pub fn clear(&mut self) -> usize {
        self.frames.clear();
        self.arena.clear()
    }
}

impl Isolate {
    /// Open a scope; the returned token must be passed to [`Isolate::pop_handle_scope`]
    pub fn push_handle_scope(&mut self, kind: HandleScopeKind) -> ScopeToken {
        let token = ScopeToken(self.next_token());
        self.scopes.push(kind, token);
        tracing::trace!(target: "qv8", ?kind, token = token.0, "push handle scope");
        token
    }

    /// Close the innermost scope and release everything it tracks
    pub fn pop_handle_scope(&mut self, token: ScopeToken) -> IsolateResult<usize> {
        let released = self.scopes.pop(token).map_err(|err| self.usage_error(err))?;
        tracing::trace!(target: "qv8", token = token.0, released, "pop handle scope");
        Ok(released)
    }

    /// Innermost open scope
    pub fn current_handle_scope(&self) -> Option<HandleScopeInfo> {
        self.scopes.current()
    }

    /// Number of open scopes
    pub fn handle_scope_depth(&self) -> usize {
        self.scopes.depth()
    }

    /// Move a value into the enclosing scope so it survives the current one
    pub fn escape(&mut self, value: Local) -> IsolateResult<Local> {
        match value.0 {
            LocalRepr::Scoped(id) => {
                if self.scopes.get(id).is_none() {
                    return Err(IsolateError::StaleHandle);
                }
                self.scopes.escape(id).map_err(|err| self.usage_error(err))?;
                Ok(value)
            }
            // Roots and eternals outlive every scope
            LocalRepr::Root(_) | LocalRepr::Eternal(_) => {
                if self.scopes.depth() < 2 {
                    return Err(self.usage_error(UsageError::EscapeFromOutermostScope));
                }
                Ok(value)
            }
        }
    }

    /// Track a wrapper in the innermost scope
    pub(crate) fn track(&mut self, handle: JsHandle) -> IsolateResult<Local> {
        let id = self.scopes.track(handle).map_err(|err| self.usage_error(err))?;
        Ok(Local::scoped(id))
    }

    /// Fail early when no wrapper could be tracked
    pub(crate) fn ensure_scope(&self) -> IsolateResult<()> {
        self.scopes.accepts().map_err(|err| self.usage_error(err))
    }
}

/// A scope popped on drop
pub struct HandleScope<'i> {
    isolate: &'i mut Isolate,
    token: ScopeToken,
}

impl<'i> HandleScope<'i> {
    pub fn new(isolate: &'i mut Isolate) -> Self {
        let token = isolate.push_handle_scope(HandleScopeKind::Normal);
        Self { isolate, token }
    }

    pub fn token(&self) -> ScopeToken {
        self.token
    }
}

/// A scope that can pass one value to its parent
pub struct EscapableHandleScope<'i> {
    isolate: &'i mut Isolate,
    token: ScopeToken,
}

impl<'i> EscapableHandleScope<'i> {
    pub fn new(isolate: &'i mut Isolate) -> Self {
        let token = isolate.push_handle_scope(HandleScopeKind::Escapable);
        Self { isolate, token }
    }

    /// Keep `value` alive in the enclosing scope
    pub fn escape(&mut self, value: Local) -> IsolateResult<Local> {
        self.isolate.escape(value)
    }
}

/// A region in which creating handles is an error
pub struct SealHandleScope<'i> {
    isolate: &'i mut Isolate,
    token: ScopeToken,
}

impl<'i> SealHandleScope<'i> {
    pub fn new(isolate: &'i mut Isolate) -> Self {
        let token = isolate.push_handle_scope(HandleScopeKind::Sealed);
        Self { isolate, token }
    }
}

macro_rules! scope_guard {
    ($($guard:ident),*) => {$(
        impl Deref for $guard<'_> {
            type Target = Isolate;

            fn deref(&self) -> &Isolate {
                self.isolate
            }
        }

        impl DerefMut for $guard<'_> {
            fn deref_mut(&mut self) -> &mut Isolate {
                self.isolate
            }
        }

        impl Drop for $guard<'_> {
            fn drop(&mut self) {
                // Mismatches are already logged by pop_handle_scope
                let _ = self.isolate.pop_handle_scope(self.token);
            }
        }
    )*};
}

scope_guard!(HandleScope, EscapableHandleScope, SealHandleScope);
