//! The error channel and try-catch frames
//!
//! An isolate holds at most one current error. Failed engine calls put the
//! thrown value here; [`Isolate::try_report_error`] then either leaves it
//! for the innermost [`TryCatch`] or formats it and hands it to the
//! message callback.

use qv8_core::{HandleKind, JsHandle, display_string, new_string};
use rquickjs::{Ctx, Value};
use std::fmt::{self, Write};
use std::ops::{Deref, DerefMut};

use crate::error::{IsolateResult, UsageError};
use crate::handle_scope::HandleScopeKind;
use crate::isolate::Isolate;
use crate::local::Local;
use crate::port::LogLevel;

/// Error value reported for script stopped by `terminate_execution`
pub const TERMINATION_MESSAGE: &str = "Script Abort Requested";

/// Identity of an active try-catch frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TryCatchToken(u64);

/// A formatted uncaught error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// ToString of the thrown value
    pub text: String,
    /// `text` followed by one `# <index>: <frame>` line per stack frame
    pub stack: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stack.trim_end())
    }
}

#[derive(Debug, Default)]
pub(crate) struct ErrorChannel {
    current: Option<JsHandle>,
    try_catch: Option<TryCatchToken>,
}

impl ErrorChannel {
    pub fn set(&mut self, error: JsHandle) {
        self.current = Some(error);
    }

    pub fn take(&mut self) -> Option<JsHandle> {
        self.current.take()
    }

    pub fn current(&self) -> Option<&JsHandle> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn in_try_catch(&self) -> bool {
        self.try_catch.is_some()
    }
}

/// Split an engine stack value into frames
fn stack_frames<'js>(ctx: &Ctx<'js>, trace: &Value<'js>) -> IsolateResult<Vec<String>> {
    if let Some(array) = trace.as_array() {
        let mut frames = Vec::with_capacity(array.len());
        for index in 0..array.len() {
            let frame: Value = array.get(index)?;
            frames.push(display_string(ctx, &frame)?);
        }
        return Ok(frames);
    }
    if trace.is_string() {
        let text = display_string(ctx, trace)?;
        return Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect());
    }
    Ok(Vec::new())
}

impl Isolate {
    /// Render `value` as message text plus numbered stack frames
    fn describe<'js>(&self, ctx: &Ctx<'js>, value: &Value<'js>) -> IsolateResult<Message> {
        let text = display_string(ctx, value)?;
        let mut stack = format!("{text}\n");
        if let (Some(object), Some(key)) = (value.as_object(), self.stack_key.as_ref()) {
            let trace: Value = object.get(key.restore(ctx)?)?;
            if trace.is_string() {
                // Already rewritten by an earlier report
                let rendered = display_string(ctx, &trace)?;
                if rendered.starts_with(&stack) {
                    return Ok(Message { text, stack: rendered });
                }
            }
            for (index, frame) in stack_frames(ctx, &trace)?.iter().enumerate() {
                let _ = writeln!(stack, "# {index}: {frame}");
            }
        }
        Ok(Message { text, stack })
    }

    /// Replace the `stack` property of an error object with its formatted form
    fn write_stack<'js>(&self, ctx: &Ctx<'js>, value: &Value<'js>, formatted: &str) -> IsolateResult<()> {
        let (Some(object), Some(key)) = (value.as_object(), self.stack_key.as_ref()) else {
            return Ok(());
        };
        let key = key.restore(ctx)?;
        if let Err(rquickjs::Error::Exception) = object.set(key, new_string(ctx, formatted)?) {
            // Frozen or exotic error objects keep their original stack
            let _ = ctx.catch();
        }
        Ok(())
    }

    /// Format `error`, optionally rewriting its `stack` property
    pub(crate) fn render_error(&self, error: &JsHandle, rewrite_stack: bool) -> Message {
        let outcome = self.engine_raw(|ctx, isolate| {
            let value = error.restore(ctx)?;
            let message = isolate.describe(ctx, &value)?;
            if rewrite_stack {
                isolate.write_stack(ctx, &value, &message.stack)?;
            }
            Ok(message)
        });
        outcome.unwrap_or_else(|_| Message {
            text: "<unprintable error>".to_string(),
            stack: "<unprintable error>\n".to_string(),
        })
    }

    /// Install `error` as the current error
    pub(crate) fn set_error(&mut self, error: JsHandle) {
        let error = if self.is_execution_terminating() {
            self.engine_raw(|ctx, isolate| {
                let message = new_string(ctx, TERMINATION_MESSAGE)?;
                Ok(isolate.wrap(ctx, message, HandleKind::PersistentValue))
            })
            .unwrap_or(error)
        } else {
            error
        };
        self.errors.set(error);
    }

    /// Throw `value` from native code
    ///
    /// The value becomes the current error; the returned `undefined` is
    /// what the native callback should hand back to script.
    pub fn throw_exception(&mut self, value: Local) -> IsolateResult<Local> {
        let error = self.handle(value)?.acquire(HandleKind::PersistentValue);
        self.set_error(error);
        Ok(self.undefined())
    }

    /// Drop the current error, optionally replacing it
    pub fn clear_error(&mut self, replacement: Option<Local>) -> IsolateResult<()> {
        let replacement = match replacement {
            Some(local) => Some(self.handle(local)?.acquire(HandleKind::PersistentValue)),
            None => None,
        };
        self.errors.clear();
        if let Some(error) = replacement {
            self.errors.set(error);
        }
        Ok(())
    }

    pub fn has_error(&self) -> bool {
        self.errors.current().is_some()
    }

    /// Take ownership of the current error, leaving the channel empty
    pub fn take_error(&mut self) -> IsolateResult<Option<Local>> {
        self.ensure_scope()?;
        match self.errors.take() {
            Some(error) => {
                let local = error.acquire(HandleKind::Ordinary);
                self.track(local).map(Some)
            }
            None => Ok(None),
        }
    }

    /// The current error without clearing it
    pub fn peek_error(&mut self) -> IsolateResult<Option<Local>> {
        let Some(error) = self.errors.current() else {
            return Ok(None);
        };
        let local = error.acquire(HandleKind::Ordinary);
        self.track(local).map(Some)
    }

    /// Write the message and numbered stack frames of `error` to `out`
    pub fn format_error(&mut self, error: Local, out: &mut dyn fmt::Write) -> IsolateResult<()> {
        let message = self.engine(|ctx, isolate| {
            let value = isolate.value(ctx, error)?;
            isolate.describe(ctx, &value)
        })?;
        out.write_str(&message.stack)
            .map_err(|err| crate::error::IsolateError::internal(err.to_string()))
    }

    /// Replace the `stack` property of `error` with its formatted form
    pub fn update_error_stack_prop(&mut self, error: Local) -> IsolateResult<()> {
        self.engine(|ctx, isolate| {
            let value = isolate.value(ctx, error)?;
            let message = isolate.describe(ctx, &value)?;
            isolate.write_stack(ctx, &value, &message.stack)
        })
    }

    /// Report the current error unless a try-catch frame will handle it
    pub fn try_report_error(&mut self) {
        if self.errors.in_try_catch() {
            return;
        }
        self.report_current_error();
    }

    /// Report the current error even inside a try-catch frame
    pub(crate) fn report_current_error(&mut self) {
        let Some(error) = self.errors.take() else {
            return;
        };
        let message = self.render_error(&error, true);
        self.dispatch_message(error, message);
    }

    fn dispatch_message(&mut self, error: JsHandle, message: Message) {
        let Some(mut callback) = self.message_callback.take() else {
            self.port().log(LogLevel::Error, &format!("Uncaught {message}"));
            return;
        };

        let token = self.push_handle_scope(HandleScopeKind::Normal);
        if let Ok(local) = self.track(error) {
            callback(self, &message, local);
        }
        let _ = self.pop_handle_scope(token);

        if self.message_callback.is_none() {
            self.message_callback = Some(callback);
        }
    }

    /// Register the uncaught error listener, returning the previous one
    pub fn set_message_callback(
        &mut self,
        callback: Option<crate::isolate::MessageCallback>,
    ) -> Option<crate::isolate::MessageCallback> {
        std::mem::replace(&mut self.message_callback, callback)
    }

    /// Make `token` the innermost try-catch frame, returning the previous one
    pub fn push_try_catch(&mut self, token: TryCatchToken) -> Option<TryCatchToken> {
        self.errors.try_catch.replace(token)
    }

    /// Close `token`, restoring `previous`
    pub fn pop_try_catch(
        &mut self,
        token: TryCatchToken,
        previous: Option<TryCatchToken>,
    ) -> IsolateResult<()> {
        if self.errors.try_catch != Some(token) {
            return Err(self.usage_error(UsageError::TryCatchMismatch));
        }
        self.errors.try_catch = previous;
        Ok(())
    }

    pub fn in_try_catch(&self) -> bool {
        self.errors.in_try_catch()
    }
}

/// Catches errors raised while it is alive
///
/// Dropping the guard discards a caught error, unless [`TryCatch::rethrow`]
/// was called (the error stays current and is reported if no outer frame
/// exists) or the guard is verbose (the error is reported, then discarded).
pub struct TryCatch<'i> {
    isolate: &'i mut Isolate,
    token: TryCatchToken,
    previous: Option<TryCatchToken>,
    rethrow: bool,
    verbose: bool,
}

impl<'i> TryCatch<'i> {
    pub fn new(isolate: &'i mut Isolate) -> Self {
        let token = TryCatchToken(isolate.next_token());
        let previous = isolate.push_try_catch(token);
        Self {
            isolate,
            token,
            previous,
            rethrow: false,
            verbose: false,
        }
    }

    pub fn has_caught(&self) -> bool {
        self.isolate.has_error()
    }

    /// The caught value, still held by the frame
    pub fn exception(&mut self) -> IsolateResult<Option<Local>> {
        self.isolate.peek_error()
    }

    /// The caught value formatted as a message
    pub fn message(&self) -> Option<Message> {
        let error = self.isolate.errors.current()?;
        Some(self.isolate.render_error(error, false))
    }

    /// Forget the caught value
    pub fn reset(&mut self) {
        self.isolate.errors.clear();
    }

    /// Pass the caught value on to the enclosing frame when this one closes
    pub fn rethrow(&mut self) {
        self.rethrow = true;
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

impl Deref for TryCatch<'_> {
    type Target = Isolate;

    fn deref(&self) -> &Isolate {
        self.isolate
    }
}

impl DerefMut for TryCatch<'_> {
    fn deref_mut(&mut self) -> &mut Isolate {
        self.isolate
    }
}

impl Drop for TryCatch<'_> {
    fn drop(&mut self) {
        let _ = self.isolate.pop_try_catch(self.token, self.previous);
        if !self.isolate.has_error() {
            return;
        }
        if self.rethrow {
            self.isolate.try_report_error();
        } else if self.verbose {
            self.isolate.report_current_error();
        } else {
            self.isolate.errors.clear();
        }
    }
}
