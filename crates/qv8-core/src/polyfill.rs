//! Script-defined helper functions
//!
//! Some object operations have no direct engine API. They are compiled
//! once per isolate from a small function body and kept alive until the
//! isolate goes away.

use rquickjs::function::{Rest, This};
use rquickjs::{Ctx, Value};
use std::rc::Rc;

use crate::error::{CoreError, CoreResult};
use crate::handle::{HandleCounters, HandleKind, JsHandle, describe_error};

/// A compiled helper function
#[derive(Debug)]
pub struct Polyfill {
    name: &'static str,
    method: JsHandle,
}

impl Polyfill {
    /// Compile `function name(args) { body }`
    pub fn build<'js>(
        ctx: &Ctx<'js>,
        name: &'static str,
        args: &str,
        body: &str,
        counters: &Rc<HandleCounters>,
    ) -> CoreResult<Self> {
        let source = format!("(function {name}({args}) {{\n{body}\n}})");
        Self::compile(ctx, name, source, counters)
    }

    /// Compile an expression that evaluates to a function
    ///
    /// Globals the expression reads while being evaluated are captured
    /// then, so later changes to them do not affect the helper.
    pub fn capture<'js>(
        ctx: &Ctx<'js>,
        name: &'static str,
        source: &str,
        counters: &Rc<HandleCounters>,
    ) -> CoreResult<Self> {
        Self::compile(ctx, name, source.to_string(), counters)
    }

    fn compile<'js>(
        ctx: &Ctx<'js>,
        name: &'static str,
        source: String,
        counters: &Rc<HandleCounters>,
    ) -> CoreResult<Self> {
        let method: Value = ctx.eval(source).map_err(|err| match err {
            rquickjs::Error::Exception => {
                CoreError::bootstrap(name, describe_error(&ctx.catch()).to_string())
            }
            other => CoreError::bootstrap(name, other.to_string()),
        })?;
        if !method.is_function() {
            return Err(CoreError::bootstrap(name, "did not evaluate to a function"));
        }
        tracing::trace!(target: "qv8", polyfill = name, "compiled helper");
        Ok(Self {
            name,
            method: JsHandle::new(ctx, method, HandleKind::PersistentValue, counters),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Call the helper with `this` and positional arguments
    ///
    /// A throw inside the helper surfaces as a pending exception.
    pub fn call<'js>(
        &self,
        ctx: &Ctx<'js>,
        this: Value<'js>,
        args: Vec<Value<'js>>,
    ) -> CoreResult<Value<'js>> {
        let method = self.method.restore(ctx)?;
        let function = method
            .as_function()
            .ok_or_else(|| CoreError::type_error("function", format!("{:?}", method.type_of())))?;
        Ok(function.call((This(this), Rest(args)))?)
    }
}
