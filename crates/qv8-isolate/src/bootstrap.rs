//! Construction of roots, helper functions and host hooks

use qv8_core::{CoreError, HandleCounters, HandleKind, JsHandle, Polyfill, display_string, new_string};
use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Value};
use std::rc::Rc;

use crate::error::{IsolateError, IsolateResult};
use crate::isolate::{EngineFailure, Isolate};
use crate::roots::RootIndex;

const BOOTSTRAP_JS: &str = include_str!("bootstrap.js");

/// Helper functions compiled once per isolate
#[derive(Debug)]
pub(crate) struct Polyfills {
    pub new_map: Polyfill,
    pub new_set: Polyfill,
    pub map_set: Polyfill,
    pub set_add: Polyfill,
    pub object_assign: Polyfill,
    pub conv_fail: Polyfill,
    pub get_own_prop: Polyfill,
    pub get_own_names: Polyfill,
    pub set_integrity: Polyfill,
    pub strict_equal: Polyfill,
    pub make_class: Polyfill,
}

impl Polyfills {
    fn build<'js>(ctx: &Ctx<'js>, counters: &Rc<HandleCounters>) -> Result<Self, CoreError> {
        Ok(Self {
            new_map: Polyfill::capture(
                ctx,
                "new_map",
                "(function (Map) { return function new_map() { return new Map(); }; })(Map)",
                counters,
            )?,
            new_set: Polyfill::capture(
                ctx,
                "new_set",
                "(function (Set) { return function new_set() { return new Set(); }; })(Set)",
                counters,
            )?,
            map_set: Polyfill::build(
                ctx,
                "map_set",
                "map, key, value",
                "return map.set(key, value);",
                counters,
            )?,
            set_add: Polyfill::build(ctx, "set_add", "set, value", "return set.add(value);", counters)?,
            object_assign: Polyfill::build(
                ctx,
                "object_assign",
                "value",
                "return Object.assign(Array.isArray(value) ? [] : {}, value);",
                counters,
            )?,
            conv_fail: Polyfill::build(
                ctx,
                "conv_fail",
                "",
                "this.toString = this.valueOf = function() { throw new TypeError('Invalid usage'); };",
                counters,
            )?,
            get_own_prop: Polyfill::build(
                ctx,
                "get_own_prop",
                "key",
                "return Object.getOwnPropertyDescriptor(this, key);",
                counters,
            )?,
            get_own_names: Polyfill::build(
                ctx,
                "get_own_names",
                "",
                "return Object.getOwnPropertyNames(this);",
                counters,
            )?,
            set_integrity: Polyfill::build(ctx, "set_integrity", "prop", "Object[prop](this);", counters)?,
            strict_equal: Polyfill::build(ctx, "strict_equal", "a, b", "return a === b;", counters)?,
            make_class: Polyfill::build(
                ctx,
                "make_class",
                "name",
                "return ({ [name]: function () {} })[name];",
                counters,
            )?,
        })
    }
}

/// Everything the bootstrap realm produces
struct Bootstrapped {
    roots: Vec<(RootIndex, JsHandle)>,
    stack_key: JsHandle,
    polyfills: Polyfills,
}

fn engine_error(err: CoreError) -> rquickjs::Error {
    match err {
        CoreError::Engine(err) => err,
        other => rquickjs::Error::new_from_js_message("value", "string", other.to_string()),
    }
}

/// A deterministic replacement for `Math.random` (xorshift32)
fn seeded_random_source(seed: u64) -> String {
    let state = ((seed ^ (seed >> 32)) as u32).max(1);
    format!(
        "(function () {{\n\
         var s = {state} >>> 0;\n\
         Math.random = function random() {{\n\
           s ^= s << 13; s >>>= 0; s ^= s >>> 17; s ^= s << 5; s >>>= 0;\n\
           return s / 4294967296;\n\
         }};\n\
         }})();"
    )
}

/// Install the host hooks into the realm `ctx` belongs to
pub(crate) fn install_globals<'js>(ctx: &Ctx<'js>, isolate: &Isolate) -> IsolateResult<()> {
    let globals = ctx.globals();

    let port = isolate.port.clone();
    let print = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<()> {
            let mut line = String::new();
            for (index, arg) in args.0.iter().enumerate() {
                if index > 0 {
                    line.push(' ');
                }
                line.push_str(&display_string(&ctx, arg).map_err(engine_error)?);
            }
            line.push('\n');
            port.borrow().print(&line);
            Ok(())
        },
    )?;
    globals.set("print", print)?;

    let queue = isolate.microtasks.clone();
    let counters = isolate.counters.clone();
    let queue_microtask = Function::new(ctx.clone(), move |ctx: Ctx<'js>, callback: Function<'js>| {
        queue.push(JsHandle::new(
            &ctx,
            callback.into_value(),
            HandleKind::PersistentValue,
            &counters,
        ));
    })?;
    globals.set("queueMicrotask", queue_microtask)?;

    if isolate.config.expose_gc {
        let gc = Function::new(ctx.clone(), |ctx: Ctx<'js>| {
            // SAFETY: the context is alive for the duration of the call
            unsafe {
                rquickjs::qjs::JS_RunGC(rquickjs::qjs::JS_GetRuntime(ctx.as_raw().as_ptr()));
            }
        })?;
        globals.set("gc", gc)?;
    }

    ctx.eval::<(), _>(BOOTSTRAP_JS)?;
    if let Some(seed) = isolate.config.random_seed {
        ctx.eval::<(), _>(seeded_random_source(seed))?;
    }
    Ok(())
}

impl Isolate {
    /// Build roots, helpers and host hooks of the bootstrap realm
    pub(crate) fn bootstrap(&mut self) -> IsolateResult<()> {
        let outcome = self.engine_raw(|ctx, isolate| {
            let mut roots = Vec::with_capacity(RootIndex::ALL.len());
            for index in RootIndex::ALL {
                let value = match index {
                    RootIndex::Undefined | RootIndex::TheHole => Value::new_undefined(ctx.clone()),
                    RootIndex::Null => Value::new_null(ctx.clone()),
                    RootIndex::True => Value::new_bool(ctx.clone(), true),
                    RootIndex::False => Value::new_bool(ctx.clone(), false),
                    RootIndex::EmptyString => new_string(ctx, "")?,
                };
                roots.push((index, isolate.wrap(ctx, value, HandleKind::PersistentValue)));
            }
            let stack_key = isolate.wrap(ctx, new_string(ctx, "stack")?, HandleKind::PersistentValue);
            let polyfills = Polyfills::build(ctx, &isolate.counters)?;
            install_globals(ctx, isolate)?;
            Ok(Bootstrapped {
                roots,
                stack_key,
                polyfills,
            })
        });

        let built = match outcome {
            Ok(built) => built,
            Err(EngineFailure::Failed(IsolateError::Core(CoreError::Bootstrap { name, message }))) => {
                let message = format!("helper '{name}' failed to compile: {message}");
                return Err(self.report_fatal_error("Isolate::bootstrap", &message));
            }
            Err(EngineFailure::Thrown(error)) => {
                let message = self.render_error(&error, false).text;
                return Err(self.report_fatal_error("Isolate::bootstrap", &message));
            }
            Err(EngineFailure::Failed(err)) => return Err(err),
        };

        for (index, handle) in built.roots {
            let handle = Box::new(handle);
            self.roots.set_root(index, &*handle);
            self.root_handles[index as usize] = Some(handle);
        }
        self.stack_key = Some(built.stack_key);
        self.polyfills = Some(built.polyfills);
        Ok(())
    }

    pub(crate) fn polyfills(&self) -> IsolateResult<&Polyfills> {
        self.polyfills
            .as_ref()
            .ok_or_else(|| IsolateError::internal("isolate helpers are not initialized"))
    }
}
