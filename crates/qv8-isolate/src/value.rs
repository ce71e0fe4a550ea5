//! Value creation, conversion and script entry points
//!
//! Every operation that produces a value tracks a new wrapper in the
//! current handle scope and returns a [`Local`]. Singletons come from the
//! root table and need no scope.

use qv8_core::{CoreError, new_string, new_string_utf16, to_rust_string};
use rquickjs::convert::Coerced;
use rquickjs::function::{Rest, This};
use rquickjs::{Array, Ctx, Function, Object, Value};
use serde::de::DeserializeOwned;

use crate::error::{IsolateError, IsolateResult, UsageError};
use crate::isolate::{EngineFailure, Isolate};
use crate::local::Local;
use crate::roots::RootIndex;

fn json_function<'js>(ctx: &Ctx<'js>, name: &str) -> IsolateResult<Function<'js>> {
    let json: Object = ctx.globals().get("JSON")?;
    Ok(json.get(name)?)
}

pub(crate) fn as_object<'js>(value: Value<'js>) -> IsolateResult<Object<'js>> {
    value
        .into_object()
        .ok_or(IsolateError::Usage(UsageError::NotAnObject))
}

impl Isolate {
    pub fn undefined(&self) -> Local {
        self.root_local(RootIndex::Undefined)
    }

    /// Marker for absent array elements; behaves as `undefined` in script
    pub fn the_hole(&self) -> Local {
        self.root_local(RootIndex::TheHole)
    }

    pub fn null(&self) -> Local {
        self.root_local(RootIndex::Null)
    }

    pub fn boolean(&self, value: bool) -> Local {
        self.root_local(if value { RootIndex::True } else { RootIndex::False })
    }

    pub fn empty_string(&self) -> Local {
        self.root_local(RootIndex::EmptyString)
    }

    pub fn number(&mut self, value: f64) -> IsolateResult<Local> {
        self.engine_local(|ctx, _| Ok(Value::new_number(ctx.clone(), value)))
    }

    pub fn string(&mut self, text: &str) -> IsolateResult<Local> {
        self.engine_local(|ctx, _| Ok(new_string(ctx, text)?))
    }

    /// Create a string from UTF-16 code units
    pub fn string_from_utf16(&mut self, units: &[u16]) -> IsolateResult<Local> {
        self.engine_local(|ctx, _| Ok(new_string_utf16(ctx, units)?))
    }

    pub fn object(&mut self) -> IsolateResult<Local> {
        self.engine_local(|ctx, _| Ok(Object::new(ctx.clone())?.into_value()))
    }

    pub fn array(&mut self) -> IsolateResult<Local> {
        self.engine_local(|ctx, _| Ok(Array::new(ctx.clone())?.into_value()))
    }

    /// Evaluate `source` as a classic script in the current realm
    pub fn run_script(&mut self, source: &str) -> IsolateResult<Local> {
        self.engine_local(|ctx, _| Ok(ctx.eval::<Value, _>(source)?))
    }

    /// Call `function` with `receiver` as `this`
    pub fn call(&mut self, function: Local, receiver: Local, args: &[Local]) -> IsolateResult<Local> {
        self.engine_local(|ctx, isolate| {
            let callee = isolate.value(ctx, function)?;
            let Some(callee) = callee.as_function() else {
                return Err(isolate.usage_error(UsageError::NotAFunction));
            };
            let this = isolate.value(ctx, receiver)?;
            let args = args
                .iter()
                .map(|arg| isolate.value(ctx, *arg))
                .collect::<IsolateResult<Vec<_>>>()?;
            Ok(callee.call((This(this), Rest(args)))?)
        })
    }

    /// Read a named property
    pub fn get(&mut self, object: Local, key: &str) -> IsolateResult<Local> {
        self.engine_local(|ctx, isolate| {
            let target = as_object(isolate.value(ctx, object)?)?;
            Ok(target.get(key)?)
        })
    }

    /// Read a property by any key value
    pub fn get_by(&mut self, object: Local, key: Local) -> IsolateResult<Local> {
        self.engine_local(|ctx, isolate| {
            let target = as_object(isolate.value(ctx, object)?)?;
            Ok(target.get(isolate.value(ctx, key)?)?)
        })
    }

    /// Write a named property
    pub fn set(&mut self, object: Local, key: &str, value: Local) -> IsolateResult<()> {
        self.engine(|ctx, isolate| {
            let target = as_object(isolate.value(ctx, object)?)?;
            target.set(key, isolate.value(ctx, value)?)?;
            Ok(())
        })
    }

    /// Write a property by any key value
    pub fn set_by(&mut self, object: Local, key: Local, value: Local) -> IsolateResult<()> {
        self.engine(|ctx, isolate| {
            let target = as_object(isolate.value(ctx, object)?)?;
            target.set(isolate.value(ctx, key)?, isolate.value(ctx, value)?)?;
            Ok(())
        })
    }

    /// ToNumber
    pub fn to_number(&mut self, value: Local) -> IsolateResult<f64> {
        self.engine(|ctx, isolate| Ok(isolate.value(ctx, value)?.get::<Coerced<f64>>()?.0))
    }

    /// ToBoolean
    pub fn to_boolean(&mut self, value: Local) -> IsolateResult<bool> {
        self.engine(|ctx, isolate| Ok(isolate.value(ctx, value)?.get::<Coerced<bool>>()?.0))
    }

    /// ToString
    pub fn to_rust_string(&mut self, value: Local) -> IsolateResult<String> {
        self.engine(|ctx, isolate| Ok(to_rust_string(&isolate.value(ctx, value)?)?))
    }

    /// Apply a type test that cannot throw
    fn test_value(&self, value: Local, test: impl FnOnce(&Value<'_>) -> bool) -> IsolateResult<bool> {
        match self.engine_raw(|ctx, isolate| Ok(test(&isolate.value(ctx, value)?))) {
            Ok(result) => Ok(result),
            Err(EngineFailure::Failed(err)) => Err(err),
            Err(EngineFailure::Thrown(_)) => Ok(false),
        }
    }

    pub fn is_undefined(&self, value: Local) -> IsolateResult<bool> {
        self.test_value(value, |value| value.is_undefined())
    }

    pub fn is_null(&self, value: Local) -> IsolateResult<bool> {
        self.test_value(value, |value| value.is_null())
    }

    pub fn is_function(&self, value: Local) -> IsolateResult<bool> {
        self.test_value(value, |value| value.is_function())
    }

    pub fn is_object(&self, value: Local) -> IsolateResult<bool> {
        self.test_value(value, |value| value.is_object())
    }

    pub fn is_string(&self, value: Local) -> IsolateResult<bool> {
        self.test_value(value, |value| value.is_string())
    }

    pub fn is_symbol(&self, value: Local) -> IsolateResult<bool> {
        self.test_value(value, |value| value.is_symbol())
    }

    pub fn is_array(&self, value: Local) -> IsolateResult<bool> {
        self.test_value(value, |value| value.is_array())
    }

    /// `a === b`
    pub fn strict_equals(&mut self, a: Local, b: Local) -> IsolateResult<bool> {
        self.engine(|ctx, isolate| {
            let undefined = Value::new_undefined(ctx.clone());
            let args = vec![isolate.value(ctx, a)?, isolate.value(ctx, b)?];
            let equal = isolate.polyfills()?.strict_equal.call(ctx, undefined, args)?;
            Ok(equal.as_bool().unwrap_or(false))
        })
    }

    /// `JSON.stringify(value)`
    pub fn to_json(&mut self, value: Local) -> IsolateResult<String> {
        self.engine(|ctx, isolate| {
            let stringify = json_function(ctx, "stringify")?;
            let text: Value = stringify.call((isolate.value(ctx, value)?,))?;
            if text.is_undefined() {
                return Err(CoreError::type_error("JSON-serializable value", "undefined").into());
            }
            Ok(to_rust_string(&text)?)
        })
    }

    /// `JSON.parse(json)`
    pub fn from_json(&mut self, json: &str) -> IsolateResult<Local> {
        self.engine_local(|ctx, _| {
            let parse = json_function(ctx, "parse")?;
            Ok(parse.call((new_string(ctx, json)?,))?)
        })
    }

    /// Convert a script value into a Rust type through JSON
    pub fn deserialize<T: DeserializeOwned>(&mut self, value: Local) -> IsolateResult<T> {
        let json = self.to_json(value)?;
        Ok(serde_json::from_str(&json)?)
    }
}
