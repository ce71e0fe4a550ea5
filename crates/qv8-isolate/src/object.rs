//! Object operations built on the bootstrap helpers
//!
//! These cover the parts of the embedding API the engine has no direct
//! entry point for. Each one calls a helper compiled at isolate creation.

use qv8_core::Polyfill;
use rquickjs::Value;

use crate::bootstrap::Polyfills;
use crate::error::IsolateResult;
use crate::isolate::Isolate;
use crate::local::Local;

/// Restriction applied by [`Isolate::set_integrity_level`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegrityLevel {
    Frozen,
    Sealed,
    NonExtensible,
}

impl IntegrityLevel {
    /// Name of the `Object` function that applies this level
    pub fn method(self) -> &'static str {
        match self {
            IntegrityLevel::Frozen => "freeze",
            IntegrityLevel::Sealed => "seal",
            IntegrityLevel::NonExtensible => "preventExtensions",
        }
    }
}

impl Isolate {
    /// Call helper `select` with `this` and `args`, tracking the result
    fn call_helper(
        &mut self,
        select: fn(&Polyfills) -> &Polyfill,
        this: Option<Local>,
        args: &[Local],
    ) -> IsolateResult<Local> {
        self.engine_local(|ctx, isolate| {
            let receiver = match this {
                Some(local) => isolate.value(ctx, local)?,
                None => Value::new_undefined(ctx.clone()),
            };
            let args = args
                .iter()
                .map(|arg| isolate.value(ctx, *arg))
                .collect::<IsolateResult<Vec<_>>>()?;
            Ok(select(isolate.polyfills()?).call(ctx, receiver, args)?)
        })
    }

    pub fn new_map(&mut self) -> IsolateResult<Local> {
        self.call_helper(|helpers| &helpers.new_map, None, &[])
    }

    pub fn new_set(&mut self) -> IsolateResult<Local> {
        self.call_helper(|helpers| &helpers.new_set, None, &[])
    }

    /// `map.set(key, value)`, returning the map
    pub fn map_set(&mut self, map: Local, key: Local, value: Local) -> IsolateResult<Local> {
        self.call_helper(|helpers| &helpers.map_set, None, &[map, key, value])
    }

    /// `set.add(value)`, returning the set
    pub fn set_add(&mut self, set: Local, value: Local) -> IsolateResult<Local> {
        self.call_helper(|helpers| &helpers.set_add, None, &[set, value])
    }

    /// A shallow copy of `value`; arrays stay arrays
    pub fn clone_object(&mut self, value: Local) -> IsolateResult<Local> {
        self.call_helper(|helpers| &helpers.object_assign, None, &[value])
    }

    /// Make `toString` and `valueOf` of `object` throw a `TypeError`
    pub fn make_conversion_failer(&mut self, object: Local) -> IsolateResult<()> {
        self.call_helper(|helpers| &helpers.conv_fail, Some(object), &[])?;
        Ok(())
    }

    /// `Object.getOwnPropertyDescriptor(object, key)`
    pub fn get_own_property_descriptor(&mut self, object: Local, key: Local) -> IsolateResult<Local> {
        self.call_helper(|helpers| &helpers.get_own_prop, Some(object), &[key])
    }

    /// `Object.getOwnPropertyNames(object)`
    pub fn get_own_property_names(&mut self, object: Local) -> IsolateResult<Local> {
        self.call_helper(|helpers| &helpers.get_own_names, Some(object), &[])
    }

    pub fn set_integrity_level(&mut self, object: Local, level: IntegrityLevel) -> IsolateResult<()> {
        let method = self.string(level.method())?;
        self.call_helper(|helpers| &helpers.set_integrity, Some(object), &[method])?;
        Ok(())
    }
}
