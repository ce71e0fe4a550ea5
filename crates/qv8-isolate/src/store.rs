//! Isolate-owned value stores
//!
//! Values kept here survive every handle scope. Eternals are addressed by
//! a caller-held index, persistents by a [`Global`] token, global symbols
//! by their name string. All of them are released when the isolate is
//! disposed.

use qv8_core::{HandleKind, JsHandle};
use rquickjs::{Function, Value};
use std::rc::Rc;

use crate::error::{IsolateError, IsolateResult, UsageError};
use crate::isolate::Isolate;
use crate::local::{HandleId, Local, LocalRepr};

/// An isolate-owned persistent value
///
/// The token is not `Clone`: exactly one owner may reset it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Global {
    id: HandleId,
}

enum SymbolLookup {
    Found(usize),
    Created { name: JsHandle, symbol: JsHandle },
}

impl Isolate {
    /// Store `value` for the isolate's lifetime
    ///
    /// With `index` unset the value is appended and its new index returned;
    /// otherwise the entry at `index` is replaced in place.
    pub fn set_eternal(&mut self, value: Local, index: Option<usize>) -> IsolateResult<usize> {
        let handle = self.handle(value)?.acquire(HandleKind::Eternal);
        match index {
            None => {
                self.eternals.push(handle);
                Ok(self.eternals.len() - 1)
            }
            Some(index) if index < self.eternals.len() => {
                self.eternals[index] = handle;
                Ok(index)
            }
            Some(index) => {
                let count = self.eternals.len();
                Err(self.usage_error(UsageError::EternalIndexOutOfRange { index, count }))
            }
        }
    }

    pub fn get_eternal(&self, index: usize) -> IsolateResult<Local> {
        if index >= self.eternals.len() {
            let count = self.eternals.len();
            return Err(self.usage_error(UsageError::EternalIndexOutOfRange { index, count }));
        }
        Ok(Local::eternal(index))
    }

    /// True when `value` names an entry of the eternal table
    pub fn is_eternal(&self, value: Local) -> bool {
        matches!(value.0, LocalRepr::Eternal(index) if index < self.eternals.len())
    }

    pub fn eternal_count(&self) -> usize {
        self.eternals.len()
    }

    /// Keep `value` alive until [`Isolate::reset_global`]
    pub fn new_global(&mut self, value: Local) -> IsolateResult<Global> {
        let handle = self.handle(value)?.acquire(HandleKind::PersistentValue);
        Ok(Global {
            id: self.persistents.insert(handle),
        })
    }

    /// A scoped reference to the value behind `global`
    pub fn global_to_local(&mut self, global: &Global) -> IsolateResult<Local> {
        self.ensure_scope()?;
        let handle = self
            .persistents
            .get(global.id)
            .ok_or(IsolateError::StaleHandle)?
            .acquire(HandleKind::Ordinary);
        self.track(handle)
    }

    /// Release the value behind `global`; false if it was already gone
    pub fn reset_global(&mut self, global: Global) -> bool {
        self.persistents.remove(global.id).is_some()
    }

    pub fn persistent_count(&self) -> usize {
        self.persistents.len()
    }

    /// The isolate-wide symbol registered under `name`
    ///
    /// Names are compared with `===`, so equal strings always map to the
    /// same symbol within one isolate.
    pub fn get_global_symbol(&mut self, name: Local) -> IsolateResult<Local> {
        self.ensure_scope()?;
        let lookup = self.engine(|ctx, isolate| {
            let key = isolate.value(ctx, name)?;
            let strict_equal = &isolate.polyfills()?.strict_equal;
            for (index, (known, _)) in isolate.symbols.iter().enumerate() {
                let args = vec![known.restore(ctx)?, key.clone()];
                let equal = strict_equal.call(ctx, Value::new_undefined(ctx.clone()), args)?;
                if equal.as_bool().unwrap_or(false) {
                    return Ok(SymbolLookup::Found(index));
                }
            }

            let constructor: Function = ctx.globals().get("Symbol")?;
            let symbol: Value = constructor.call((key.clone(),))?;
            Ok(SymbolLookup::Created {
                name: isolate.wrap(ctx, key, HandleKind::PersistentValue),
                symbol: isolate.wrap(ctx, symbol, HandleKind::PersistentValue),
            })
        })?;

        let symbol = match lookup {
            SymbolLookup::Found(index) => self.symbols[index].1.acquire(HandleKind::Ordinary),
            SymbolLookup::Created { name, symbol } => {
                let local = symbol.acquire(HandleKind::Ordinary);
                self.symbols.push((name, symbol));
                tracing::trace!(target: "qv8", count = self.symbols.len(), "global symbol created");
                local
            }
        };
        self.track(symbol)
    }

    pub fn global_symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Track an externally built UTF-16 buffer, keyed by its start address
    pub fn add_utf16_string(&mut self, buffer: Rc<[u16]>) -> IsolateResult<usize> {
        let key = buffer.as_ptr() as usize;
        if self.utf16_strings.contains_key(&key) {
            return Err(self.usage_error(UsageError::Utf16StringAlreadyTracked));
        }
        self.utf16_strings.insert(key, buffer);
        Ok(key)
    }

    /// Stop tracking the buffer starting at `key`
    ///
    /// An unknown key means the caller lost track of a buffer's lifetime,
    /// which is reported as a fatal error.
    pub fn remove_utf16_string(&mut self, key: usize) -> IsolateResult<Rc<[u16]>> {
        match self.utf16_strings.remove(&key) {
            Some(buffer) => Ok(buffer),
            None => Err(self.report_fatal_error(
                "Isolate::remove_utf16_string",
                &format!("buffer {key:#x} is not tracked"),
            )),
        }
    }

    pub fn utf16_string(&self, key: usize) -> Option<Rc<[u16]>> {
        self.utf16_strings.get(&key).cloned()
    }

    pub fn utf16_string_count(&self) -> usize {
        self.utf16_strings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle_scope::HandleScope;
    use crate::isolate::CreateParams;
    use std::cell::RefCell;

    #[test]
    fn test_eternal_append_and_overwrite() {
        let mut isolate = Isolate::with_defaults().unwrap();
        let mut scope = HandleScope::new(&mut isolate);

        let one = scope.number(1.0).unwrap();
        let two = scope.number(2.0).unwrap();
        let first = scope.set_eternal(one, None).unwrap();
        let second = scope.set_eternal(two, None).unwrap();
        assert_eq!((first, second), (0, 1));

        let three = scope.number(3.0).unwrap();
        assert_eq!(scope.set_eternal(three, Some(first)).unwrap(), first);
        assert_eq!(scope.eternal_count(), 2);

        let stored = scope.get_eternal(first).unwrap();
        assert!(scope.is_eternal(stored));
        assert!(!scope.is_eternal(three));
        assert_eq!(scope.to_number(stored).unwrap(), 3.0);

        let err = scope.set_eternal(three, Some(9)).unwrap_err();
        assert_eq!(
            err.usage(),
            Some(&UsageError::EternalIndexOutOfRange { index: 9, count: 2 })
        );
    }

    #[test]
    fn test_global_survives_scope() {
        let mut isolate = Isolate::with_defaults().unwrap();
        let global = {
            let mut scope = HandleScope::new(&mut isolate);
            let value = scope.string("kept").unwrap();
            scope.new_global(value).unwrap()
        };
        assert_eq!(isolate.persistent_count(), 1);

        {
            let mut scope = HandleScope::new(&mut isolate);
            let local = scope.global_to_local(&global).unwrap();
            assert_eq!(scope.to_rust_string(local).unwrap(), "kept");
        }

        let before = isolate.live_handles();
        assert!(isolate.reset_global(global));
        assert_eq!(isolate.live_handles(), before - 1);
        assert_eq!(isolate.persistent_count(), 0);
    }

    #[test]
    fn test_global_symbols_are_shared_by_name() {
        let mut isolate = Isolate::with_defaults().unwrap();
        let mut scope = HandleScope::new(&mut isolate);

        let x = scope.string("x").unwrap();
        let x_again = scope.string("x").unwrap();
        let y = scope.string("y").unwrap();

        let first = scope.get_global_symbol(x).unwrap();
        let second = scope.get_global_symbol(x_again).unwrap();
        let other = scope.get_global_symbol(y).unwrap();

        assert!(scope.is_symbol(first).unwrap());
        assert!(scope.strict_equals(first, second).unwrap());
        assert!(!scope.strict_equals(first, other).unwrap());
        assert_eq!(scope.global_symbol_count(), 2);
    }

    #[test]
    fn test_utf16_tracking() {
        let mut isolate = Isolate::with_defaults().unwrap();
        let buffer: Rc<[u16]> = Rc::from(vec![0x68, 0x69]);

        let key = isolate.add_utf16_string(buffer.clone()).unwrap();
        assert_eq!(
            isolate.add_utf16_string(buffer).unwrap_err().usage(),
            Some(&UsageError::Utf16StringAlreadyTracked)
        );
        assert_eq!(isolate.utf16_string(key).unwrap().as_ref(), &[0x68, 0x69]);
        assert_eq!(isolate.remove_utf16_string(key).unwrap().len(), 2);
        assert_eq!(isolate.utf16_string_count(), 0);
    }

    #[test]
    fn test_removing_unknown_utf16_string_is_fatal() {
        let reported = Rc::new(RefCell::new(Vec::new()));
        let sink = reported.clone();
        let params = CreateParams::default()
            .on_fatal_error(move |location, _| sink.borrow_mut().push(location.to_string()));
        let mut isolate = Isolate::new(params).unwrap();

        let err = isolate.remove_utf16_string(0x10).unwrap_err();
        assert!(matches!(err, IsolateError::Fatal { .. }));
        assert_eq!(reported.borrow().as_slice(), ["Isolate::remove_utf16_string"]);
    }
}
