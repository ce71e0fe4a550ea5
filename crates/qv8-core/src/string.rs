//! String conversion between Rust and engine values

use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Function, Value};

use crate::error::{CoreError, CoreResult};

/// Create an engine string value
pub fn new_string<'js>(ctx: &Ctx<'js>, text: &str) -> CoreResult<Value<'js>> {
    Ok(rquickjs::String::from_str(ctx.clone(), text)?.into_value())
}

/// Create an engine string from UTF-16 code units
///
/// Unpaired surrogates are rejected instead of being replaced.
pub fn new_string_utf16<'js>(ctx: &Ctx<'js>, units: &[u16]) -> CoreResult<Value<'js>> {
    let text = utf16_to_string(units)?;
    new_string(ctx, &text)
}

/// Decode UTF-16 code units
pub fn utf16_to_string(units: &[u16]) -> CoreResult<String> {
    String::from_utf16(units).map_err(|err| CoreError::StringEncoding(err.to_string()))
}

/// ToString conversion, may run script (`toString`, getters) and throw
pub fn to_rust_string<'js>(value: &Value<'js>) -> CoreResult<String> {
    Ok(value.get::<Coerced<String>>()?.0)
}

/// Text for printing a value
///
/// Same as ToString except symbols, which render as `Symbol(description)`
/// where ToString would throw.
pub fn display_string<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> CoreResult<String> {
    if value.is_symbol() {
        let string_ctor: Function = ctx.globals().get("String")?;
        let text: Value = string_ctor.call((value.clone(),))?;
        return to_rust_string(&text);
    }
    to_rust_string(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    fn with_ctx(f: impl for<'js> FnOnce(Ctx<'js>)) {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(f);
    }

    #[test]
    fn test_string_creation() {
        with_ctx(|ctx| {
            let value = new_string(&ctx, "hello").unwrap();
            assert!(value.is_string());
            assert_eq!(to_rust_string(&value).unwrap(), "hello");
        });
    }

    #[test]
    fn test_unicode_string() {
        with_ctx(|ctx| {
            let value = new_string(&ctx, "héllo 世界 🌍").unwrap();
            assert_eq!(to_rust_string(&value).unwrap(), "héllo 世界 🌍");
        });
    }

    #[test]
    fn test_utf16_string() {
        with_ctx(|ctx| {
            let units: Vec<u16> = "wide ✓".encode_utf16().collect();
            let value = new_string_utf16(&ctx, &units).unwrap();
            assert_eq!(to_rust_string(&value).unwrap(), "wide ✓");
        });
    }

    #[test]
    fn test_lone_surrogate_rejected() {
        let err = utf16_to_string(&[0xd800]).unwrap_err();
        assert!(matches!(err, CoreError::StringEncoding(_)));
    }

    #[test]
    fn test_display_symbol() {
        with_ctx(|ctx| {
            let symbol: Value = ctx.eval("Symbol('tag')").unwrap();
            assert!(to_rust_string(&symbol).is_err());
            assert_eq!(display_string(&ctx, &symbol).unwrap(), "Symbol(tag)");
            let _ = ctx.catch();
        });
    }

    #[test]
    fn test_display_number() {
        with_ctx(|ctx| {
            let value = Value::new_number(ctx.clone(), 2.5);
            assert_eq!(display_string(&ctx, &value).unwrap(), "2.5");
        });
    }
}
