//! Integration tests for the error channel and try-catch frames

use qv8_isolate::{CreateParams, HandleScope, Isolate, TryCatch};
use std::cell::RefCell;
use std::rc::Rc;

/// Isolate whose uncaught errors are collected as message text
fn isolate_with_reports() -> (Isolate, Rc<RefCell<Vec<String>>>) {
    let reports = Rc::new(RefCell::new(Vec::new()));
    let sink = reports.clone();
    let params = CreateParams::default().on_message(move |_, message, _| {
        sink.borrow_mut().push(message.text.clone());
    });
    (Isolate::new(params).unwrap(), reports)
}

#[test]
fn test_try_catch_takes_error() {
    let (mut isolate, reports) = isolate_with_reports();
    let mut scope = HandleScope::new(&mut isolate);
    let mut try_catch = TryCatch::new(&mut scope);

    let err = try_catch.run_script("throw new Error('x')").unwrap_err();
    assert!(err.is_exception());
    assert!(try_catch.has_error());

    let error = try_catch.take_error().unwrap().unwrap();
    assert!(!try_catch.has_error());
    let message = try_catch.get(error, "message").unwrap();
    assert_eq!(try_catch.to_rust_string(message).unwrap(), "x");

    drop(try_catch);
    assert!(reports.borrow().is_empty());
}

#[test]
fn test_uncaught_error_is_reported() {
    let (mut isolate, reports) = isolate_with_reports();
    let mut scope = HandleScope::new(&mut isolate);

    assert!(scope.run_script("throw new Error('boom')").is_err());
    assert!(!scope.has_error());
    assert_eq!(reports.borrow().as_slice(), ["Error: boom"]);

    assert!(scope.run_script("throw 42").is_err());
    assert_eq!(reports.borrow().len(), 2);
    assert_eq!(reports.borrow()[1], "42");
}

#[test]
fn test_reported_message_has_stack_frames() {
    let stacks = Rc::new(RefCell::new(Vec::new()));
    let sink = stacks.clone();
    let params = CreateParams::default().on_message(move |isolate, message, error| {
        let stack = isolate.get(error, "stack").unwrap();
        let rewritten = isolate.to_rust_string(stack).unwrap();
        sink.borrow_mut().push((message.stack.clone(), rewritten));
    });
    let mut isolate = Isolate::new(params).unwrap();
    let mut scope = HandleScope::new(&mut isolate);

    scope
        .run_script("function fail() { throw new Error('deep'); }\nfail();")
        .unwrap_err();

    let stacks = stacks.borrow();
    let (formatted, rewritten) = &stacks[0];
    assert!(formatted.starts_with("Error: deep\n"));
    assert!(formatted.contains("# 0: "));
    assert_eq!(formatted, rewritten);
}

#[test]
fn test_try_catch_suppresses_reporting() {
    let (mut isolate, reports) = isolate_with_reports();
    let mut scope = HandleScope::new(&mut isolate);
    {
        let mut try_catch = TryCatch::new(&mut scope);
        try_catch.run_script("throw new Error('quiet')").unwrap_err();
        try_catch.try_report_error();
        assert!(try_catch.has_caught());
        assert_eq!(try_catch.message().unwrap().text, "Error: quiet");
    }
    assert!(reports.borrow().is_empty());
    assert!(!scope.has_error());

    scope.run_script("throw new Error('loud')").unwrap_err();
    assert_eq!(reports.borrow().as_slice(), ["Error: loud"]);
}

#[test]
fn test_verbose_try_catch_reports_on_drop() {
    let (mut isolate, reports) = isolate_with_reports();
    let mut scope = HandleScope::new(&mut isolate);
    {
        let mut try_catch = TryCatch::new(&mut scope);
        try_catch.set_verbose(true);
        assert!(try_catch.is_verbose());
        try_catch.run_script("throw new TypeError('verbose')").unwrap_err();
        assert!(reports.borrow().is_empty());
    }
    assert_eq!(reports.borrow().as_slice(), ["TypeError: verbose"]);
    assert!(!scope.has_error());
}

#[test]
fn test_rethrow_reaches_outer_frame() {
    let (mut isolate, reports) = isolate_with_reports();
    let mut scope = HandleScope::new(&mut isolate);
    let mut outer = TryCatch::new(&mut scope);
    {
        let mut inner = TryCatch::new(&mut outer);
        inner.run_script("throw new RangeError('again')").unwrap_err();
        inner.rethrow();
    }
    assert!(outer.has_caught());
    assert_eq!(outer.message().unwrap().text, "RangeError: again");

    outer.reset();
    assert!(!outer.has_caught());
    drop(outer);
    assert!(reports.borrow().is_empty());
}

#[test]
fn test_rethrow_without_outer_frame_reports() {
    let (mut isolate, reports) = isolate_with_reports();
    let mut scope = HandleScope::new(&mut isolate);
    {
        let mut try_catch = TryCatch::new(&mut scope);
        try_catch.run_script("throw new Error('up')").unwrap_err();
        try_catch.rethrow();
    }
    assert_eq!(reports.borrow().as_slice(), ["Error: up"]);
}

#[test]
fn test_throw_exception_from_native() {
    let mut isolate = Isolate::with_defaults().unwrap();
    let mut scope = HandleScope::new(&mut isolate);
    let mut try_catch = TryCatch::new(&mut scope);

    let value = try_catch.string("native failure").unwrap();
    let returned = try_catch.throw_exception(value).unwrap();
    assert!(try_catch.is_undefined(returned).unwrap());
    assert!(try_catch.has_caught());

    let caught = try_catch.exception().unwrap().unwrap();
    assert!(try_catch.strict_equals(caught, value).unwrap());
}

#[test]
fn test_clear_error_with_replacement() {
    let mut isolate = Isolate::with_defaults().unwrap();
    let mut scope = HandleScope::new(&mut isolate);
    let mut try_catch = TryCatch::new(&mut scope);

    try_catch.run_script("throw 1").unwrap_err();
    let replacement = try_catch.string("replaced").unwrap();
    try_catch.clear_error(Some(replacement)).unwrap();
    let current = try_catch.peek_error().unwrap().unwrap();
    assert_eq!(try_catch.to_rust_string(current).unwrap(), "replaced");

    try_catch.clear_error(None).unwrap();
    assert!(!try_catch.has_error());
    assert!(try_catch.take_error().unwrap().is_none());
}

#[test]
fn test_format_and_update_stack() {
    let mut isolate = Isolate::with_defaults().unwrap();
    let mut scope = HandleScope::new(&mut isolate);

    let error = scope.run_script("new Error('shown')").unwrap();
    let mut formatted = String::new();
    scope.format_error(error, &mut formatted).unwrap();
    assert!(formatted.starts_with("Error: shown\n"));

    scope.update_error_stack_prop(error).unwrap();
    let stack = scope.get(error, "stack").unwrap();
    assert_eq!(scope.to_rust_string(stack).unwrap(), formatted);

    let plain = scope.string("not an error").unwrap();
    let mut formatted = String::new();
    scope.format_error(plain, &mut formatted).unwrap();
    assert_eq!(formatted, "not an error\n");
}

#[test]
fn test_stack_rewrite_is_idempotent() {
    let (mut isolate, reports) = isolate_with_reports();
    let mut scope = HandleScope::new(&mut isolate);

    let error = scope
        .run_script("function f() { return new Error('x'); }\nf()")
        .unwrap();
    scope.update_error_stack_prop(error).unwrap();
    let stack = scope.get(error, "stack").unwrap();
    let once = scope.to_rust_string(stack).unwrap();
    assert!(once.starts_with("Error: x\n# 0: "));

    scope.update_error_stack_prop(error).unwrap();
    let stack = scope.get(error, "stack").unwrap();
    assert_eq!(scope.to_rust_string(stack).unwrap(), once);

    let mut formatted = String::new();
    scope.format_error(error, &mut formatted).unwrap();
    assert_eq!(formatted, once);

    scope.throw_exception(error).unwrap();
    scope.try_report_error();
    assert_eq!(reports.borrow().as_slice(), ["Error: x"]);
    let stack = scope.get(error, "stack").unwrap();
    assert_eq!(scope.to_rust_string(stack).unwrap(), once);
}

#[test]
fn test_capture_stack_trace_hook() {
    let mut isolate = Isolate::with_defaults().unwrap();
    let mut scope = HandleScope::new(&mut isolate);

    let kind = scope
        .run_script("var target = {}; Error.captureStackTrace(target); typeof target.stack")
        .unwrap();
    assert_eq!(scope.to_rust_string(kind).unwrap(), "string");
}
