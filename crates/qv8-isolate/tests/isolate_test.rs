//! Integration tests for isolate lifecycle, contexts and configuration

use parking_lot::Mutex;
use qv8_isolate::{
    ContextScope, CreateParams, HandleScope, Isolate, IsolateConfig, LogLevel, Port, TryCatch,
    Template, UsageError, TERMINATION_MESSAGE,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct CapturePort {
    printed: Mutex<Vec<String>>,
    logged: Mutex<Vec<(LogLevel, String)>>,
}

impl Port for CapturePort {
    fn print(&self, text: &str) {
        self.printed.lock().push(text.to_string());
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.logged.lock().push((level, message.to_string()));
    }
}

#[test]
fn test_eval_in_fresh_context() {
    let mut isolate = Isolate::with_defaults().unwrap();
    let context = isolate.new_context().unwrap();
    let mut entered = ContextScope::new(&mut isolate, context).unwrap();
    let mut scope = HandleScope::new(&mut entered);

    let result = scope.run_script("1+1").unwrap();
    assert_eq!(scope.to_number(result).unwrap(), 2.0);
    assert!(!scope.has_error());
}

#[test]
fn test_contexts_have_separate_globals() {
    let mut isolate = Isolate::with_defaults().unwrap();
    let first = isolate.new_context().unwrap();
    let second = isolate.new_context().unwrap();
    assert_eq!(isolate.context_count(), 3);

    {
        let mut entered = ContextScope::new(&mut isolate, first).unwrap();
        let mut scope = HandleScope::new(&mut entered);
        scope.run_script("var shared = 1").unwrap();
        assert_eq!(scope.current_context(), first);
    }
    {
        let mut entered = ContextScope::new(&mut isolate, second).unwrap();
        let mut scope = HandleScope::new(&mut entered);
        let kind = scope.run_script("typeof shared").unwrap();
        assert_eq!(scope.to_rust_string(kind).unwrap(), "undefined");
    }

    assert_eq!(isolate.context_depth(), 1);
    let err = isolate.pop_context().unwrap_err();
    assert_eq!(err.usage(), Some(&UsageError::PopOutermostContext));
}

#[test]
fn test_context_global_matches_script_global() {
    let mut isolate = Isolate::with_defaults().unwrap();
    let context = isolate.new_context().unwrap();
    let mut scope = HandleScope::new(&mut isolate);

    let global = scope.context_global(context).unwrap();
    let marker = scope.string("here").unwrap();
    scope.set(global, "marker", marker).unwrap();

    scope.push_context(context).unwrap();
    let read = scope.run_script("globalThis.marker").unwrap();
    assert_eq!(scope.to_rust_string(read).unwrap(), "here");
    scope.pop_context().unwrap();

    let read = scope.run_script("typeof marker").unwrap();
    assert_eq!(scope.to_rust_string(read).unwrap(), "undefined");
}

#[test]
fn test_print_goes_to_port() {
    let port = Arc::new(CapturePort::default());
    let mut isolate = Isolate::new(CreateParams::default().port(port.clone())).unwrap();
    let mut scope = HandleScope::new(&mut isolate);

    scope.run_script("print('a', 1, true)").unwrap();
    assert_eq!(port.printed.lock().as_slice(), ["a 1 true\n"]);

    let replacement = Arc::new(CapturePort::default());
    scope.set_port(replacement.clone());
    scope.run_script("print(Symbol('s'))").unwrap();
    assert_eq!(replacement.printed.lock().as_slice(), ["Symbol(s)\n"]);
    assert_eq!(port.printed.lock().len(), 1);
}

#[test]
fn test_uncaught_error_without_callback_goes_to_port_log() {
    let port = Arc::new(CapturePort::default());
    let mut isolate = Isolate::new(CreateParams::default().port(port.clone())).unwrap();
    let mut scope = HandleScope::new(&mut isolate);

    scope.run_script("throw new Error('unhandled')").unwrap_err();
    assert!(!scope.has_error());

    let logged = port.logged.lock();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].0, LogLevel::Error);
    assert!(logged[0].1.starts_with("Uncaught Error: unhandled"));
}

#[test]
fn test_expose_gc_flag() {
    let mut plain = Isolate::with_defaults().unwrap();
    let mut scope = HandleScope::new(&mut plain);
    let kind = scope.run_script("typeof gc").unwrap();
    assert_eq!(scope.to_rust_string(kind).unwrap(), "undefined");
    drop(scope);

    let config = IsolateConfig::from_flags("--expose-gc");
    let mut isolate = Isolate::new(CreateParams::new(config)).unwrap();
    let mut scope = HandleScope::new(&mut isolate);
    let kind = scope.run_script("typeof gc").unwrap();
    assert_eq!(scope.to_rust_string(kind).unwrap(), "function");
    scope.run_script("gc()").unwrap();
}

#[test]
fn test_random_seed_is_deterministic() {
    let sample = |seed: u64| {
        let config = IsolateConfig::new().random_seed(seed);
        let mut isolate = Isolate::new(CreateParams::new(config)).unwrap();
        let mut scope = HandleScope::new(&mut isolate);
        let values = scope.run_script("[Math.random(), Math.random()]").unwrap();
        scope.deserialize::<Vec<f64>>(values).unwrap()
    };

    let first = sample(42);
    assert_eq!(first, sample(42));
    assert_ne!(first, sample(43));
    assert!(first.iter().all(|value| (0.0..1.0).contains(value)));
}

#[test]
fn test_terminate_and_cancel() {
    let mut isolate = Isolate::with_defaults().unwrap();
    let mut scope = HandleScope::new(&mut isolate);

    scope.terminate_execution();
    {
        let mut try_catch = TryCatch::new(&mut scope);
        let err = try_catch.run_script("while (true) {}").unwrap_err();
        assert!(err.is_exception());
        assert!(try_catch.has_caught());
        let error = try_catch.exception().unwrap().unwrap();
        assert_eq!(try_catch.to_rust_string(error).unwrap(), TERMINATION_MESSAGE);
    }

    scope.cancel_terminate_execution();
    let result = scope
        .run_script("let i = 0; while (i < 1000) { i++; } i")
        .unwrap();
    assert_eq!(scope.to_number(result).unwrap(), 1000.0);
}

#[test]
fn test_termination_handle_stops_running_script() {
    let mut isolate = Isolate::with_defaults().unwrap();
    let handle = isolate.termination_handle();
    let mut scope = HandleScope::new(&mut isolate);

    let watchdog = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        handle.terminate();
        handle
    });
    {
        let mut try_catch = TryCatch::new(&mut scope);
        let err = try_catch.run_script("while (true) {}").unwrap_err();
        assert!(err.is_exception());
        let error = try_catch.exception().unwrap().unwrap();
        assert_eq!(try_catch.to_rust_string(error).unwrap(), TERMINATION_MESSAGE);
    }

    let handle = watchdog.join().unwrap();
    assert!(handle.is_terminating());
    assert!(scope.is_execution_terminating());
    handle.cancel();
    assert!(!scope.is_execution_terminating());
    let result = scope.run_script("1 + 2").unwrap();
    assert_eq!(scope.to_number(result).unwrap(), 3.0);
}

#[test]
fn test_dispose_releases_everything_before_engine() {
    let mut isolate = Isolate::with_defaults().unwrap();
    let counters = isolate.handle_counters();
    let template = isolate.new_object_template();
    {
        let mut scope = HandleScope::new(&mut isolate);
        let value = scope.object().unwrap();
        scope.set_template_property(&template, "kept", value).unwrap();
        scope.set_eternal(value, None).unwrap();
        let name = scope.string("disposed").unwrap();
        scope.get_global_symbol(name).unwrap();
        let function = scope.new_function_template(Some("Later"));
        assert!(!scope.add_template(Template::Function(function)));

        let error = scope.string("pending").unwrap();
        scope.throw_exception(error).unwrap();
    }
    assert!(isolate.has_error());
    assert_eq!(isolate.template_count(), 2);
    assert!(template.has_property("kept"));
    assert!(counters.live() > 0);

    isolate.dispose();
    assert!(!template.has_property("kept"));
    assert_eq!(template.property_count(), 0);
    assert_eq!(counters.live(), 0);
}

#[test]
fn test_dispose_releases_stores() {
    let mut isolate = Isolate::with_defaults().unwrap();
    {
        let mut scope = HandleScope::new(&mut isolate);
        let value = scope.object().unwrap();
        scope.set_eternal(value, None).unwrap();
        let global = scope.new_global(value).unwrap();
        let name = scope.string("tag").unwrap();
        scope.get_global_symbol(name).unwrap();
        drop(global);
    }
    assert_eq!(isolate.tracked_handles(), 0);
    assert_eq!(isolate.eternal_count(), 1);
    assert_eq!(isolate.persistent_count(), 1);
    assert_eq!(isolate.global_symbol_count(), 1);

    let id = isolate.id();
    isolate.dispose();
    assert_ne!(Isolate::current_id(), Some(id));
}

#[test]
fn test_json_round_trip_through_script() {
    let mut isolate = Isolate::with_defaults().unwrap();
    let mut scope = HandleScope::new(&mut isolate);

    let value = scope.from_json(r#"{"items":[1,2,3]}"#).unwrap();
    let global = scope.global_object().unwrap();
    scope.set(global, "input", value).unwrap();
    let sum = scope
        .run_script("input.items.reduce((a, b) => a + b, 0)")
        .unwrap();
    assert_eq!(scope.to_number(sum).unwrap(), 6.0);

    let undefined = scope.undefined();
    assert!(scope.to_json(undefined).is_err());
}
