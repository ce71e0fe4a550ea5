//! The isolate: one engine heap plus all per-instance bookkeeping
//!
//! An [`Isolate`] owns the engine runtime, its realms, the handle scope
//! stack, the eternal and persistent stores, the root slot table, the
//! error channel, the microtask queue and the template registry. Dropping
//! it releases all of them in a fixed order before the runtime itself.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use qv8_core::{HandleCounters, HandleKind, JsHandle};
use rquickjs::{Context, Ctx, Runtime, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::bootstrap::Polyfills;
use crate::config::IsolateConfig;
use crate::context::{ContextId, ContextStack};
use crate::error::{IsolateError, IsolateResult, UsageError};
use crate::exception::{ErrorChannel, Message};
use crate::handle_scope::ScopeStack;
use crate::local::{HandleArena, Local, LocalRepr};
use crate::microtask::MicrotaskQueue;
use crate::port::{DefaultPort, Port};
use crate::roots::{ROOT_COUNT, RootIndex, RootSlotTable};
use crate::template::{ObjectTemplate, TemplateRegistry};

static NEXT_ISOLATE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_ISOLATE: Cell<Option<IsolateId>> = const { Cell::new(None) };
}

/// Process-unique isolate identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IsolateId(u64);

impl fmt::Display for IsolateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "isolate#{}", self.0)
    }
}

/// Called with `(location, message)` when the isolate hits an unrecoverable state
pub type FatalErrorCallback = Box<dyn FnMut(&str, &str)>;

/// Receives uncaught errors; the `Local` is the thrown value
pub type MessageCallback = Box<dyn FnMut(&mut Isolate, &Message, Local)>;

/// Platform port shared with the script `print` hook
pub(crate) type PortCell = Rc<RefCell<Arc<dyn Port>>>;

/// Everything needed to construct an isolate
#[derive(Default)]
pub struct CreateParams {
    pub config: IsolateConfig,
    pub fatal_error_callback: Option<FatalErrorCallback>,
    pub message_callback: Option<MessageCallback>,
    pub port: Option<Arc<dyn Port>>,
}

impl CreateParams {
    pub fn new(config: IsolateConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn on_fatal_error(mut self, callback: impl FnMut(&str, &str) + 'static) -> Self {
        self.fatal_error_callback = Some(Box::new(callback));
        self
    }

    pub fn on_message(
        mut self,
        callback: impl FnMut(&mut Isolate, &Message, Local) + 'static,
    ) -> Self {
        self.message_callback = Some(Box::new(callback));
        self
    }

    pub fn port(mut self, port: Arc<dyn Port>) -> Self {
        self.port = Some(port);
        self
    }
}

/// One engine realm and its global object
pub(crate) struct Realm {
    pub context: Context,
    pub global: JsHandle,
}

/// Outcome of an engine call that did not succeed
pub(crate) enum EngineFailure {
    /// Script threw; the value was taken off the context
    Thrown(JsHandle),
    Failed(IsolateError),
}

/// Stops script on an isolate from any thread
///
/// The running script unwinds at the engine's next interrupt check.
#[derive(Debug, Clone)]
pub struct TerminationHandle {
    isolate: IsolateId,
    flag: Arc<AtomicBool>,
}

impl TerminationHandle {
    pub fn terminate(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            tracing::debug!(target: "qv8", isolate = %self.isolate, "termination requested");
        }
    }

    pub fn cancel(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_terminating(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A JavaScript engine instance
///
/// # Thread Safety
///
/// `Isolate` is `!Send`: the engine runtime is driven from the thread that
/// created it. [`Isolate::lock`] coordinates embedders that share an
/// isolate between cooperating callers on that thread.
pub struct Isolate {
    id: IsolateId,
    pub(crate) config: IsolateConfig,
    pub(crate) counters: Rc<HandleCounters>,
    pub(crate) scopes: ScopeStack,
    pub(crate) roots: Box<RootSlotTable>,
    pub(crate) root_handles: [Option<Box<JsHandle>>; ROOT_COUNT],
    pub(crate) eternals: Vec<JsHandle>,
    pub(crate) persistents: HandleArena,
    pub(crate) symbols: Vec<(JsHandle, JsHandle)>,
    pub(crate) stack_key: Option<JsHandle>,
    pub(crate) polyfills: Option<Polyfills>,
    pub(crate) errors: ErrorChannel,
    pub(crate) templates: TemplateRegistry,
    pub(crate) hidden_template: Option<Rc<ObjectTemplate>>,
    pub(crate) microtasks: MicrotaskQueue,
    pub(crate) utf16_strings: HashMap<usize, Rc<[u16]>>,
    pub(crate) realms: Vec<Realm>,
    pub(crate) contexts: ContextStack,
    pub(crate) fatal_error_callback: Option<FatalErrorCallback>,
    pub(crate) message_callback: Option<MessageCallback>,
    pub(crate) port: PortCell,
    terminated: Arc<AtomicBool>,
    lock: Arc<ReentrantMutex<()>>,
    next_token: u64,
    pub(crate) runtime: Runtime,
}

impl fmt::Debug for Isolate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Isolate")
            .field("id", &self.id)
            .field("live_handles", &self.counters.live())
            .field("contexts", &self.realms.len())
            .finish()
    }
}

impl Isolate {
    /// Create an isolate and its bootstrap realm
    pub fn new(params: CreateParams) -> IsolateResult<Self> {
        let CreateParams {
            config,
            fatal_error_callback,
            message_callback,
            port,
        } = params;

        let runtime =
            Runtime::new().map_err(|err| IsolateError::context_creation(err.to_string()))?;
        if let Some(limit) = config.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(limit) = config.max_stack_size {
            runtime.set_max_stack_size(limit);
        }
        if let Some(threshold) = config.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }

        let context =
            Context::full(&runtime).map_err(|err| IsolateError::context_creation(err.to_string()))?;
        let counters = HandleCounters::new();
        let global = context.with(|ctx| {
            JsHandle::new(
                &ctx,
                ctx.globals().into_value(),
                HandleKind::PersistentValue,
                &counters,
            )
        });

        let id = IsolateId(NEXT_ISOLATE_ID.fetch_add(1, Ordering::Relaxed));
        let port: Arc<dyn Port> = port.unwrap_or_else(|| Arc::new(DefaultPort));
        let mut isolate = Self {
            id,
            roots: RootSlotTable::new(config.external_memory_limit),
            config,
            counters,
            scopes: ScopeStack::default(),
            root_handles: Default::default(),
            eternals: Vec::new(),
            persistents: HandleArena::default(),
            symbols: Vec::new(),
            stack_key: None,
            polyfills: None,
            errors: ErrorChannel::default(),
            templates: TemplateRegistry::default(),
            hidden_template: None,
            microtasks: MicrotaskQueue::default(),
            utf16_strings: HashMap::new(),
            realms: vec![Realm { context, global }],
            contexts: ContextStack::new(ContextId::BOOTSTRAP),
            fatal_error_callback,
            message_callback,
            port: Rc::new(RefCell::new(port)),
            terminated: Arc::new(AtomicBool::new(false)),
            lock: Arc::new(ReentrantMutex::new(())),
            next_token: 0,
            runtime,
        };

        let flag = isolate.terminated.clone();
        isolate
            .runtime
            .set_interrupt_handler(Some(Box::new(move || flag.load(Ordering::Relaxed))));
        isolate.bootstrap()?;
        isolate.make_current();
        tracing::debug!(target: "qv8", isolate = %id, "isolate created");
        Ok(isolate)
    }

    /// Create an isolate with default settings
    pub fn with_defaults() -> IsolateResult<Self> {
        Self::new(CreateParams::default())
    }

    /// Release everything the isolate owns
    pub fn dispose(self) {
        tracing::debug!(target: "qv8", isolate = %self.id, "dispose requested");
    }

    pub fn id(&self) -> IsolateId {
        self.id
    }

    pub fn config(&self) -> &IsolateConfig {
        &self.config
    }

    /// Isolate last made current on this thread
    pub fn current_id() -> Option<IsolateId> {
        CURRENT_ISOLATE.with(|current| current.get())
    }

    pub fn is_current(&self) -> bool {
        Self::current_id() == Some(self.id)
    }

    pub(crate) fn make_current(&self) {
        CURRENT_ISOLATE.with(|current| current.set(Some(self.id)));
    }

    /// Re-entrant lock serializing access to this isolate
    pub fn lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.lock.lock()
    }

    /// The lock behind [`Isolate::lock`], for sharing with other owners
    pub fn lock_handle(&self) -> Arc<ReentrantMutex<()>> {
        self.lock.clone()
    }

    pub fn port(&self) -> Arc<dyn Port> {
        self.port.borrow().clone()
    }

    /// Replace the platform port, including the one behind `print`
    pub fn set_port(&mut self, port: Arc<dyn Port>) {
        *self.port.borrow_mut() = port;
    }

    /// Engine references currently held by wrappers of this isolate
    pub fn live_handles(&self) -> u64 {
        self.counters.live()
    }

    /// The acquire/release counters shared by this isolate's wrappers
    pub fn handle_counters(&self) -> Rc<HandleCounters> {
        self.counters.clone()
    }

    /// Wrappers owned by open handle scopes
    pub fn tracked_handles(&self) -> usize {
        self.scopes.tracked()
    }

    /// Stop running script as soon as possible
    ///
    /// Running code unwinds with an uncatchable error that is reported as
    /// [`crate::TERMINATION_MESSAGE`]. Calling this twice is harmless.
    pub fn terminate_execution(&mut self) {
        if !self.terminated.swap(true, Ordering::SeqCst) {
            tracing::debug!(target: "qv8", isolate = %self.id, "termination requested");
        }
    }

    /// Allow script to run again after [`Isolate::terminate_execution`]
    pub fn cancel_terminate_execution(&mut self) {
        if self.terminated.swap(false, Ordering::SeqCst) {
            tracing::debug!(target: "qv8", isolate = %self.id, "termination cancelled");
        }
    }

    /// A `Send` handle that can stop script running on this isolate
    pub fn termination_handle(&self) -> TerminationHandle {
        TerminationHandle {
            isolate: self.id,
            flag: self.terminated.clone(),
        }
    }

    pub fn is_execution_terminating(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub(crate) fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    /// Log and wrap a contract violation
    pub(crate) fn usage_error(&self, err: UsageError) -> IsolateError {
        tracing::error!(target: "qv8", isolate = %self.id, "{err}");
        IsolateError::Usage(err)
    }

    /// Report an unrecoverable state
    ///
    /// With a fatal error callback registered the callback runs and the
    /// returned error is propagated. Without one the process aborts.
    pub fn report_fatal_error(&mut self, location: &str, message: &str) -> IsolateError {
        if let Some(callback) = self.fatal_error_callback.as_mut() {
            callback(location, message);
            return IsolateError::Fatal {
                location: location.to_string(),
                message: message.to_string(),
            };
        }

        tracing::error!(target: "qv8", location, "fatal: {message}");
        eprintln!("\n#\n# Fatal error in {location}\n# {message}\n#\n");
        std::process::abort()
    }

    pub(crate) fn wrap<'js>(&self, ctx: &Ctx<'js>, value: Value<'js>, kind: HandleKind) -> JsHandle {
        JsHandle::new(ctx, value, kind, &self.counters)
    }

    /// The wrapper a `Local` names
    pub(crate) fn handle(&self, local: Local) -> IsolateResult<&JsHandle> {
        let handle = match local.0 {
            LocalRepr::Scoped(id) => self.scopes.get(id),
            LocalRepr::Root(index) => self.root_handles[index as usize].as_deref(),
            LocalRepr::Eternal(index) => self.eternals.get(index),
        };
        handle.ok_or(IsolateError::StaleHandle)
    }

    /// The engine value behind a `Local`, inside an engine call
    pub(crate) fn value<'js>(&self, ctx: &Ctx<'js>, local: Local) -> IsolateResult<Value<'js>> {
        Ok(self.handle(local)?.restore(ctx)?)
    }

    /// Turn the pending exception into a wrapper
    fn caught<'js>(&self, ctx: &Ctx<'js>) -> JsHandle {
        self.wrap(ctx, ctx.catch(), HandleKind::PersistentValue)
    }

    /// Run `f` inside `context`, taking any thrown value off the engine
    pub(crate) fn enter_realm<R>(
        &self,
        context: &Context,
        f: impl for<'js> FnOnce(&Ctx<'js>, &Isolate) -> IsolateResult<R>,
    ) -> Result<R, EngineFailure> {
        context.with(|ctx| match f(&ctx, self) {
            Ok(result) => Ok(result),
            Err(err) if err.is_pending_exception() => Err(EngineFailure::Thrown(self.caught(&ctx))),
            Err(err) => Err(EngineFailure::Failed(err)),
        })
    }

    /// Run `f` in the current realm without touching the error channel
    pub(crate) fn engine_raw<R>(
        &self,
        f: impl for<'js> FnOnce(&Ctx<'js>, &Isolate) -> IsolateResult<R>,
    ) -> Result<R, EngineFailure> {
        let context = match self.realm(self.contexts.active()) {
            Ok(realm) => realm.context.clone(),
            Err(err) => return Err(EngineFailure::Failed(err)),
        };
        self.enter_realm(&context, f)
    }

    /// Route a failed engine call through the error channel
    pub(crate) fn settle<R>(&mut self, outcome: Result<R, EngineFailure>) -> IsolateResult<R> {
        match outcome {
            Ok(result) => Ok(result),
            Err(EngineFailure::Thrown(error)) => {
                self.set_error(error);
                self.try_report_error();
                Err(IsolateError::Exception)
            }
            Err(EngineFailure::Failed(err)) => Err(err),
        }
    }

    /// Run `f` in the current realm; a throw becomes the current error
    pub(crate) fn engine<R>(
        &mut self,
        f: impl for<'js> FnOnce(&Ctx<'js>, &Isolate) -> IsolateResult<R>,
    ) -> IsolateResult<R> {
        let outcome = self.engine_raw(f);
        self.settle(outcome)
    }

    /// Run `f` and track the value it produces in the current handle scope
    pub(crate) fn engine_local(
        &mut self,
        f: impl for<'js> FnOnce(&Ctx<'js>, &Isolate) -> IsolateResult<Value<'js>>,
    ) -> IsolateResult<Local> {
        self.ensure_scope()?;
        let handle = self.engine(|ctx, isolate| {
            let value = f(ctx, isolate)?;
            Ok(isolate.wrap(ctx, value, HandleKind::Ordinary))
        })?;
        self.track(handle)
    }

    pub(crate) fn root_local(&self, index: RootIndex) -> Local {
        Local::root(index)
    }

    /// Release owned resources in dependency order
    fn release_all(&mut self) {
        let mut templates = self.templates.dispose_all();
        if let Some(template) = self.hidden_template.take() {
            template.dispose();
            templates += 1;
        }
        self.eternals.clear();
        self.persistents.clear();
        self.symbols.clear();
        self.stack_key = None;
        self.errors.clear();
        self.microtasks.clear();
        self.polyfills = None;
        self.roots.clear_roots();
        self.root_handles = Default::default();
        self.utf16_strings.clear();
        let unclosed = self.scopes.clear();
        if unclosed > 0 {
            tracing::debug!(target: "qv8", isolate = %self.id, unclosed, "released handles of unclosed scopes");
        }
        self.realms.clear();
        self.terminated.store(false, Ordering::SeqCst);
        self.runtime.set_interrupt_handler(None);

        CURRENT_ISOLATE.with(|current| {
            if current.get() == Some(self.id) {
                current.set(None);
            }
        });
        tracing::debug!(
            target: "qv8",
            isolate = %self.id,
            templates,
            leaked = self.counters.live(),
            "isolate disposed"
        );
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        self.release_all();
    }
}
