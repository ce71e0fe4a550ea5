//! Microtask queue
//!
//! Functions enqueued by the embedder or by script `queueMicrotask` wait
//! here until [`Isolate::run_microtasks`]. The engine keeps its own job
//! queue for promise reactions; each round runs the explicit queue and
//! then drains the engine's jobs.

use qv8_core::{HandleKind, JsHandle};
use rquickjs::{Function, Value};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::{IsolateResult, UsageError};
use crate::isolate::Isolate;
use crate::local::Local;

/// Pending functions, shared with the `queueMicrotask` hook of every realm
#[derive(Debug, Clone, Default)]
pub(crate) struct MicrotaskQueue {
    tasks: Rc<RefCell<VecDeque<JsHandle>>>,
}

impl MicrotaskQueue {
    pub fn push(&self, task: JsHandle) {
        self.tasks.borrow_mut().push_back(task);
    }

    /// Everything queued so far; tasks queued later wait for the next call
    pub fn take_all(&self) -> VecDeque<JsHandle> {
        std::mem::take(&mut *self.tasks.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    pub fn clear(&self) {
        // Drop outside the borrow
        let tasks = self.take_all();
        drop(tasks);
    }
}

/// What one [`Isolate::run_microtasks`] call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MicrotaskStats {
    /// Explicitly queued functions that were called
    pub ran: usize,
    /// Of those, how many threw
    pub failed: usize,
    /// Engine jobs (promise reactions) executed
    pub engine_jobs: usize,
    /// Of those, how many threw
    pub engine_failures: usize,
}

impl Isolate {
    /// Queue `task` to run at the next checkpoint
    pub fn enqueue_microtask(&mut self, task: Local) -> IsolateResult<()> {
        let handle = self.handle(task)?;
        let is_function = self
            .engine_raw(|ctx, _| Ok(handle.restore(ctx)?.is_function()))
            .unwrap_or(false);
        if !is_function {
            return Err(self.usage_error(UsageError::NotAFunction));
        }
        self.microtasks.push(handle.acquire(HandleKind::PersistentValue));
        Ok(())
    }

    /// Explicitly queued functions not yet run
    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.len()
    }

    /// True when any explicit task or engine job is waiting
    pub fn has_pending_microtasks(&self) -> bool {
        !self.microtasks.is_empty() || self.runtime.is_job_pending()
    }

    /// Run queued microtasks until both queues are empty
    ///
    /// A task that throws is reported like any uncaught error and the
    /// remaining tasks still run.
    pub fn run_microtasks(&mut self) -> MicrotaskStats {
        let mut stats = MicrotaskStats::default();
        loop {
            for task in self.microtasks.take_all() {
                let result = self.engine(|ctx, _| {
                    let callback: Function = task.restore(ctx)?.get()?;
                    callback.call::<_, Value>(())?;
                    Ok(())
                });
                stats.ran += 1;
                if result.is_err() {
                    stats.failed += 1;
                }
            }

            self.drain_engine_jobs(&mut stats);
            if self.microtasks.is_empty() {
                break;
            }
        }

        if stats.ran > 0 || stats.engine_jobs > 0 {
            tracing::trace!(
                target: "qv8",
                ran = stats.ran,
                failed = stats.failed,
                engine_jobs = stats.engine_jobs,
                "microtask checkpoint"
            );
        }
        stats
    }

    fn drain_engine_jobs(&mut self, stats: &mut MicrotaskStats) {
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => stats.engine_jobs += 1,
                Ok(false) => break,
                Err(exception) => {
                    stats.engine_jobs += 1;
                    stats.engine_failures += 1;
                    let error = exception.0.with(|ctx| {
                        self.wrap(&ctx, ctx.catch(), HandleKind::PersistentValue)
                    });
                    self.set_error(error);
                    self.try_report_error();
                }
            }
        }
    }
}
