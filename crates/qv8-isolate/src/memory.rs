//! Heap statistics, garbage collection and external memory accounting

use serde::Serialize;

use crate::error::IsolateResult;
use crate::isolate::Isolate;
use crate::roots::{EMBEDDER_DATA_SLOTS, RootIndex, RootSlotTable};
use qv8_core::JsHandle;

/// Snapshot of the engine heap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HeapStatistics {
    pub malloc_size: u64,
    pub malloc_limit: u64,
    pub memory_used_size: u64,
    pub malloc_count: u64,
    pub memory_used_count: u64,
    pub atom_count: u64,
    pub string_count: u64,
    pub object_count: u64,
    pub property_count: u64,
    pub function_count: u64,
    pub array_count: u64,
}

fn count(value: i64) -> u64 {
    value.max(0) as u64
}

impl Isolate {
    pub fn heap_statistics(&self) -> HeapStatistics {
        let usage = self.runtime.memory_usage();
        HeapStatistics {
            malloc_size: count(usage.malloc_size),
            malloc_limit: count(usage.malloc_limit),
            memory_used_size: count(usage.memory_used_size),
            malloc_count: count(usage.malloc_count),
            memory_used_count: count(usage.memory_used_count),
            atom_count: count(usage.atom_count),
            string_count: count(usage.str_count),
            object_count: count(usage.obj_count),
            property_count: count(usage.prop_count),
            function_count: count(usage.js_func_count),
            array_count: count(usage.array_count),
        }
    }

    /// Run a full collection now
    pub fn request_garbage_collection(&mut self) {
        self.runtime.run_gc();
        let step = self.config.external_memory_limit;
        self.roots.note_collection(step);
        tracing::trace!(target: "qv8", isolate = %self.id(), "garbage collection");
    }

    /// Record memory held outside the engine heap on behalf of script objects
    ///
    /// Crossing the current limit triggers a collection and moves the limit
    /// up by the configured step. Returns the new total.
    pub fn adjust_external_memory(&mut self, delta: i64) -> i64 {
        if self.roots.adjust_external_memory(delta) {
            tracing::debug!(
                target: "qv8",
                isolate = %self.id(),
                external = self.roots.external_memory(),
                limit = self.roots.external_memory_limit(),
                "external memory limit crossed"
            );
            self.request_garbage_collection();
        }
        self.roots.external_memory()
    }

    pub fn external_memory(&self) -> i64 {
        self.roots.external_memory()
    }

    pub fn external_memory_limit(&self) -> i64 {
        self.roots.external_memory_limit()
    }

    /// Start of the root slot table, for offset-based readers
    ///
    /// The address is stable for the isolate's lifetime.
    pub fn slot_table_ptr(&self) -> *const u8 {
        self.roots.as_ptr()
    }

    /// The wrapper stored in root cell `index`
    pub fn root_handle(&self, index: RootIndex) -> *const JsHandle {
        self.roots.root(index)
    }

    /// Raw content of table cell `cell`
    ///
    /// Reading past the table is a fatal error.
    pub fn slot(&mut self, cell: usize) -> IsolateResult<usize> {
        match self.roots.cell(cell) {
            Some(value) => Ok(value),
            None => Err(self.report_fatal_error(
                "Isolate::slot",
                &format!(
                    "cell {cell} is outside the root table ({} cells)",
                    RootSlotTable::cell_count()
                ),
            )),
        }
    }

    /// Store an embedder pointer in data slot `slot`
    pub fn set_data(&mut self, slot: usize, data: usize) -> IsolateResult<()> {
        if self.roots.set_embedder_data(slot, data) {
            return Ok(());
        }
        Err(self.report_fatal_error(
            "Isolate::set_data",
            &format!("data slot {slot} is out of range ({EMBEDDER_DATA_SLOTS} slots)"),
        ))
    }

    pub fn get_data(&self, slot: usize) -> Option<usize> {
        self.roots.embedder_data(slot)
    }
}
