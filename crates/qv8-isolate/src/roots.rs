//! Fixed-layout root table
//!
//! Inline accessors compiled against V8's public headers read fields of
//! the isolate at constant byte offsets. [`RootSlotTable`] is laid out so
//! those offsets hold the same meaning here: embedder slots first, then
//! the external memory counters, then the roots array whose cells point
//! at always-alive singleton wrappers.

use qv8_core::JsHandle;
use std::mem::{offset_of, size_of};
use std::ptr;

/// Size of a pointer-sized table cell
pub const API_SYSTEM_POINTER_SIZE: usize = size_of::<usize>();
/// Size of a 64-bit counter cell
pub const API_INT64_SIZE: usize = size_of::<i64>();

/// Number of embedder data cells at the start of the table
pub const EMBEDDER_DATA_SLOTS: usize = 4;

pub const EXTERNAL_MEMORY_OFFSET: usize = EMBEDDER_DATA_SLOTS * API_SYSTEM_POINTER_SIZE;
pub const EXTERNAL_MEMORY_LIMIT_OFFSET: usize = EXTERNAL_MEMORY_OFFSET + API_INT64_SIZE;
pub const EXTERNAL_MEMORY_AT_LAST_MARK_COMPACT_OFFSET: usize =
    EXTERNAL_MEMORY_LIMIT_OFFSET + API_INT64_SIZE;
pub const FAST_C_CALL_CALLER_FP_OFFSET: usize =
    EXTERNAL_MEMORY_AT_LAST_MARK_COMPACT_OFFSET + API_INT64_SIZE;
pub const FAST_C_CALL_CALLER_PC_OFFSET: usize =
    FAST_C_CALL_CALLER_FP_OFFSET + API_SYSTEM_POINTER_SIZE;
pub const STACK_GUARD_OFFSET: usize = FAST_C_CALL_CALLER_PC_OFFSET + API_SYSTEM_POINTER_SIZE;
/// Pointer-sized cells reserved for the stack guard
pub const STACK_GUARD_SLOTS: usize = 7;
pub const ROOTS_OFFSET: usize = STACK_GUARD_OFFSET + STACK_GUARD_SLOTS * API_SYSTEM_POINTER_SIZE;

/// Number of cells in the roots array
pub const ROOT_COUNT: usize = 10;

/// Root array positions used by inline accessors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum RootIndex {
    Undefined = 4,
    TheHole = 5,
    Null = 6,
    True = 7,
    False = 8,
    EmptyString = 9,
}

impl RootIndex {
    pub const ALL: [RootIndex; 6] = [
        RootIndex::Undefined,
        RootIndex::TheHole,
        RootIndex::Null,
        RootIndex::True,
        RootIndex::False,
        RootIndex::EmptyString,
    ];

    /// Byte offset of this root's cell from the start of the table
    pub const fn offset(self) -> usize {
        ROOTS_OFFSET + self as usize * API_SYSTEM_POINTER_SIZE
    }
}

/// The isolate's root slot table
#[repr(C)]
pub struct RootSlotTable {
    embedder_data: [usize; EMBEDDER_DATA_SLOTS],
    external_memory: i64,
    external_memory_limit: i64,
    external_memory_at_last_mark_compact: i64,
    fast_c_call_caller_fp: usize,
    fast_c_call_caller_pc: usize,
    stack_guard: [usize; STACK_GUARD_SLOTS],
    roots: [*const JsHandle; ROOT_COUNT],
}

const _: () = assert!(offset_of!(RootSlotTable, external_memory) == EXTERNAL_MEMORY_OFFSET);
const _: () =
    assert!(offset_of!(RootSlotTable, external_memory_limit) == EXTERNAL_MEMORY_LIMIT_OFFSET);
const _: () = assert!(
    offset_of!(RootSlotTable, external_memory_at_last_mark_compact)
        == EXTERNAL_MEMORY_AT_LAST_MARK_COMPACT_OFFSET
);
const _: () =
    assert!(offset_of!(RootSlotTable, fast_c_call_caller_fp) == FAST_C_CALL_CALLER_FP_OFFSET);
const _: () =
    assert!(offset_of!(RootSlotTable, fast_c_call_caller_pc) == FAST_C_CALL_CALLER_PC_OFFSET);
const _: () = assert!(offset_of!(RootSlotTable, stack_guard) == STACK_GUARD_OFFSET);
const _: () = assert!(offset_of!(RootSlotTable, roots) == ROOTS_OFFSET);

impl RootSlotTable {
    pub(crate) fn new(external_memory_limit: i64) -> Box<Self> {
        Box::new(Self {
            embedder_data: [0; EMBEDDER_DATA_SLOTS],
            external_memory: 0,
            external_memory_limit,
            external_memory_at_last_mark_compact: 0,
            fast_c_call_caller_fp: 0,
            fast_c_call_caller_pc: 0,
            stack_guard: [0; STACK_GUARD_SLOTS],
            roots: [ptr::null(); ROOT_COUNT],
        })
    }

    /// Number of pointer-sized cells covered by the table
    pub const fn cell_count() -> usize {
        size_of::<Self>() / API_SYSTEM_POINTER_SIZE
    }

    /// Start of the table, for offset-based readers
    pub fn as_ptr(&self) -> *const u8 {
        (self as *const Self).cast()
    }

    /// Raw content of cell `cell`, or None past the end of the table
    pub fn cell(&self, cell: usize) -> Option<usize> {
        if cell >= Self::cell_count() {
            return None;
        }
        // SAFETY: cell is within the table and every cell is initialized plain data
        Some(unsafe { ptr::read_unaligned(self.as_ptr().cast::<usize>().add(cell)) })
    }

    pub fn root(&self, index: RootIndex) -> *const JsHandle {
        self.roots[index as usize]
    }

    pub(crate) fn set_root(&mut self, index: RootIndex, handle: *const JsHandle) {
        self.roots[index as usize] = handle;
    }

    pub(crate) fn clear_roots(&mut self) {
        self.roots = [ptr::null(); ROOT_COUNT];
    }

    pub fn embedder_data(&self, slot: usize) -> Option<usize> {
        self.embedder_data.get(slot).copied()
    }

    pub(crate) fn set_embedder_data(&mut self, slot: usize, data: usize) -> bool {
        match self.embedder_data.get_mut(slot) {
            Some(cell) => {
                *cell = data;
                true
            }
            None => false,
        }
    }

    pub fn external_memory(&self) -> i64 {
        self.external_memory
    }

    pub fn external_memory_limit(&self) -> i64 {
        self.external_memory_limit
    }

    pub fn external_memory_at_last_mark_compact(&self) -> i64 {
        self.external_memory_at_last_mark_compact
    }

    /// Apply `delta`; returns true when the new amount crossed the limit
    pub(crate) fn adjust_external_memory(&mut self, delta: i64) -> bool {
        self.external_memory = self.external_memory.saturating_add(delta);
        delta > 0 && self.external_memory > self.external_memory_limit
    }

    /// Record a collection and move the limit `step` above the current amount
    pub(crate) fn note_collection(&mut self, step: i64) {
        self.external_memory_at_last_mark_compact = self.external_memory;
        self.external_memory_limit = self.external_memory.saturating_add(step);
    }
}

/// Offset-based readers mirroring V8's inline accessors
pub mod internals {
    use super::*;

    /// Read a root cell the way header-inlined code does
    ///
    /// # Safety
    /// `table` must come from [`crate::Isolate::slot_table_ptr`] of an
    /// isolate that is still alive.
    #[inline]
    pub unsafe fn read_root(table: *const u8, index: RootIndex) -> *const JsHandle {
        // SAFETY: the caller guarantees a live table; the offset is pinned by the layout asserts
        unsafe { ptr::read_unaligned(table.add(index.offset()).cast::<*const JsHandle>()) }
    }

    /// Read the external memory counter
    ///
    /// # Safety
    /// Same contract as [`read_root`].
    #[inline]
    pub unsafe fn read_external_memory(table: *const u8) -> i64 {
        // SAFETY: see read_root
        unsafe { ptr::read_unaligned(table.add(EXTERNAL_MEMORY_OFFSET).cast::<i64>()) }
    }

    /// Read the external memory limit
    ///
    /// # Safety
    /// Same contract as [`read_root`].
    #[inline]
    pub unsafe fn read_external_memory_limit(table: *const u8) -> i64 {
        // SAFETY: see read_root
        unsafe { ptr::read_unaligned(table.add(EXTERNAL_MEMORY_LIMIT_OFFSET).cast::<i64>()) }
    }
}
