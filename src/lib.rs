//! A conservative, stop-the-world, mark-and-sweep object heap for a
//! dynamic-language runtime. One process-wide [`Heap`] is built by
//! [`init`]; every other entry point (`alloc`, `collect`, `collect_all`,
//! `available_ratio`, `is_heap_ptr`) operates on it.
//!
//! Collection only ever runs on the thread that called [`init`]
//! (spec.md §5) — calling `collect`/`collect_all` from any other thread
//! is a silent no-op, and so is calling them while `Config::gc_disabled`
//! is set.

mod block;
pub mod cell;
pub mod collect;
pub mod config;
pub mod diagnostics;
pub mod env;
pub mod fatal;
pub mod heap;
pub mod roots;
pub mod stack;
pub mod sweep;
pub mod trace;
pub mod value;

use std::sync::OnceLock;

pub use cell::{Cell, Method, Payload, Tag};
pub use config::Config;
pub use env::{Env, EnvStack, Globals};
pub use heap::Heap;
pub use value::{CellRef, Value};

static HEAP: OnceLock<Heap> = OnceLock::new();

/// Build the process-wide heap and capture the calling thread as the
/// sole mutator/GC thread. Must be called exactly once, before any other
/// function in this crate.
pub fn init(config: Config) {
    if HEAP.set(Heap::new(config)).is_err() {
        fatal!("comet::init called twice");
    }
    heap().init();
}

/// The process-wide heap. Fatal if called before [`init`].
pub fn heap() -> &'static Heap {
    HEAP.get().unwrap_or_else(|| fatal!("comet used before comet::init"))
}

/// Allocate a cell of `tag`, tagged with `class_ref`. May trigger a
/// collection (spec.md §4.1, §6).
pub fn alloc(tag: Tag, class_ref: CellRef) -> CellRef {
    heap().alloc(tag, class_ref)
}

/// Run one mark-and-sweep cycle if called from the mutator thread and
/// the heap is enabled; a silent no-op otherwise (spec.md §5, §7).
pub fn collect() {
    collect::collect(heap())
}

/// Like [`collect`], but always runs (even if disabled) and never grows
/// the heap afterward — for deterministic full collections.
pub fn collect_all() {
    collect::collect_all(heap())
}

/// Fraction of cells currently on the free list. Safe to call from any
/// thread (spec.md §6).
pub fn available_ratio() -> f64 {
    heap().available_ratio()
}

/// Conservatively test whether `ptr` addresses a live, non-free cell.
pub fn is_heap_ptr(ptr: *const u8) -> Option<CellRef> {
    heap().is_heap_ptr(ptr)
}
