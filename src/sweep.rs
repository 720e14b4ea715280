//! Sweeping and finalization (spec.md §4.4).
//!
//! Because a cell's storage is reused in place rather than deallocated
//! (see `cell.rs`'s module doc), the only place a dead cell's
//! native-owned allocations actually get released is here, when the
//! sweeper decides the cell didn't survive this collection. Reassigning
//! `cell.payload` to [`Payload::None`] drops whatever the old payload
//! owned — a `Vec`, a `String`, a `HashMap` — the same way it would on
//! any ordinary Rust value; the only payload kinds that need an explicit
//! step first are the ones wrapping a [`NativeResource`](crate::cell::NativeResource),
//! whose `release()` must run before that drop fires or its own
//! double-release guard panics.

use std::collections::HashMap;

use crate::cell::{Payload, Tag};
use crate::heap::Heap;
use crate::value::CellRef;

pub struct SweepStats {
    pub swept: usize,
    pub live: usize,
}

fn finalize(mut cell_ref: CellRef, nil_class: CellRef) {
    let cell = cell_ref.as_mut();

    match &mut cell.payload {
        Payload::Regex(r) => r.compiled.release(),
        Payload::MatchData(m) => m.region.release(),
        _ => {}
    }
    cell.payload = Payload::None;

    cell.ivars = HashMap::new();
    cell.constants = None;
    cell.cvars = None;
    cell.methods = None;
    cell.env = None;
    cell.owner = None;
    cell.singleton_class = None;
    cell.class_ref = nil_class;
    cell.header.tag = Tag::Free;
    cell.header.marked = false;
}

/// Clear every cell's mark bit, live or free, symbol or not (mirrors
/// `nat_gc_unmark_all_objects` in `gc.c`). Outside a collection cycle
/// every mark bit is already false (spec.md §3 invariant 4), so this only
/// does real work when called from `collect_all`'s unconditional path,
/// which never runs the tracer to set any bits in the first place — it
/// exists to make that path's precondition explicit rather than rely on
/// the invariant silently holding.
pub fn unmark_all(heap: &Heap) {
    heap.for_each_block(|block| {
        for i in 0..block.cell_count() {
            let mut cell_ref = block.cell_ref(i);
            cell_ref.as_mut().header.marked = false;
        }
    });
}

/// Walk every block, finalizing and freeing every unmarked, non-symbol
/// cell, and clearing the mark bit on everything that survives. Already
/// free cells are left untouched — they stay exactly where the free list
/// already has them.
pub fn sweep(heap: &Heap) -> SweepStats {
    let nil_class = heap.singletons().nil;
    let mut freed = Vec::new();
    let mut live = 0usize;

    heap.for_each_block(|block| {
        for i in 0..block.cell_count() {
            let cell_ref = block.cell_ref(i);
            let cell = cell_ref.as_ref();

            if cell.is_free() {
                continue;
            }

            // Symbols are interned for the process lifetime; they are
            // never candidates for collection regardless of the mark bit
            // (spec.md §4.4 "Why symbols are exempt").
            if cell.tag().is_symbol() || cell.is_marked() {
                let mut r = cell_ref;
                r.as_mut().header.marked = false;
                live += 1;
                continue;
            }

            finalize(cell_ref, nil_class);
            freed.push(cell_ref);
        }
    });

    let swept = freed.len();
    for r in freed {
        heap.push_free(r);
    }

    SweepStats { swept, live }
}
