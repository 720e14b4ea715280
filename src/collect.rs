//! The collector driver (spec.md §4.5): gather roots, mark, sweep, grow.
//!
//! `collect` is a silent no-op off the mutator thread or while the heap
//! is globally disabled (spec.md §5, §7). `collect_all` is a distinct,
//! unconditional path: per `gc.c`'s `nat_gc_collect_all`
//! (`nat_gc_unmark_all_objects` + `nat_gc_collect_dead_objects`, with no
//! call to `nat_gc_mark_live_objects` in between), it never gathers roots
//! and never marks anything, so every non-symbol, non-free cell — pinned
//! singletons included — is unconditionally finalized and freed. It also
//! skips the post-collection growth step, since the process is exiting.

use crate::diagnostics::report_collection;
use crate::heap::Heap;
use crate::roots;
use crate::sweep;
use crate::trace;

/// Guard against the `collecting` flag already being held, running `body`
/// under it otherwise. Spec.md §9 flags the original bare boolean flag as
/// a data race; gating both `collect` and `collect_all` behind this mutex
/// fixes that and gives re-entrant calls (e.g. the allocator's own
/// pre-collection trigger firing from inside collaborator code) a place
/// to bail out instead of double-sweeping.
fn with_collecting_guard(heap: &Heap, body: impl FnOnce()) {
    if !heap.is_mutator_thread() {
        return;
    }

    let mut collecting = heap.collecting.lock();
    if *collecting {
        return;
    }
    *collecting = true;
    drop(collecting);

    body();

    *heap.collecting.lock() = false;
}

/// Run one mark-and-sweep cycle, growing the heap back up to `r_after`
/// afterward. A no-op off the mutator thread or while
/// `Config::gc_disabled` is set.
pub fn collect(heap: &Heap) {
    if !heap.gc_enabled() {
        return;
    }
    with_collecting_guard(heap, || {
        let roots = roots::gather(heap);
        let root_count = roots.len();
        trace::mark(roots);
        let stats = sweep::sweep(heap);

        heap.grow_to_ratio(heap.config().r_after);

        report_collection(
            "collect",
            heap.config().verbose,
            root_count,
            &stats,
            heap.available_ratio(),
        );
    });
}

/// Unconditionally finalize every non-symbol, non-free cell — shutdown
/// path (spec.md §4.5). Unlike `collect`, this never gathers roots and
/// never runs the tracer: every cell's mark bit is cleared first (mirrors
/// `nat_gc_unmark_all_objects`), then the sweeper treats everything as
/// unreached (mirrors `nat_gc_collect_dead_objects`), so pinned
/// singletons and every other live cell are finalized and freed too.
/// Never grows the heap afterward.
pub fn collect_all(heap: &Heap) {
    with_collecting_guard(heap, || {
        sweep::unmark_all(heap);
        let stats = sweep::sweep(heap);

        report_collection(
            "collect_all",
            heap.config().verbose,
            0,
            &stats,
            heap.available_ratio(),
        );
    });
}
