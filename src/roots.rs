//! Root enumeration (spec.md §4.2): the pinned singletons, the globals
//! table, the active environment chain, and a conservative scan of the
//! calling thread's native stack. Returns a plain `Vec<CellRef>` built
//! with ordinary (non-GC) allocation — collecting roots must never
//! itself touch the cell heap, since that heap is mid-collection.

use crate::env::Env;
use crate::fatal;
use crate::heap::Heap;
use crate::stack::{approximate_stack_pointer, scan_conservatively};
use crate::value::{CellRef, Value};

/// Walk one environment and all of its ancestors, pushing every bound
/// value that is a cell reference.
fn trace_env_chain(env: &Env, out: &mut Vec<CellRef>) {
    let mut current = Some(env.clone());
    while let Some(e) = current {
        for v in e.own_values() {
            if let Value::Ref(r) = v {
                out.push(r);
            }
        }
        current = e.parent();
    }
}

/// Gather every root currently reachable from outside the heap: pinned
/// singletons, globals, the active environment chain, and a conservative
/// scan of the native stack between the caller's approximate stack
/// pointer and the thread's recorded stack origin.
///
/// # Safety
/// Must be called on the heap's designated mutator/GC thread, with the
/// caller's stack frame being the outermost frame worth scanning (i.e.
/// from the top of `collect`'s call stack, not from some inner helper).
pub fn gather(heap: &Heap) -> Vec<CellRef> {
    let mut roots = Vec::new();

    let singletons = heap.singletons();
    roots.push(singletons.object_class);
    roots.push(singletons.integer_class);
    roots.push(singletons.nil);
    roots.push(singletons.true_);
    roots.push(singletons.false_);

    for v in heap.globals.values() {
        if let Value::Ref(r) = v {
            roots.push(r);
        }
    }

    for env in heap.envs.active() {
        trace_env_chain(&env, &mut roots);
    }

    let bounds = heap.stack_bounds();
    let top = approximate_stack_pointer();
    scan_conservatively(bounds, top, |candidate| {
        if let Some(r) = heap.is_heap_ptr(candidate) {
            check_not_corrupt(heap, r);
            roots.push(r);
        }
    });

    roots
}

/// Before trusting a conservatively-discovered root, verify its class
/// reference is itself a live cell somewhere in the heap (spec.md §4.2
/// "Corruption checks"). A bit pattern that happens to alias a cell
/// address but whose `class_ref` field points outside the heap means the
/// heap's own invariants are already broken — there is no safe way to
/// continue collecting, so this aborts rather than risking silent data
/// loss.
fn check_not_corrupt(heap: &Heap, candidate: CellRef) {
    let class_ptr = candidate.as_ref().class_ref.as_ptr() as *const u8;
    if heap.is_heap_ptr(class_ptr).is_none() {
        fatal!(
            "heap corruption: root candidate {:p} has a class reference outside the heap",
            candidate.as_ptr()
        );
    }
}
