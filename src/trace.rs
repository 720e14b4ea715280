//! The tracer (spec.md §4.3): mark-and-trace over an explicit work list.
//!
//! The original C source traces environments recursively, one stack
//! frame per parent link; a long-lived interpreter can nest closures
//! deep enough to exhaust the native stack during collection, which is
//! exactly the kind of failure a GC must never introduce. Every traced
//! reference here — whether it comes from an array, a hash, a class's
//! method table, or an environment's parent chain — goes through the
//! same `Vec<CellRef>` work list instead of the call stack, and that
//! `Vec` is ordinary (non-GC) allocation so tracing itself can never
//! trigger a nested collection.

use crate::cell::{Cell, Payload};
use crate::env::Env;
use crate::value::{CellRef, Value};

fn push_if_unmarked(cell_ref: CellRef, work: &mut Vec<CellRef>) {
    let mut cell_ref = cell_ref;
    let cell = cell_ref.as_mut();
    if !cell.header.marked {
        cell.header.marked = true;
        work.push(cell_ref);
    }
}

fn push_value(value: Value, work: &mut Vec<CellRef>) {
    if let Value::Ref(r) = value {
        push_if_unmarked(r, work);
    }
}

fn push_env_chain(env: &Env, work: &mut Vec<CellRef>) {
    let mut current = Some(env.clone());
    while let Some(e) = current {
        for v in e.own_values() {
            push_value(v, work);
        }
        current = e.parent();
    }
}

/// Push every cell (and environment) this `cell` directly references.
/// Dispatches on `cell.tag()`'s payload the way spec.md §4.3's per-tag
/// table describes; every arm besides `Free` also traces the common
/// fields every cell carries (class, owner, singleton class, ivars, and
/// any inline environment).
fn trace_cell(cell: &Cell, work: &mut Vec<CellRef>) {
    push_if_unmarked(cell.class_ref, work);
    if let Some(owner) = cell.owner {
        push_if_unmarked(owner, work);
    }
    if let Some(sc) = cell.singleton_class {
        push_if_unmarked(sc, work);
    }
    for v in cell.ivars.values() {
        push_value(*v, work);
    }
    if let Some(constants) = &cell.constants {
        for v in constants.values() {
            push_value(*v, work);
        }
    }
    if let Some(cvars) = &cell.cvars {
        for v in cvars.values() {
            push_value(*v, work);
        }
    }
    if let Some(methods) = &cell.methods {
        for method in methods.values() {
            if let Some(closure) = &method.closure {
                push_env_chain(closure, work);
            }
        }
    }
    if let Some(env) = &cell.env {
        push_env_chain(env, work);
    }

    match &cell.payload {
        Payload::Array(a) => {
            for v in &a.elements {
                push_value(*v, work);
            }
        }
        Payload::Hash(h) => {
            for entry in &h.entries {
                push_value(entry.key, work);
                push_value(entry.value, work);
            }
            if let Some(v) = h.default_value {
                push_value(v, work);
            }
            if let Some(v) = h.default_block {
                push_value(v, work);
            }
        }
        Payload::Range(r) => {
            push_value(r.begin, work);
            push_value(r.end, work);
        }
        Payload::ClassOrModule(c) => {
            if let Some(sup) = c.superclass {
                push_if_unmarked(sup, work);
            }
            for m in &c.included_modules {
                push_if_unmarked(*m, work);
            }
        }
        Payload::Proc(p) => push_env_chain(&p.closure, work),
        Payload::Thread(t) => {
            if let Some(v) = t.value {
                push_value(v, work);
            }
        }
        Payload::Exception(e) => {
            if let Some(v) = e.backtrace {
                push_value(v, work);
            }
        }
        Payload::Encoding(e) => push_value(e.names, work),
        Payload::None
        | Payload::Integer(_)
        | Payload::String(_)
        | Payload::Symbol(_)
        | Payload::Regex(_)
        | Payload::MatchData(_)
        | Payload::Io(_) => {}
    }
}

/// Mark every cell reachable from `roots`. Consumes the root vector as
/// the initial work list and runs until it is empty, tracing one cell's
/// direct references per iteration.
pub fn mark(roots: Vec<CellRef>) {
    let mut work = roots;
    for r in &work {
        let mut r = *r;
        r.as_mut().header.marked = true;
    }
    while let Some(cell_ref) = work.pop() {
        trace_cell(cell_ref.as_ref(), &mut work);
    }
}
