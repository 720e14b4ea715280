//! Collaborator types the host runtime supplies and the collector treats
//! as opaque root sources: lexical environments (closures) and the global
//! variable table (spec.md §4.2 "pinned singletons, the globals table, and
//! the active environment chain").
//!
//! `Heap` is shared across threads (any thread may call `alloc`, spec.md
//! §4.1), so everything reachable from it — including these collaborator
//! types — has to be genuinely thread-safe rather than merely compile
//! under a blanket `unsafe impl`. `Rc`/`RefCell` are replaced with
//! `Arc`/`parking_lot::Mutex` here for exactly that reason: the teacher's
//! own `GlobalSafepoint` (`safepoint.rs`) earns its `unsafe impl
//! Send`/`Sync` by routing every shared mutation through one real mutex,
//! and this module does the same for the globals table and the
//! environment chain.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::value::Value;

struct EnvData {
    vars: HashMap<Box<str>, Value>,
    /// The exception currently being raised/rescued in this frame, if any
    /// (spec.md §4.2 "the current exception (if any)"; §4.3 "push ... the
    /// current exception through the outer chain").
    exception: Option<Value>,
    parent: Option<Env>,
}

/// A lexical scope: a set of bound variables plus an optional enclosing
/// scope. Cheap to clone — every clone shares the same backing scope, the
/// way a closure and the function it was created in share bindings.
#[derive(Clone)]
pub struct Env {
    inner: Arc<Mutex<EnvData>>,
}

impl Env {
    pub fn new(parent: Option<Env>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(EnvData {
                vars: HashMap::new(),
                exception: None,
                parent,
            })),
        }
    }

    pub fn define(&self, name: &str, value: Value) {
        self.inner.lock().vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let data = self.inner.lock();
        if let Some(v) = data.vars.get(name) {
            return Some(*v);
        }
        data.parent.as_ref().and_then(|p| p.get(name))
    }

    pub fn parent(&self) -> Option<Env> {
        self.inner.lock().parent.clone()
    }

    pub fn set_exception(&self, exception: Option<Value>) {
        self.inner.lock().exception = exception;
    }

    pub fn exception(&self) -> Option<Value> {
        self.inner.lock().exception
    }

    /// Every value bound directly in this scope (not its ancestors), plus
    /// the current exception if one is set — what the tracer and root
    /// enumerator walk when they visit an environment (spec.md §4.2, §4.3).
    pub fn own_values(&self) -> Vec<Value> {
        let data = self.inner.lock();
        let mut values: Vec<Value> = data.vars.values().copied().collect();
        if let Some(exc) = data.exception {
            values.push(exc);
        }
        values
    }
}

/// The interpreter's global variable table (`$foo`-style globals), one of
/// the always-scanned root sources.
#[derive(Default)]
pub struct Globals {
    vars: Mutex<HashMap<Box<str>, Value>>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.vars.lock().insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.lock().get(name).copied()
    }

    /// Unset a global, the way the interpreter would when a `$foo`-style
    /// variable goes out of scope — the usual way a root stops being a
    /// root between one `collect` and the next.
    pub fn remove(&self, name: &str) {
        self.vars.lock().remove(name);
    }

    pub fn values(&self) -> Vec<Value> {
        self.vars.lock().values().copied().collect()
    }
}

/// The runtime's currently executing environment chain — a stack of
/// [`Env`]s, innermost last, conservatively treated as all-roots the same
/// way the globals table is (spec.md §4.2).
#[derive(Default)]
pub struct EnvStack {
    frames: Mutex<Vec<Env>>,
}

impl EnvStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, env: Env) {
        self.frames.lock().push(env);
    }

    pub fn pop(&self) {
        self.frames.lock().pop();
    }

    pub fn active(&self) -> Vec<Env> {
        self.frames.lock().clone()
    }
}
