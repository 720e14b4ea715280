//! The cell: a fixed-size storage unit holding exactly one heap object
//! (spec.md §3). `Tag` is the closed set of variant kinds; `Payload` is the
//! per-variant native-owned data the tracer and sweeper dispatch on.
//!
//! Blocks — and therefore cells — live for the process's lifetime (spec.md
//! §3: "Blocks are never freed"). A cell is *reused in place* when it is
//! swept and later reallocated, so ordinary Rust `Drop` glue never runs on
//! it the way it would for a heap-allocated `Box`. `sweep::finalize` is the
//! only place a dead cell's native-owned allocations (`Vec`s, `String`s,
//! `HashMap`s, the [`NativeResource`] handles below) actually get released
//! — this is the direct, safe-Rust analogue of the original C source's
//! manual `free()` calls in `nat_gc_collect_object`.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::env::Env;
use crate::value::{CellRef, Value};

/// The variant discriminant. `Free` is the state of a cell sitting on a
/// block's free list; every other tag is a live value kind.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Tag {
    Free,
    Nil,
    True,
    False,
    Integer,
    String,
    Symbol,
    Array,
    Hash,
    Range,
    Regex,
    MatchData,
    Io,
    Proc,
    Thread,
    Class,
    Module,
    Exception,
    Encoding,
    Other,
}

impl Tag {
    /// Symbols are interned for the process lifetime and are exempt from
    /// sweeping (spec.md §4.4 "Why symbols are exempt").
    #[inline]
    pub fn is_symbol(self) -> bool {
        matches!(self, Tag::Symbol)
    }
}

/// A handle standing in for a native-owned resource that must be released
/// exactly once (a compiled regex, a captured match region, ...). Builds
/// with `debug_assertions` catch both a missed release (resource leaked
/// past its cell's death) and a double release (spec.md §8 property 8,
/// finalizer idempotence) by panicking instead of silently doing nothing.
pub struct NativeResource {
    label: &'static str,
    released: bool,
}

impl NativeResource {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            released: false,
        }
    }

    /// Release the resource. Must be called by the sweeper and never by
    /// collaborator code directly.
    pub fn release(&mut self) {
        debug_assert!(!self.released, "{} released twice", self.label);
        self.released = true;
    }
}

impl Drop for NativeResource {
    fn drop(&mut self) {
        debug_assert!(
            self.released,
            "{} dropped without going through the finalizer",
            self.label
        );
    }
}

/// A single entry in a class/module's method table.
pub struct Method {
    /// The method body's captured closure environment, if any (traced and
    /// finalized along with the owning class/module, spec.md §4.3's
    /// "for each method in the method table, the method's closure
    /// environment").
    pub closure: Option<Env>,
}

pub struct StringData {
    pub bytes: Vec<u8>,
}

pub struct SymbolData {
    pub name: Box<str>,
}

pub struct ArrayData {
    pub elements: Vec<Value>,
}

pub struct HashEntry {
    pub key: Value,
    pub value: Value,
}

pub struct HashData {
    /// Insertion-ordered entries — the safe-Rust analogue of the C
    /// source's separate ordered `key_list` plus lookup `hashmap`; a `Vec`
    /// already preserves insertion order and a single allocation covers
    /// both roles the original source split across two native structures.
    pub entries: Vec<HashEntry>,
    pub default_value: Option<Value>,
    pub default_block: Option<Value>,
}

pub struct RangeData {
    pub begin: Value,
    pub end: Value,
    pub exclusive: bool,
}

pub struct RegexData {
    pub source: Box<str>,
    pub compiled: NativeResource,
}

pub struct MatchData {
    pub region: NativeResource,
    pub captured: Vec<u8>,
}

pub struct IoData {
    pub fd: i32,
}

pub struct ProcData {
    pub closure: Env,
}

pub struct ThreadData {
    pub value: Option<Value>,
}

pub struct ClassModuleData {
    pub name: Box<str>,
    /// `None` for modules; `Some` for classes (possibly `Object`'s own
    /// superclass slot, which is itself `None`).
    pub superclass: Option<CellRef>,
    pub included_modules: Vec<CellRef>,
}

pub struct ExceptionData {
    pub message: Box<str>,
    pub backtrace: Option<Value>,
}

pub struct EncodingData {
    pub names: Value,
}

/// Per-variant payload. `None` covers the variants that carry nothing
/// beyond the common fields every cell has (`Nil`, `True`, `False`, `Io`,
/// `Other`, and a freed cell).
pub enum Payload {
    None,
    Integer(i64),
    String(StringData),
    Symbol(SymbolData),
    Array(ArrayData),
    Hash(HashData),
    Range(RangeData),
    Regex(RegexData),
    MatchData(MatchData),
    Io(IoData),
    Proc(ProcData),
    Thread(ThreadData),
    ClassOrModule(ClassModuleData),
    Exception(ExceptionData),
    Encoding(EncodingData),
}

/// The header fields used only by the collector: the variant tag, the
/// mark bit (meaningful only mid-collection, spec.md §3 invariant 4), and
/// the free-list link (meaningful only while the cell is free).
pub struct CellHeader {
    pub tag: Tag,
    pub marked: bool,
    pub(crate) free_next: Option<CellRef>,
}

/// One heap cell. See the module doc for why native-owned resources must
/// be explicitly released at sweep time rather than relying on `Drop`.
pub struct Cell {
    pub(crate) header: CellHeader,
    pub class_ref: CellRef,
    pub owner: Option<CellRef>,
    pub singleton_class: Option<CellRef>,
    pub ivars: HashMap<Box<str>, Value>,
    /// `Some` only for classes and modules.
    pub constants: Option<HashMap<Box<str>, Value>>,
    /// `Some` only for classes and modules.
    pub cvars: Option<HashMap<Box<str>, Value>>,
    /// `Some` only for classes and modules.
    pub methods: Option<HashMap<Box<str>, Method>>,
    /// Inline closure environment for values that close over variables
    /// (procs, method bodies stored directly on the cell rather than in
    /// the method table — e.g. a hash's default block).
    pub env: Option<Env>,
    pub payload: Payload,
    /// Per-value lock for the host runtime's own mutation, not used by the
    /// collector itself (spec.md §5 "Per-cell locks are for the mutator's
    /// use"). `parking_lot::Mutex::new` cannot fail, so the C source's
    /// "abort on lock init failure" fatal path has no reachable Rust
    /// equivalent here — recorded in DESIGN.md.
    pub lock: Mutex<()>,
}

impl Cell {
    #[inline]
    pub fn tag(&self) -> Tag {
        self.header.tag
    }

    #[inline]
    pub fn is_marked(&self) -> bool {
        self.header.marked
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.header.tag == Tag::Free
    }

    /// Carries an inline environment worth tracing (spec.md §4.3 "if the
    /// cell carries an inline environment").
    #[inline]
    pub fn has_inline_env(&self) -> bool {
        self.env.is_some()
    }
}
