//! The heap: the block list, the global free list threaded across every
//! block, and the bookkeeping `alloc`/`collect` need (spec.md §3 "Heap",
//! §6 external interfaces). Single designated mutator/GC thread, per
//! spec.md §5 — captured once at [`Heap::init`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::ThreadId;

use parking_lot::Mutex;

use crate::block::Block;
use crate::cell::{ClassModuleData, Payload, Tag};
use crate::config::Config;
use crate::env::{EnvStack, Globals};
use crate::fatal;
use crate::stack::StackBounds;
use crate::value::CellRef;

/// The three singleton values every cell's `class_ref` can ultimately
/// chain up to. Built during `init` with a self-referential `class_ref`
/// (each points at itself) since there is no prior class object to hang
/// them off — a deliberate bootstrap simplification recorded in
/// DESIGN.md, not a load-bearing invariant the collector depends on.
pub struct Singletons {
    pub object_class: CellRef,
    pub integer_class: CellRef,
    pub nil: CellRef,
    pub true_: CellRef,
    pub false_: CellRef,
}

/// One object heap. Exactly one instance is expected per runtime (see
/// `lib.rs` for the process-wide accessor), but nothing here prevents
/// building more than one for embedding or testing.
pub struct Heap {
    pub(crate) config: Config,

    /// Head of the intrusive, never-shrinking block list.
    blocks: Mutex<*mut Block>,
    block_count: AtomicUsize,

    /// Head of the free list threaded across every block's cells.
    free_list: Mutex<Option<CellRef>>,

    cells_total: AtomicUsize,
    cells_free: AtomicUsize,

    gc_enabled: AtomicBool,
    mutator_thread: Mutex<Option<ThreadId>>,
    stack_bounds: Mutex<Option<StackBounds>>,

    /// Guards against the C source's latent bug of reading/writing a bare
    /// `gc_enabled`/"are we mid-collection" flag with no synchronization
    /// (spec.md §9's "FIXME: use a mutex"). `collect` takes this lock for
    /// the duration of one collection cycle.
    pub(crate) collecting: Mutex<bool>,

    pub globals: Globals,
    pub envs: EnvStack,
    singletons: Mutex<Option<Singletons>>,
}

// Every field that is actually shared across threads is guarded by one of
// the `parking_lot` locks or `Atomic*` counters above — the block list
// (`blocks`), the free list, the mutator-thread identity, `stack_bounds`,
// `collecting`, and `singletons` all take their own mutex, and `globals`/
// `envs` (`Globals`/`EnvStack`, see `env.rs`) guard their own state with
// `parking_lot::Mutex` rather than a bare `RefCell` for exactly this
// reason. The only raw pointers reachable from `Heap` are `Block::next`
// (walked only while holding `blocks`) and the `CellRef`s cells/values
// carry, which `value.rs` marks `Send`/`Sync` under the same per-cell-lock/
// single-mutator-thread contract spec.md §5 already requires collaborators
// to respect. This mirrors the teacher's `unsafe impl Send`/`Sync` for
// `GlobalSafepoint` (`safepoint.rs`), which earns the same impls by
// routing every shared field through `local_heaps_mutex`.
unsafe impl Send for Heap {}
unsafe impl Sync for Heap {}

impl Heap {
    pub fn new(config: Config) -> Heap {
        Heap {
            config,
            blocks: Mutex::new(std::ptr::null_mut()),
            block_count: AtomicUsize::new(0),
            free_list: Mutex::new(None),
            cells_total: AtomicUsize::new(0),
            cells_free: AtomicUsize::new(0),
            gc_enabled: AtomicBool::new(!config.gc_disabled),
            mutator_thread: Mutex::new(None),
            stack_bounds: Mutex::new(None),
            collecting: Mutex::new(false),
            globals: Globals::new(),
            envs: EnvStack::new(),
            singletons: Mutex::new(None),
        }
    }

    /// Capture the calling thread as the sole mutator/GC thread, allocate
    /// the first blocks up to `r_after`, and build the pinned singletons.
    /// Must be called exactly once, before any `alloc`/`collect` call.
    pub fn init(&self) {
        {
            let mut mutator = self.mutator_thread.lock();
            if mutator.is_some() {
                fatal!("Heap::init called twice");
            }
            *mutator = Some(std::thread::current().id());
        }
        *self.stack_bounds.lock() = Some(StackBounds::current_thread_stack_bounds());
        self.grow_to_ratio(self.config.r_after);
        self.bootstrap_singletons();
    }

    /// The mutator thread's stack extent, captured once at [`Heap::init`]
    /// (spec.md §4.2 — `StackBounds` captures `bottom_of_stack` at init
    /// time, not freshly on every collection).
    pub(crate) fn stack_bounds(&self) -> StackBounds {
        (*self.stack_bounds.lock()).unwrap_or_else(|| fatal!("heap used before Heap::init"))
    }

    /// Build the root-set's pinned singletons (spec.md §4.2 point 3:
    /// "Add the globally rooted class `Object`, class `Integer`, `nil`,
    /// `true`, and `false` objects"). `Object`/`Integer` are ordinary
    /// class cells; `nil`/`true`/`false` are self-classed, since there is
    /// no prior class object to hang them off during bootstrap (see
    /// DESIGN.md).
    fn bootstrap_singletons(&self) {
        let mut object_class = self.alloc_raw(Tag::Class);
        let mut integer_class = self.alloc_raw(Tag::Class);
        let nil = self.alloc_raw(Tag::Nil);
        let true_ = self.alloc_raw(Tag::True);
        let false_ = self.alloc_raw(Tag::False);
        unsafe {
            object_class.as_mut().class_ref = object_class;
            object_class.as_mut().payload = Payload::ClassOrModule(ClassModuleData {
                name: "Object".into(),
                superclass: None,
                included_modules: Vec::new(),
            });
            integer_class.as_mut().class_ref = object_class;
            integer_class.as_mut().payload = Payload::ClassOrModule(ClassModuleData {
                name: "Integer".into(),
                superclass: Some(object_class),
                included_modules: Vec::new(),
            });
            let mut nil = nil;
            let mut true_ = true_;
            let mut false_ = false_;
            nil.as_mut().class_ref = nil;
            true_.as_mut().class_ref = true_;
            false_.as_mut().class_ref = false_;
        }
        *self.singletons.lock() = Some(Singletons {
            object_class,
            integer_class,
            nil,
            true_,
            false_,
        });
    }

    pub fn singletons(&self) -> Singletons {
        self.singletons
            .lock()
            .as_ref()
            .map(|s| Singletons {
                object_class: s.object_class,
                integer_class: s.integer_class,
                nil: s.nil,
                true_: s.true_,
                false_: s.false_,
            })
            .unwrap_or_else(|| fatal!("heap used before Heap::init"))
    }

    #[inline]
    pub fn is_mutator_thread(&self) -> bool {
        *self.mutator_thread.lock() == Some(std::thread::current().id())
    }

    #[inline]
    fn assert_mutator_thread(&self, what: &str) {
        if !self.is_mutator_thread() {
            fatal!("{what} called from a thread other than the one that called Heap::init");
        }
    }

    pub fn gc_enabled(&self) -> bool {
        self.gc_enabled.load(Ordering::Acquire)
    }

    pub fn set_gc_enabled(&self, enabled: bool) {
        self.gc_enabled.store(enabled, Ordering::Release);
    }

    /// Fraction of cells currently on the free list. Safe from any thread
    /// (spec.md §6): reflects the last collection's counts, which is all
    /// a cross-thread caller could ever observe of a heap it doesn't own.
    pub fn available_ratio(&self) -> f64 {
        let total = self.cells_total.load(Ordering::Acquire);
        if total == 0 {
            return 0.0;
        }
        self.cells_free.load(Ordering::Acquire) as f64 / total as f64
    }

    pub fn cells_total(&self) -> usize {
        self.cells_total.load(Ordering::Acquire)
    }

    pub fn cells_free(&self) -> usize {
        self.cells_free.load(Ordering::Acquire)
    }

    /// Allocate and thread in enough new blocks to bring
    /// `cells_free / cells_total` up to at least `ratio`. Blocks are never
    /// freed, so this only ever grows the heap (spec.md §3, §4.1).
    pub(crate) fn grow_to_ratio(&self, ratio: f64) {
        loop {
            let total = self.cells_total.load(Ordering::Acquire);
            let free = self.cells_free.load(Ordering::Acquire);
            if total > 0 && (free as f64) / (total as f64) >= ratio {
                return;
            }
            self.add_block();
        }
    }

    fn add_block(&self) {
        let raw = Block::allocate(self.config.block_cells);
        let block = unsafe { &*raw };
        let n = block.cell_count();

        // Prepend the new cells to the free list, walking from this
        // block's last cell down to its first so the list head ends up
        // at cell 0 (matches the original source's block-prepend order).
        let mut free_list = self.free_list.lock();
        for i in (0..n).rev() {
            let mut cell_ref = block.cell_ref(i);
            unsafe {
                cell_ref.as_mut().header.free_next = *free_list;
            }
            *free_list = Some(cell_ref);
        }
        drop(free_list);

        let mut blocks = self.blocks.lock();
        unsafe {
            (*raw).next = *blocks;
        }
        *blocks = raw;
        drop(blocks);

        self.block_count.fetch_add(1, Ordering::AcqRel);
        self.cells_total.fetch_add(n, Ordering::AcqRel);
        self.cells_free.fetch_add(n, Ordering::AcqRel);
    }

    /// Pop a free cell off the free list, tagging it before handing it
    /// back. Returns `None` if the free list is empty — callers that want
    /// growth-then-retry semantics (i.e. everyone but the collector's own
    /// bootstrap) should go through `alloc` instead.
    pub(crate) fn try_alloc_raw(&self, tag: Tag) -> Option<CellRef> {
        let mut free_list = self.free_list.lock();
        let head = (*free_list)?;
        let mut head = head;
        *free_list = head.as_ref().header.free_next;
        drop(free_list);

        self.cells_free.fetch_sub(1, Ordering::AcqRel);
        let cell = head.as_mut();
        cell.header.tag = tag;
        cell.header.marked = false;
        cell.header.free_next = None;
        cell.payload = Payload::None;
        head
    }

    fn alloc_raw(&self, tag: Tag) -> CellRef {
        self.try_alloc_raw(tag)
            .unwrap_or_else(|| fatal!("no free cells during heap bootstrap"))
    }

    /// Allocate a cell of `tag`, tagged with `class_ref`. Triggers a
    /// collection (and, failing that, growth) exactly the way spec.md
    /// §4.1/§6 describe for `alloc`.
    pub fn alloc(&self, tag: Tag, class_ref: CellRef) -> CellRef {
        self.assert_mutator_thread("alloc");

        if self.config.collect_on_every_alloc && self.gc_enabled() {
            crate::collect::collect(self);
        } else if self.available_ratio() < self.config.r_pre && self.gc_enabled() {
            crate::collect::collect(self);
        }

        let cell_ref = match self.try_alloc_raw(tag) {
            Some(r) => r,
            None => {
                self.grow_to_ratio(self.config.r_after);
                self.try_alloc_raw(tag)
                    .unwrap_or_else(|| fatal!("heap exhausted after growth"))
            }
        };
        let mut cell_ref = cell_ref;
        cell_ref.as_mut().class_ref = class_ref;
        cell_ref
    }

    /// Conservative membership test used both by the root scanner and by
    /// collaborator code that wants to validate a suspect pointer
    /// (spec.md §4.2, §6 `is_heap_ptr`).
    pub fn is_heap_ptr(&self, ptr: *const u8) -> Option<CellRef> {
        let blocks = self.blocks.lock();
        let mut cur = *blocks;
        while !cur.is_null() {
            let block = unsafe { &*cur };
            if let Some(r) = block.contains_aligned(ptr) {
                if !r.as_ref().is_free() {
                    return Some(r);
                }
                return None;
            }
            cur = block.next;
        }
        None
    }

    /// Visit every block in the heap. Used by the sweeper and by
    /// diagnostics; takes a callback rather than returning an iterator
    /// since the block list is guarded by a lock for the duration.
    pub(crate) fn for_each_block(&self, mut f: impl FnMut(&Block)) {
        let blocks = self.blocks.lock();
        let mut cur = *blocks;
        while !cur.is_null() {
            let block = unsafe { &*cur };
            f(block);
            cur = block.next;
        }
    }

    pub(crate) fn push_free(&self, cell_ref: CellRef) {
        let mut free_list = self.free_list.lock();
        let mut cell_ref = cell_ref;
        cell_ref.as_mut().header.free_next = *free_list;
        *free_list = Some(cell_ref);
        drop(free_list);
        self.cells_free.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn reset_free_count(&self, free: usize) {
        self.cells_free.store(free, Ordering::Release);
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }
}
