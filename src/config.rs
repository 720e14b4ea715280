//! Tunables and diagnostic flags, bundled the way the teacher repo bundles
//! its own `Config` (see `examples/Starlight-JS-comet/src/minimark.rs` and
//! sibling GC constructors): a plain value type passed once at `Heap`
//! construction rather than scattered `const` generics or cargo features.

/// Number of cells per heap block (`NAT_HEAP_BLOCK_CELL_COUNT` in the
/// original C source).
pub const DEFAULT_BLOCK_CELLS: usize = 200;

/// Pre-collection trigger ratio: `alloc` runs `collect` when
/// `cells_available / cells_total` drops below this (`NAT_HEAP_MIN_AVAIL_RATIO`).
pub const DEFAULT_R_PRE: f64 = 0.10;

/// Post-collection grow-to ratio: `collect` allocates blocks until
/// `cells_available / cells_total` reaches this
/// (`NAT_HEAP_MIN_AVAIL_AFTER_COLLECTION_RATIO`).
pub const DEFAULT_R_AFTER: f64 = 0.20;

/// Runtime-configurable knobs for one [`Heap`](crate::heap::Heap) instance.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Cells per block. Changing this only affects blocks allocated after
    /// the change; existing blocks keep their original size.
    pub block_cells: usize,
    /// See [`DEFAULT_R_PRE`].
    pub r_pre: f64,
    /// See [`DEFAULT_R_AFTER`].
    pub r_after: f64,
    /// Stress mode: run a full collection on every `alloc` call, mirroring
    /// the C source's `NAT_GC_COLLECT_DEBUG` build flag. Useful for
    /// shaking out missing roots in collaborator code.
    pub collect_on_every_alloc: bool,
    /// Bypass collection entirely (mirrors `NAT_GC_DISABLE`). Used during
    /// bring-up of unrelated subsystems where the heap must not move under
    /// code that isn't GC-safe yet.
    pub gc_disabled: bool,
    /// Print a one-line report after every `collect`/`collect_all`
    /// (mirrors the teacher's `verbose`-gated `eprintln!` convention).
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_cells: DEFAULT_BLOCK_CELLS,
            r_pre: DEFAULT_R_PRE,
            r_after: DEFAULT_R_AFTER,
            collect_on_every_alloc: false,
            gc_disabled: false,
            verbose: false,
        }
    }
}
