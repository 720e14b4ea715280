//! Fixed-size cell blocks (spec.md §3 "Block"). A block is allocated once,
//! holds exactly `cell_count` cells at stable addresses, and is never
//! freed — mirrors the original C source's `nat_gc_block` arena, and the
//! teacher repo's own intrusive, never-unmapped block lists
//! (`examples/Starlight-JS-comet/src/block.rs`, `page.rs`).

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::cell::{Cell, CellHeader, Payload, Tag};
use crate::value::CellRef;

/// One arena of cells. Blocks are threaded into the heap's block list via
/// `next`, a raw intrusive pointer in the style the teacher repo uses for
/// its own page/block lists — there is no safe owner for a structure that
/// is allocated once and never torn down for the life of the process.
pub struct Block {
    cells: Box<[Cell]>,
    pub(crate) next: *mut Block,
}

impl Block {
    /// Build a freshly freed block of `cell_count` cells and leak it onto
    /// the heap; blocks are never deallocated, so there is no matching
    /// `from_raw`/drop pair, only this constructor.
    pub fn allocate(cell_count: usize) -> *mut Block {
        let mut cells = Vec::with_capacity(cell_count);
        for _ in 0..cell_count {
            cells.push(Cell::new_free());
        }
        let block = Box::new(Block {
            cells: cells.into_boxed_slice(),
            next: std::ptr::null_mut(),
        });
        Box::into_raw(block)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    /// A cell's address is stable for the process lifetime; used to hand
    /// out a [`CellRef`] while threading the free list and while sweeping.
    pub fn cell_ref(&self, index: usize) -> CellRef {
        unsafe { CellRef::from_raw(self.cells.as_ptr().add(index) as *mut Cell) }
    }

    /// Conservative membership test: does `ptr` fall within this block's
    /// cell array, at a cell-aligned offset? Used by `roots::is_heap_ptr`.
    pub fn contains_aligned(&self, ptr: *const u8) -> Option<CellRef> {
        let base = self.cells.as_ptr() as *const u8;
        let span = std::mem::size_of::<Cell>() * self.cells.len();
        let end = unsafe { base.add(span) };
        if ptr < base || ptr >= end {
            return None;
        }
        let offset = (ptr as usize) - (base as usize);
        if offset % std::mem::size_of::<Cell>() != 0 {
            return None;
        }
        let index = offset / std::mem::size_of::<Cell>();
        Some(self.cell_ref(index))
    }
}

impl Cell {
    /// A cell in its initial, never-yet-allocated state. Also reused by
    /// the sweeper to reset a dead cell back to free (`class_ref` is
    /// patched to the nil class separately, since a fresh cell has no
    /// heap to borrow that class from yet).
    pub(crate) fn new_free() -> Cell {
        Cell {
            header: CellHeader {
                tag: Tag::Free,
                marked: false,
                free_next: None,
            },
            class_ref: CellRef::dangling(),
            owner: None,
            singleton_class: None,
            ivars: HashMap::new(),
            constants: None,
            cvars: None,
            methods: None,
            env: None,
            payload: Payload::None,
            lock: Mutex::new(()),
        }
    }
}

// Blocks are only ever reached through the single mutator/GC thread
// (spec.md §5); the raw `next` pointer does not make this type Send/Sync
// on its own, so the heap that owns the block list provides those
// guarantees at its own boundary instead of here.
