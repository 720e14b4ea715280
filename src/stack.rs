//! Conservative native-stack bounds and scanning (spec.md §4.2, and the
//! fix for the original C source's 4-byte stack-scan stride — a 32-bit
//! stride on a 64-bit build skips half of every candidate pointer and
//! silently drops roots). Grounded in the teacher's own conservative
//! scan in `marking.rs`'s `visit_conservative`, which already walks
//! `*const *const u8` (pointer-width) steps rather than a fixed byte
//! count.

use crate::fatal;

/// The address range of the calling thread's native stack, used to bound
/// the conservative scan. Platform support mirrors the teacher's own
/// `cfg`-gated stack introspection (`mutator.rs`).
#[derive(Clone, Copy, Debug)]
pub struct StackBounds {
    origin: *const u8,
    bound: *const u8,
}

impl StackBounds {
    /// # Safety
    /// Must be queried on the thread whose stack is being described;
    /// the result is meaningless on any other thread.
    pub fn current_thread_stack_bounds() -> StackBounds {
        #[cfg(target_os = "linux")]
        unsafe {
            let mut attr: libc::pthread_attr_t = std::mem::zeroed();
            if libc::pthread_getattr_np(libc::pthread_self(), &mut attr) != 0 {
                fatal!("pthread_getattr_np failed while scanning the native stack");
            }
            let mut stack_addr: *mut libc::c_void = std::ptr::null_mut();
            let mut stack_size: libc::size_t = 0;
            let rc = libc::pthread_attr_getstack(&attr, &mut stack_addr, &mut stack_size);
            libc::pthread_attr_destroy(&mut attr);
            if rc != 0 {
                fatal!("pthread_attr_getstack failed while scanning the native stack");
            }
            let bound = stack_addr as *const u8;
            let origin = bound.add(stack_size);
            StackBounds { origin, bound }
        }
        #[cfg(not(target_os = "linux"))]
        {
            fatal!("conservative stack scanning is not implemented for this platform")
        }
    }
}

/// Pointer-width, pointer-aligned walk of `[bounds.bound, bounds.origin)`,
/// calling `visit` with every word that looks like it could be a pointer.
/// The caller (`roots::gather`) is responsible for validating each word
/// against the heap before treating it as a root.
pub fn scan_conservatively(bounds: StackBounds, approx_top: *const u8, mut visit: impl FnMut(*const u8)) {
    let word = std::mem::size_of::<usize>();

    // spec.md §4.2/§7: require bottom_of_stack (`bounds.origin`) strictly
    // above top_of_stack (`approx_top`) — i.e. the stack grows downward.
    // `gc.c`'s `nat_gc_gather_roots` aborts outright rather than guessing a
    // direction when this doesn't hold; silently scanning the other way
    // would walk memory outside the thread's actual stack.
    if (approx_top as usize) >= (bounds.origin as usize) {
        fatal!("unsupported platform: stack does not grow downward");
    }
    let (mut low, high) = (approx_top, bounds.origin);

    // Align up to a pointer boundary; stack frames are at least
    // pointer-aligned on every platform this collector supports.
    let misalignment = (low as usize) % word;
    if misalignment != 0 {
        low = unsafe { low.add(word - misalignment) };
    }

    let mut scan = low as *const usize;
    let end = high as *const usize;
    while scan < end {
        let word_value = unsafe { scan.read_unaligned() };
        visit(word_value as *const u8);
        scan = unsafe { scan.add(1) };
    }
}

/// An approximation of the current stack pointer: the address of this
/// function's own local. Used as the near edge of the conservative scan
/// for the thread that is actually driving collection (mirrors the
/// teacher's `approximate_stack_pointer` in `heap.rs`).
#[inline(always)]
pub fn approximate_stack_pointer() -> *const u8 {
    let mut local: *const u8 = std::ptr::null();
    local = &local as *const *const u8 as *const u8;
    local
}
