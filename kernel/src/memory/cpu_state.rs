// kernel/src/memory/cpu_state.rs
//
// Two pieces of process-wide mutable state every address space
// operation leans on, mirroring the original's `AddressSpace::kernelSpace`
// / `AddressSpace::current` statics:
//
//   - `KERNEL_SPACE`: the address space every CPU starts in. Never
//     cloned, never dropped.
//   - `CURRENT`: whichever address space is active on this CPU right
//     now (`activate()` updates it). `PageTableNode::physical_frame`
//     and `AddressSpace::get_physical_address` both consult it to
//     translate a heap virtual address before any address space has
//     been activated.
//
// A single `AtomicPtr` is enough here because this kernel is
// single-core and cooperatively scheduled (§9, and see `sched`) — the
// pointer is never raced, only ever read-modify-written from whichever
// context currently owns the CPU.

use core::sync::atomic::{AtomicPtr, Ordering};

use spin::Mutex;

use super::address_space::AddressSpace;

pub static KERNEL_SPACE: Mutex<Option<AddressSpace>> = Mutex::new(None);

static CURRENT: AtomicPtr<AddressSpace> = AtomicPtr::new(core::ptr::null_mut());

/// Called by `AddressSpace::activate()` once CR3 has been reloaded.
pub fn set_current(space: *mut AddressSpace) {
    CURRENT.store(space, Ordering::SeqCst);
}

/// The address space active on this CPU, if any has been activated
/// yet. `None` only during the earliest boot, before `memory::init`
/// runs.
pub fn current() -> Option<&'static mut AddressSpace> {
    let ptr = CURRENT.load(Ordering::SeqCst);
    if ptr.is_null() {
        None
    } else {
        // Safety: only ever pointed at an `AddressSpace` that outlives
        // every later access by `activate()`'s contract (the kernel
        // space is never dropped; a cloned process space is released
        // only after it stops being current).
        Some(unsafe { &mut *ptr })
    }
}

/// Translates a kernel heap virtual address to physical through
/// whichever address space is current, falling back to the
/// bootloader's flat physical-memory offset before any address space
/// has been activated.
pub fn current_translate(virt: u64) -> Option<u64> {
    current().map(|space| space.get_physical_address(virt))
}
