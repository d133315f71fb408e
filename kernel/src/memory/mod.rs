// kernel/src/memory/mod.rs
//
// The virtual-memory core: a four-level radix-tree page table
// (`node`), the per-leaf metadata that drives clone semantics
// (`entry`), the address space abstraction built on top of both
// (`address_space`), cross-address-space memory movement
// (`transfer`), diagnostics (`dump`), process-wide active-space state
// (`cpu_state`), and the physical frame pool leaf mappings draw from
// (`frame_allocator`).

use core::sync::atomic::{AtomicU64, Ordering};

use x86_64::VirtAddr;

pub mod address_space;
pub mod cpu_state;
pub mod descriptor;
pub mod dump;
pub mod entry;
pub mod frame_allocator;
pub mod node;
pub mod transfer;

/// Bytes per frame/page at every level of the tree.
pub const PAGE_SIZE: u64 = 4096;

/// Levels in the radix tree: PML4, PDPT, PD, PT.
pub const LEVELS: usize = 4;

/// Below this, a canonical virtual address equals its linear page
/// index. At and above it, the non-canonical hole has been collapsed
/// out of the upper half of the address space, so the true hole offset
/// must be subtracted back out before splitting into tree indices.
pub const CANONICAL_HOLE_THRESHOLD: u64 = 0xFFFF_8000_0000_0000;
pub const CANONICAL_HOLE_OFFSET: u64 = 0xFFFF_0000_0000_0000;

/// Reserved virtual slots used by `transfer::copy_page_physical` to
/// borrow a view of two arbitrary physical frames into the currently
/// active address space. Chosen deep in kernel space, well clear of
/// the heap and the bootloader's physical-memory mapping.
pub const TEMP_1: u64 = 0xFFFF_FF00_0000_0000;
pub const TEMP_2: u64 = TEMP_1 + PAGE_SIZE;

static PHYSICAL_MEMORY_OFFSET: AtomicU64 = AtomicU64::new(0);

/// Records the bootloader's physical-memory offset. Must run before
/// any frame is dereferenced through it (heap init, buddy allocator,
/// frame allocator).
pub fn init(physical_memory_offset: VirtAddr) {
    PHYSICAL_MEMORY_OFFSET.store(physical_memory_offset.as_u64(), Ordering::Relaxed);
}

/// The bootloader's physical-memory offset: physical address `p` is
/// reachable at `physical_memory_offset() + p` for as long as the
/// bootloader's own mapping (or an equivalent one) remains active.
pub fn physical_memory_offset() -> VirtAddr {
    VirtAddr::new(PHYSICAL_MEMORY_OFFSET.load(Ordering::Relaxed))
}

/// Collapses the canonical-address hole, returning the linear page
/// index `virt` falls on.
pub(crate) fn page_index(virt: u64) -> u64 {
    let mut fixed = virt;
    if fixed >= CANONICAL_HOLE_THRESHOLD {
        fixed -= CANONICAL_HOLE_OFFSET;
    }
    fixed / PAGE_SIZE
}

/// Splits a linear page index into four 9-bit radix-tree indices,
/// most significant (PML4) first.
pub(crate) fn tree_indices(page: u64) -> [usize; 4] {
    [
        (page / 512 / 512 / 512 % 512) as usize,
        (page / 512 / 512 % 512) as usize,
        (page / 512 % 512) as usize,
        (page % 512) as usize,
    ]
}
