// kernel/src/memory/transfer.rs
//
// Cross-address-space byte movement (§4.8). Two kernel-half scratch
// virtual slots, `TEMP_1`/`TEMP_2`, get aliased onto whichever
// physical frames a transfer needs to touch, in the *current* address
// space — the one whose root is actually live in CR3 — then CR3 is
// reloaded to flush any stale TLB entry for those two addresses before
// the copy runs.
//
// The boot address space (`Root::Boot`, see `address_space`) owns no
// page-table tree to alias `TEMP_1`/`TEMP_2` into, but it doesn't need
// one: the bootloader already maps every physical frame at
// `physical_memory_offset() + phys`, so a "window" onto an arbitrary
// frame is just that arithmetic, no scratch mapping or CR3 reload
// required. `window` below picks whichever strategy `current` needs.
//
// Grounded in `AddressSpace.cc`'s `copy_page_physical`/`writePage`/
// `write`; the original leaves `TEMP_1`/`TEMP_2` mapped between calls
// rather than releasing them after every copy (see SPEC_FULL.md,
// "Supplemented from original_source" #3) — remapping is idempotent
// here (`map_page` just overwrites the existing descriptor), so this
// port does the same without tracking "is it already mapped".

use super::address_space::AddressSpace;
use super::cpu_state;
use super::entry::PageAttributes;
use super::{PAGE_SIZE, TEMP_1, TEMP_2};

/// Returns a virtual address through which `phys` can be read or
/// written in `current` right now. For a native address space this
/// aliases `slot` onto `phys` with `SHARED` (any pre-existing mapping
/// at `slot` is simply overwritten); for the boot address space it's
/// the bootloader's own flat offset mapping.
fn window(current: &mut AddressSpace, slot: u64, phys: u64) -> u64 {
    if current.is_boot() {
        return super::physical_memory_offset().as_u64() + phys;
    }
    let page = current.get_page(slot, true);
    AddressSpace::map_page(page, phys, PageAttributes::SHARED);
    slot
}

/// Copies one whole physical frame into another via the current
/// address space's scratch windows, flushing the TLB with a CR3
/// reload in between (§4.8 step 3) so neither window can read stale
/// data left over from a previous transfer.
pub fn copy_page_physical(src_phys: u64, dst_phys: u64) {
    let current = cpu_state::current().expect("copy_page_physical: no address space is active");

    let src_virt = window(current, TEMP_1, src_phys);
    let dst_virt = window(current, TEMP_2, dst_phys);
    current.activate();

    unsafe {
        core::ptr::copy_nonoverlapping(src_virt as *const u8, dst_virt as *mut u8, PAGE_SIZE as usize);
    }
}

/// Single-page write across address-space boundaries: `buf` is a
/// virtual address in the *current* address space, `base` a virtual
/// address in `dest`. `size` must not exceed a page minus either
/// address's offset into its page.
///
/// # Aliasing
/// If `dest` happens to be the current address space itself (writing
/// into the AS you're already running in), `cpu_state::current()` and
/// `dest` alias. The transfer only ever touches `TEMP_1`/`TEMP_2` and
/// `dest`'s own leaf slots through that reference, never mutating the
/// same field the caller still holds, so this is safe in practice —
/// the same loose-aliasing contract the VM core relies on throughout
/// via its process-wide `current` pointer (§9).
pub fn write_page(dest: &mut AddressSpace, buf: u64, base: u64, size: usize) {
    let buf_page = buf & !(PAGE_SIZE - 1);
    let base_page = base & !(PAGE_SIZE - 1);
    let buf_offset = (buf - buf_page) as usize;
    let base_offset = (base - base_page) as usize;
    debug_assert!(
        buf_offset + size <= PAGE_SIZE as usize,
        "write_page: size overruns the source page"
    );
    debug_assert!(
        base_offset + size <= PAGE_SIZE as usize,
        "write_page: size overruns the destination page"
    );

    let current = cpu_state::current().expect("write_page: no address space is active");
    let src_phys = current.get_physical_address(buf_page);
    let dst_phys = dest.get_physical_address(base_page);

    let src_virt = window(current, TEMP_1, src_phys);
    let dst_virt = window(current, TEMP_2, dst_phys);
    current.activate();

    unsafe {
        core::ptr::copy_nonoverlapping(
            (src_virt + buf_offset as u64) as *const u8,
            (dst_virt + base_offset as u64) as *mut u8,
            size,
        );
    }
}

/// Arbitrary-length cross-address-space copy, batched one page at a
/// time rather than byte-by-byte (§4.8 notes this as an allowed
/// implementation choice): each iteration moves as many bytes as fit
/// before either the source or destination address crosses a page
/// boundary, remapping `TEMP_1`/`TEMP_2` only when it does.
pub fn write(dest: &mut AddressSpace, buf: u64, base: u64, size: usize) {
    let mut remaining = size;
    let mut src = buf;
    let mut dst = base;

    while remaining > 0 {
        let src_left = PAGE_SIZE - src % PAGE_SIZE;
        let dst_left = PAGE_SIZE - dst % PAGE_SIZE;
        let chunk = src_left.min(dst_left).min(remaining as u64) as usize;

        write_page(dest, src, dst, chunk);

        src += chunk as u64;
        dst += chunk as u64;
        remaining -= chunk;
    }
}
