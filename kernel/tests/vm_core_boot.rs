// kernel/tests/vm_core_boot.rs
//
// End-to-end scenarios from spec §8 that need a fully booted
// environment (a live heap and physical frame pool) rather than just
// the unit-level invariants already covered by `#[test_case]`s next to
// the code in `kernel::memory`'s modules. A standalone bootable binary,
// the same shape as `kernel`'s own `main.rs`, exercised over QEMU via
// `bootimage test`.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(kernel::testing::test_runner)]
#![reexport_test_harness_main = "test_main"]

use bootloader_api::config::Mapping;
use bootloader_api::{entry_point, BootInfo, BootloaderConfig};

use kernel::memory::address_space::AddressSpace;
use kernel::memory::entry::PageAttributes;

pub static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    config.mappings.physical_memory = Some(Mapping::Dynamic);
    config
};

entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    kernel::init(boot_info);
    test_main();
    kernel::cpu::idle_loop();
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    kernel::serial_println!("[failed]\n");
    kernel::serial_println!("{}", info);
    kernel::testing::exit_qemu(kernel::testing::QemuExitCode::Failed)
}

/// Scenario 1 (§8): fresh `initEmpty` AS; `getPage(_, false)` on an
/// unpopulated interior slot is absent; `getPage(_, true)` walks down
/// to a leaf slot that exists but isn't mapped.
#[test_case]
fn empty_map_lookup() {
    let mut space = AddressSpace::new_empty();
    assert!(!space.get_page(0x1000, false).is_present());

    let created = space.get_page(0x1000, true);
    assert!(!created.is_present());
}

/// Scenario 2: single-page allocate/translate, and idempotence of
/// `allocate_space` on an already-allocated range.
#[test_case]
fn single_page_allocate_and_translate() {
    let mut space = AddressSpace::new_empty();
    space.allocate_space(0x4_0000, 4096, PageAttributes::USER);

    let phys = space.get_physical_address(0x4_0010);
    assert_eq!(phys % 4096, 0x10);

    let frame_before = space.get_physical_address(0x4_0000) / 4096;
    space.allocate_space(0x4_0000, 4096, PageAttributes::USER);
    let frame_after = space.get_physical_address(0x4_0000) / 4096;
    assert_eq!(frame_before, frame_after, "re-allocating a mapped page must not consume another frame");
}

/// Scenario 3: an unaligned `[base, base+size)` rounds outward to
/// whole pages on both ends.
#[test_case]
fn unaligned_range_spans_both_boundary_pages() {
    let mut space = AddressSpace::new_empty();
    space.allocate_space(0x4_0FFF, 2, PageAttributes::USER);

    assert!(space.get_page(0x4_0000, false).is_present());
    assert!(space.get_page(0x4_1000, false).is_present());
}

/// Release idempotence: releasing twice matches releasing once.
#[test_case]
fn release_space_is_idempotent() {
    let mut space = AddressSpace::new_empty();
    space.allocate_space(0x8_0000, 8192, PageAttributes::USER);

    space.release_space(0x8_0000, 8192);
    space.release_space(0x8_0000, 8192);

    assert!(!space.get_page(0x8_0000, false).is_present());
    assert!(!space.get_page(0x8_1000, false).is_present());
}

/// Scenario 4: clone with mixed attributes — `SHARED` aliases the same
/// frame, `SHARED | COPY` duplicates into a new one with equal
/// contents, a bare private page isn't inherited at all.
#[test_case]
fn clone_with_mixed_attributes() {
    let phys_offset = kernel::memory::physical_memory_offset().as_u64();
    let mut a = AddressSpace::new_empty();

    let p1 = a.get_page(0x10_0000, true);
    AddressSpace::allocate_page(p1, PageAttributes::SHARED | PageAttributes::USER);

    let p2 = a.get_page(0x10_1000, true);
    let p2 = AddressSpace::allocate_page(p2, PageAttributes::SHARED | PageAttributes::COPY | PageAttributes::USER);
    let p2_frame = p2.entry().unwrap().frame();
    unsafe {
        core::ptr::write_bytes((phys_offset + p2_frame * 4096) as *mut u8, 0x42, 4096);
    }

    let p3 = a.get_page(0x10_2000, true);
    AddressSpace::allocate_page(p3, PageAttributes::USER);

    let mut b = a.clone_address_space();

    assert_eq!(
        a.get_physical_address(0x10_0000),
        b.get_physical_address(0x10_0000),
        "SHARED-only page must alias the same frame in the clone"
    );

    let a_frame = a.get_physical_address(0x10_1000) / 4096;
    let b_frame = b.get_physical_address(0x10_1000) / 4096;
    assert_ne!(a_frame, b_frame, "SHARED | COPY must duplicate onto a fresh frame");

    let a_byte = unsafe { *((phys_offset + a_frame * 4096) as *const u8) };
    let b_byte = unsafe { *((phys_offset + b_frame * 4096) as *const u8) };
    assert_eq!(a_byte, b_byte, "duplicated frame must carry the source's contents at clone time");

    assert!(!b.get_page(0x10_2000, false).is_present(), "private page must not be inherited");
}

/// Scenario 5: `write` across address spaces, byte-for-byte.
#[test_case]
fn write_across_address_spaces() {
    let mut target = AddressSpace::new_empty();
    target.allocate_space(0x20_0000, 8192, PageAttributes::USER);

    let buf: [u8; 8192] = core::array::from_fn(|i| (i % 251) as u8);
    target.write(buf.as_ptr() as u64, 0x20_0000, buf.len());

    let phys_offset = kernel::memory::physical_memory_offset().as_u64();
    for (i, expected) in buf.iter().enumerate() {
        let phys = target.get_physical_address(0x20_0000 + i as u64);
        let actual = unsafe { *((phys_offset + phys) as *const u8) };
        assert_eq!(actual, *expected, "byte {i} mismatched after cross-AS write");
    }
}

/// Scenario 6: the canonical hole collapses to a contiguous index
/// space — mapping exactly at the hole's upper edge behaves like any
/// other page.
#[test_case]
fn canonical_hole_boundary_maps_like_any_page() {
    let mut space = AddressSpace::new_empty();
    space.allocate_space(0xFFFF_8000_0000_0000, 4096, PageAttributes::USER);

    assert!(space.get_page(0xFFFF_8000_0000_0000, false).is_present());
    let phys = space.get_physical_address(0xFFFF_8000_0000_0000);
    assert_eq!(phys % 4096, 0);
}

/// No-leaks-on-destruction: dropping an address space releases every
/// `COPY`-owned frame back to the pool, and only those.
#[test_case]
fn drop_releases_copy_owned_frames() {
    use kernel::memory::frame_allocator::is_allocated;

    let mut owner = AddressSpace::new_empty();
    let page = owner.get_page(0x70_0000, true);
    let page = AddressSpace::allocate_page(page, PageAttributes::SHARED | PageAttributes::COPY | PageAttributes::USER);
    let owned_frame = page.entry().unwrap().frame();
    assert!(is_allocated(owned_frame));

    let mut clone = owner.clone_address_space();
    let clone_frame = clone.get_physical_address(0x70_0000) / 4096;
    assert!(is_allocated(clone_frame));
    assert_ne!(owned_frame, clone_frame);

    drop(owner);
    assert!(!is_allocated(owned_frame), "owner's COPY-owned frame must be released on drop");
    assert!(is_allocated(clone_frame), "clone's own COPY-owned frame is unaffected by owner's drop");

    drop(clone);
    assert!(!is_allocated(clone_frame), "clone's COPY-owned frame must be released on its own drop");
}
