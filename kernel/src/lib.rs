// kernel/src/lib.rs
//
// The virtual-memory core as a library crate: every module here is
// reused, unmodified, by the bare-metal binary (`main.rs`) and by
// every integration test under `tests/`, so the two can't drift out of
// sync on boot sequencing or on the VM core itself. `main.rs` is
// deliberately thin — boot config and the idle loop — with everything
// else living here.
//
// The `#[cfg(test)]` block at the bottom gives this crate its own
// bootable entry point when it's built as a test binary (`cargo test
// --lib`), exactly the way `main.rs` does for production, so the
// `#[test_case]`s scattered through `memory`'s modules run inside a
// real booted environment (heap + frame allocator up) rather than
// needing a mock.

#![no_std]
#![cfg_attr(test, no_main)]
#![feature(custom_test_frameworks)]
#![feature(alloc_error_handler)]
#![test_runner(crate::testing::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

pub mod allocator;
pub mod cpu;
pub mod memory;
pub mod panic;
pub mod sched;
pub mod serial;
pub mod testing;

use bootloader_api::info::MemoryRegionKind;
use bootloader_api::BootInfo;
use x86_64::VirtAddr;

/// Shared init sequence: records the bootloader's physical-memory
/// offset, seeds the kernel heap and the physical frame pool from its
/// memory map, then builds and activates the kernel's own address
/// space. Must run before any `Box<PageTableNode>` or frame allocation
/// — every later VM core operation assumes both pools are live.
pub fn init(boot_info: &'static mut BootInfo) {
    let physical_memory_offset = VirtAddr::new(
        boot_info
            .physical_memory_offset
            .into_option()
            .expect("bootloader did not provide a physical-memory offset (needs Mapping::Dynamic)"),
    );
    memory::init(physical_memory_offset);
    allocator::heap::init(&boot_info.memory_regions);

    let total_frames = boot_info
        .memory_regions
        .iter()
        .map(|region| region.end / memory::PAGE_SIZE)
        .max()
        .unwrap_or(0);
    let reserved_frames = boot_info
        .memory_regions
        .iter()
        .filter(|region| region.kind != MemoryRegionKind::Usable)
        .flat_map(|region| (region.start / memory::PAGE_SIZE)..(region.end / memory::PAGE_SIZE));
    memory::frame_allocator::init(total_frames, reserved_frames);

    *memory::cpu_state::KERNEL_SPACE.lock() = Some(memory::address_space::AddressSpace::boot());
    memory::cpu_state::KERNEL_SPACE
        .lock()
        .as_mut()
        .expect("just initialized")
        .activate();
}

#[cfg(test)]
mod test_harness {
    use bootloader_api::config::Mapping;
    use bootloader_api::{entry_point, BootInfo, BootloaderConfig};

    pub static TEST_BOOTLOADER_CONFIG: BootloaderConfig = {
        let mut config = BootloaderConfig::new_default();
        config.mappings.physical_memory = Some(Mapping::Dynamic);
        config
    };

    entry_point!(test_kernel_main, config = &TEST_BOOTLOADER_CONFIG);

    fn test_kernel_main(boot_info: &'static mut BootInfo) -> ! {
        crate::init(boot_info);
        crate::test_main();
        crate::cpu::idle_loop();
    }

    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        crate::serial_println!("[failed]\n");
        crate::serial_println!("{}", info);
        crate::testing::exit_qemu(crate::testing::QemuExitCode::Failed);
    }
}
