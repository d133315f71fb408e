// kernel/src/main.rs
//
// Thin bare-metal entry point. Everything the VM core needs lives in
// the `kernel` library crate (`lib.rs`); this binary only supplies
// bootloader configuration, the boot sequence's last few steps, and
// the panic handler a final linked binary must provide exactly once.

#![no_std]
#![no_main]
#![cfg_attr(test, no_main)]
#![feature(custom_test_frameworks)]
#![test_runner(kernel::testing::test_runner)]
#![reexport_test_harness_main = "test_main"]

use bootloader_api::config::Mapping;
use bootloader_api::{entry_point, BootInfo, BootloaderConfig};

pub static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    config.mappings.physical_memory = Some(Mapping::Dynamic);
    config
};

entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    kernel::init(boot_info);

    #[cfg(test)]
    test_main();

    kernel::memory::dump::log(
        kernel::memory::cpu_state::KERNEL_SPACE
            .lock()
            .as_ref()
            .expect("kernel address space not initialized"),
    );

    kernel::cpu::idle_loop();
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    kernel::panic::handle(info)
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    kernel::serial_println!("[failed]\n");
    kernel::serial_println!("{}", info);
    kernel::testing::exit_qemu(kernel::testing::QemuExitCode::Failed)
}
