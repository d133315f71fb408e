// kernel/src/testing.rs
//
// `#[test_case]` harness for a `#![no_std]`/`#![no_main]` kernel: every
// test is any `Fn()`, `test_runner` drives them serially over the
// serial console, and the process exits through QEMU's isa-debug-exit
// device so a CI runner can read a pass/fail result without a
// framebuffer, keyboard, or any other driver this crate doesn't carry.
//
// Grounded in asterinas's `jinux-frame::test` (same `Testable`/
// `test_runner`/`QemuExitCode`/`exit_qemu` shape), adapted to this
// crate's serial macros. The panic handler that reports a failed test
// is NOT defined here — it belongs in whichever binary links this
// module in (`lib.rs`'s `#[cfg(test)]` harness, `main.rs`, or an
// integration test under `tests/`), since `#[panic_handler]` may only
// be defined once per linked binary and this module is shared by all
// of them.

pub trait Testable {
    fn run(&self);
}

impl<T: Fn()> Testable for T {
    fn run(&self) {
        crate::serial_print!("{}...\t", core::any::type_name::<T>());
        self();
        crate::serial_println!("[ok]");
    }
}

pub fn test_runner(tests: &[&dyn Testable]) {
    crate::serial_println!("running {} tests", tests.len());
    for test in tests {
        test.run();
    }
    exit_qemu(QemuExitCode::Success);
}

/// The exit code QEMU's isa-debug-exit device reports to the host as
/// `(code << 1) | 1`. `Cargo.toml`'s `test-success-exit-code = 33`
/// is exactly `(Success << 1) | 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x20,
}

pub fn exit_qemu(exit_code: QemuExitCode) -> ! {
    use x86_64::instructions::port::Port;
    unsafe {
        let mut port: Port<u32> = Port::new(0xf4);
        port.write(exit_code as u32);
    }
    crate::cpu::idle_loop();
}
