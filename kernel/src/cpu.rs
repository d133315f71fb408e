// kernel/src/cpu.rs
//
// CPU primitives the VM core treats as an external collaborator (§6:
// `setCR3`, `CLI`, `STI`, `idle`). `setCR3` itself lives in
// `memory::address_space::AddressSpace::activate` next to the rest of
// the address-space state it updates; this module covers the other
// three, thin wrappers over the `x86_64` crate's instruction
// intrinsics so call sites read the same as the spec's interface list.

/// Masks interrupts on this CPU. Paired with `enable_interrupts` around
/// any critical section that must not be preempted (§5) — currently
/// only `AddressSpace::clone_address_space`.
pub fn disable_interrupts() {
    x86_64::instructions::interrupts::disable();
}

/// Unmasks interrupts, implicitly resuming whatever `sched::pause`
/// paused (§5).
pub fn enable_interrupts() {
    x86_64::instructions::interrupts::enable();
}

/// Halts the CPU until the next interrupt.
pub fn idle() {
    x86_64::instructions::hlt();
}

/// Parks the CPU forever, one `idle()` at a time. The steady state
/// `kernel_main` and every test binary fall into once boot/tests are
/// done.
pub fn idle_loop() -> ! {
    loop {
        idle();
    }
}
