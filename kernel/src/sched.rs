// kernel/src/sched.rs
//
// Scheduler collaborator (spec §1/§6: "Process/thread objects and the
// scheduler — referenced only through a pause/resume interface used
// during clone"). No scheduler lives in this crate; `pause` exists so
// `AddressSpace::clone_address_space` has a single, named call site for
// the hand-off once a real one is wired in, rather than the critical
// section's scheduler half being silently assumed away. `resume` is
// implicit in re-enabling interrupts (§5), matching the original.

/// Pauses the cooperative scheduler for the calling context. No-op
/// until a scheduler exists to pause.
pub fn pause() {}
