// kernel/src/memory/entry.rs
//
// Hardware-mirroring leaf of the radix tree. `PageTableEntry` is a
// single 8-byte value read directly by the CPU's page-table walker
// whenever the owning node is the active CR3 (or reachable from it),
// so its bit layout must match x86_64 exactly: present/rw/user in the
// low bits, frame number in bits 12..52. Everything else the hardware
// format defines (NX, huge-page, PAT, accessed/dirty) stays zero —
// those policies are out of scope here (see spec Non-goals) and zero
// is the "disabled" state for all of them.
//
// `PageAttributes` is software-only bookkeeping that rides alongside
// each entry (in the node's parallel metadata arrays, not in this
// struct) to drive clone semantics.

use bitflags::bitflags;

/// Sentinel written into a slot's frame-number field when it has
/// never been populated, distinct from `present == false` ("explicitly
/// unmapped"). Catches accidental use of a zeroed interior node.
pub const ADDR_TRAP: u64 = 0x0BAD_C0DE;

const PRESENT_BIT: u64 = 1 << 0;
const RW_BIT: u64 = 1 << 1;
const USER_BIT: u64 = 1 << 2;
const ADDR_SHIFT: u32 = 12;
const ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// One hardware page-table entry.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    /// The "never populated" state every slot starts in: not present,
    /// writable/user set (harmless on an absent entry), frame number
    /// set to the trap sentinel so a stray present-bit flip is still
    /// caught by the trap check.
    pub const fn trap() -> Self {
        Self(RW_BIT | USER_BIT | (ADDR_TRAP << ADDR_SHIFT))
    }

    #[inline]
    pub fn present(&self) -> bool {
        self.0 & PRESENT_BIT != 0
    }

    #[inline]
    pub fn rw(&self) -> bool {
        self.0 & RW_BIT != 0
    }

    #[inline]
    pub fn user(&self) -> bool {
        self.0 & USER_BIT != 0
    }

    /// Physical frame number (physical address / 4096), or
    /// `ADDR_TRAP` if this slot was never populated.
    #[inline]
    pub fn frame(&self) -> u64 {
        (self.0 & ADDR_MASK) >> ADDR_SHIFT
    }

    #[inline]
    pub fn is_trapped(&self) -> bool {
        self.frame() == ADDR_TRAP
    }

    #[inline]
    pub fn set_present(&mut self, present: bool) {
        self.0 = (self.0 & !PRESENT_BIT) | if present { PRESENT_BIT } else { 0 };
    }

    #[inline]
    pub fn set_rw(&mut self, rw: bool) {
        self.0 = (self.0 & !RW_BIT) | if rw { RW_BIT } else { 0 };
    }

    #[inline]
    pub fn set_user(&mut self, user: bool) {
        self.0 = (self.0 & !USER_BIT) | if user { USER_BIT } else { 0 };
    }

    #[inline]
    pub fn set_frame(&mut self, frame: u64) {
        self.0 = (self.0 & !ADDR_MASK) | ((frame << ADDR_SHIFT) & ADDR_MASK);
    }
}

impl Default for PageTableEntry {
    fn default() -> Self {
        Self::trap()
    }
}

bitflags! {
    /// Per-leaf attribute byte driving clone behaviour (§3, §4.7) and
    /// carrying the user/kernel privilege bit for diagnostics.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PageAttributes: u8 {
        /// Inherited on clone: the child maps the same (or, with
        /// `COPY`, a duplicated) frame. Without `SHARED` the page is
        /// private and not inherited at all.
        const SHARED = 0b001;
        /// On clone, allocate a fresh frame and duplicate the source
        /// frame's contents into it rather than aliasing it. Only
        /// meaningful together with `SHARED`.
        const COPY   = 0b010;
        /// Mirrors the hardware user-accessible bit; tracked here too
        /// so `dump()` can report it without re-deriving it from the
        /// hardware entry.
        const USER   = 0b100;
    }
}

impl PageAttributes {
    /// `COPY` without `SHARED` is nonsensical (§4.7) — clone treats it
    /// as "not inherited", same as a bare private page.
    #[inline]
    pub fn is_inherited_on_clone(&self) -> bool {
        self.contains(PageAttributes::SHARED)
    }

    #[inline]
    pub fn is_copy_on_clone(&self) -> bool {
        self.contains(PageAttributes::SHARED) && self.contains(PageAttributes::COPY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn trap_entry_is_absent_and_trapped() {
        let e = PageTableEntry::trap();
        assert!(!e.present());
        assert!(e.is_trapped());
        assert_eq!(e.frame(), ADDR_TRAP);
    }

    #[test_case]
    fn frame_round_trips_through_set_frame() {
        let mut e = PageTableEntry::trap();
        e.set_frame(0x1234);
        e.set_present(true);
        assert!(e.present());
        assert_eq!(e.frame(), 0x1234);
        assert!(!e.is_trapped());
    }

    #[test_case]
    fn attribute_clone_rules() {
        let shared = PageAttributes::SHARED;
        let shared_copy = PageAttributes::SHARED | PageAttributes::COPY;
        let copy_only = PageAttributes::COPY;
        let private = PageAttributes::USER;

        assert!(shared.is_inherited_on_clone());
        assert!(!shared.is_copy_on_clone());

        assert!(shared_copy.is_inherited_on_clone());
        assert!(shared_copy.is_copy_on_clone());

        assert!(!copy_only.is_inherited_on_clone());
        assert!(!copy_only.is_copy_on_clone());

        assert!(!private.is_inherited_on_clone());
    }
}
