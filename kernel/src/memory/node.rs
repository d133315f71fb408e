// kernel/src/memory/node.rs
//
// One level of the four-level radix tree (PML4/PDPT/PD/PT all share
// this same shape — the level only changes how an index is
// interpreted, never the node layout). Two views live side by side:
//
//   - `entries`: the literal hardware page-table page. Exactly 4096
//     bytes, frame-aligned, read by the CPU whenever this node is
//     reachable from the active CR3.
//   - `slots`/`attrs`/`names`: software-only metadata the CPU never
//     sees, one triple per hardware entry. At interior levels `slots`
//     holds the child node; at the leaf level the spec overloads the
//     same slot as a debug virtual address once the entry resolves a
//     mapping (§4.1) — modelled here as an explicit enum rather than a
//     raw pointer reinterpreted by level, since the original leaves
//     that choice to the implementer.
//
// Grounded in `AddressSpace.cc`'s `page_directory_t` / `node_get_child`.

use alloc::boxed::Box;

use super::entry::{PageAttributes, PageTableEntry};

/// What a slot's software metadata currently holds.
pub enum NodeSlot {
    /// Never populated, or explicitly released back to this state.
    Empty,
    /// Interior level: the next node down.
    Child(Box<PageTableNode>),
    /// Leaf level: the virtual address this entry currently resolves,
    /// kept only for `dump()` — the hardware entry's frame field is
    /// the actual mapping.
    DebugAddr(u64),
}

/// A 4 KiB hardware page-table page plus its parallel metadata.
///
/// # Safety / layout
/// `entries` must be the first field and frame-aligned so that a
/// freshly `Box`-allocated node's own address *is* the physical frame
/// the hardware walker should be pointed at — no separate allocation
/// for the hardware-visible page.
#[repr(C, align(4096))]
pub struct PageTableNode {
    pub entries: [PageTableEntry; 512],
    pub slots: [NodeSlot; 512],
    pub attrs: [PageAttributes; 512],
    pub names: [Option<&'static str>; 512],
}

impl PageTableNode {
    /// A node with every slot in the "never populated" state.
    pub fn new_trapped() -> Box<Self> {
        Box::new(Self {
            entries: [PageTableEntry::trap(); 512],
            slots: core::array::from_fn(|_| NodeSlot::Empty),
            attrs: [PageAttributes::empty(); 512],
            names: [None; 512],
        })
    }

    /// This node's own physical frame number, i.e. the value a parent
    /// entry pointing at it should hold. `translate` resolves the
    /// node's heap virtual address through whichever address space is
    /// currently active; during early boot, before any address space
    /// has been activated, virtual and physical differ by exactly the
    /// bootloader's physical memory offset.
    pub fn physical_frame(&self) -> u64 {
        let virt = self as *const Self as u64;
        let phys = match super::cpu_state::current_translate(virt) {
            Some(phys) => phys,
            None => virt - super::physical_memory_offset().as_u64(),
        };
        phys / super::PAGE_SIZE
    }

    /// Returns the child node at `index`, allocating and wiring a
    /// fresh one if the slot was never populated. Mirrors
    /// `node_get_child`'s single test for "is this slot populated":
    /// `!present || frame == ADDR_TRAP`.
    ///
    /// Panics if `index` is a leaf-level slot already holding a debug
    /// address — callers are expected to know, from their own level
    /// bookkeeping, whether `index` is interior.
    pub fn get_or_create_child(&mut self, index: usize) -> &mut PageTableNode {
        let needs_init = !self.entries[index].present() || self.entries[index].is_trapped();

        if needs_init {
            let child = PageTableNode::new_trapped();
            let frame = child.physical_frame();

            self.entries[index].set_frame(frame);
            self.entries[index].set_present(true);
            self.entries[index].set_rw(true);
            self.entries[index].set_user(true);
            self.slots[index] = NodeSlot::Child(child);
        }

        match &mut self.slots[index] {
            NodeSlot::Child(child) => child.as_mut(),
            _ => unreachable!("populated interior slot must hold a Child"),
        }
    }

    /// Returns the child node at `index` without creating it.
    pub fn get_child(&self, index: usize) -> Option<&PageTableNode> {
        if !self.entries[index].present() || self.entries[index].is_trapped() {
            return None;
        }
        match &self.slots[index] {
            NodeSlot::Child(child) => Some(child),
            _ => None,
        }
    }

    pub fn get_child_mut(&mut self, index: usize) -> Option<&mut PageTableNode> {
        if !self.entries[index].present() || self.entries[index].is_trapped() {
            return None;
        }
        match &mut self.slots[index] {
            NodeSlot::Child(child) => Some(child),
            _ => None,
        }
    }

    /// Clears a leaf slot back to "never populated", dropping any
    /// debug-address metadata it held.
    pub fn clear_leaf(&mut self, index: usize) {
        self.entries[index] = PageTableEntry::trap();
        self.slots[index] = NodeSlot::Empty;
        self.attrs[index] = PageAttributes::empty();
        self.names[index] = None;
    }

    /// Records the virtual address a leaf entry currently resolves,
    /// for `dump()`. No-op at interior levels (overwriting a `Child`
    /// slot here would be a bug in the caller).
    pub fn set_leaf_debug_addr(&mut self, index: usize, vaddr: u64) {
        debug_assert!(!matches!(self.slots[index], NodeSlot::Child(_)));
        self.slots[index] = NodeSlot::DebugAddr(vaddr);
    }

    pub fn leaf_debug_addr(&self, index: usize) -> Option<u64> {
        match self.slots[index] {
            NodeSlot::DebugAddr(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn fresh_node_has_all_slots_trapped() {
        let node = PageTableNode::new_trapped();
        for i in 0..512 {
            assert!(node.entries[i].is_trapped());
            assert!(!node.entries[i].present());
        }
    }

    #[test_case]
    fn clear_leaf_resets_metadata() {
        let mut node = PageTableNode::new_trapped();
        node.entries[3].set_frame(0xA);
        node.entries[3].set_present(true);
        node.attrs[3] = PageAttributes::SHARED;
        node.names[3] = Some("stack");
        node.set_leaf_debug_addr(3, 0x1000);

        node.clear_leaf(3);

        assert!(node.entries[3].is_trapped());
        assert!(node.attrs[3].is_empty());
        assert!(node.names[3].is_none());
        assert!(node.leaf_debug_addr(3).is_none());
    }
}
