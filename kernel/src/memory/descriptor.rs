// kernel/src/memory/descriptor.rs
//
// `getPage` walks the radix tree down to one leaf slot and hands back
// a handle into it rather than copying the entry out — every later
// mutation (`mapPage`, `namePage`, `releasePage`, clone's per-page
// copy) goes through the same slot the lookup found. The original
// models this with four raw pointers into the owning node's parallel
// arrays plus the slot's un-translated virtual address; this port
// borrows the leaf node instead of pointing into it, so a descriptor
// cannot outlive the tree mutation that might drop it.

use super::entry::{PageAttributes, PageTableEntry};
use super::node::PageTableNode;

/// A transient handle onto one leaf slot, or the fact that `getPage`
/// was asked not to create one and found nothing.
pub enum PageDescriptor<'a> {
    Missing {
        vaddr: u64,
    },
    Present {
        vaddr: u64,
        node: &'a mut PageTableNode,
        index: usize,
    },
}

impl<'a> PageDescriptor<'a> {
    pub fn vaddr(&self) -> u64 {
        match self {
            PageDescriptor::Missing { vaddr } => *vaddr,
            PageDescriptor::Present { vaddr, .. } => *vaddr,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, PageDescriptor::Present { node, index, .. } if node.entries[*index].present())
    }

    pub fn entry(&self) -> Option<&PageTableEntry> {
        match self {
            PageDescriptor::Missing { .. } => None,
            PageDescriptor::Present { node, index, .. } => Some(&node.entries[*index]),
        }
    }

    pub fn entry_mut(&mut self) -> Option<&mut PageTableEntry> {
        match self {
            PageDescriptor::Missing { .. } => None,
            PageDescriptor::Present { node, index, .. } => Some(&mut node.entries[*index]),
        }
    }

    pub fn attrs(&self) -> Option<PageAttributes> {
        match self {
            PageDescriptor::Missing { .. } => None,
            PageDescriptor::Present { node, index, .. } => Some(node.attrs[*index]),
        }
    }

    pub fn set_attrs(&mut self, attrs: PageAttributes) {
        if let PageDescriptor::Present { node, index, .. } = self {
            node.attrs[*index] = attrs;
        }
    }

    pub fn name(&self) -> Option<&'static str> {
        match self {
            PageDescriptor::Missing { .. } => None,
            PageDescriptor::Present { node, index, .. } => node.names[*index],
        }
    }

    pub fn set_name(&mut self, name: &'static str) {
        if let PageDescriptor::Present { node, index, .. } = self {
            node.names[*index] = Some(name);
        }
    }

    /// Records the resolving virtual address in the leaf's debug slot,
    /// as `getPage` does unconditionally for every present lookup.
    pub fn record_debug_addr(&mut self) {
        if let PageDescriptor::Present { node, index, vaddr } = self {
            node.set_leaf_debug_addr(*index, *vaddr);
        }
    }
}
