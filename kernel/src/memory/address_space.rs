// kernel/src/memory/address_space.rs
//
// The central VM abstraction: a radix-tree root plus the operations
// that walk it. Grounded throughout in `AddressSpace.cc`.
//
// Two kinds of root exist (`Root`), a split the original doesn't need
// because it builds every address space, including the kernel's own,
// from scratch during early boot. This port instead starts inside a
// bootloader that has already built a full physical-memory mapping
// before a single line of kernel code runs (`Mapping::Dynamic`):
//
//   - `Root::Boot` wraps that pre-existing mapping. It owns no tree of
//     its own and only answers `get_physical_address` (as `virt -
//     physical_memory_offset()`, the bootloader's only mapping
//     policy). `activate()` on it is a no-op — CR3 already points at
//     it. Rebuilding the bootloader's identity/offset map through our
//     own tree one 4 KiB page at a time would cost hundreds of
//     thousands of entries for no behavioural gain, and is exactly the
//     "boot-time paging bring-up" this module leaves out of scope.
//   - `Root::Native` is an owned `PageTableNode` tree built the way the
//     original always builds one: `new_empty()`, `get_page`,
//     `map_page`, `clone()`, and friends all operate on it exactly as
//     described.
//
// Every operation below except the `Root::Boot` special cases is a
// direct port of the corresponding original method.

use alloc::boxed::Box;

use x86_64::registers::control::Cr3;
use x86_64::structures::paging::PhysFrame;
use x86_64::PhysAddr;

use super::cpu_state;
use super::descriptor::PageDescriptor;
use super::entry::{PageAttributes, ADDR_TRAP};
use super::frame_allocator::{FrameAllocator, FRAMES};
use super::node::PageTableNode;
use super::{page_index, tree_indices, PAGE_SIZE};

pub enum Root {
    Boot,
    Native(Box<PageTableNode>),
}

pub struct AddressSpace {
    root: Root,
}

impl AddressSpace {
    /// Wraps the bootloader's own mapping. Exactly one of these should
    /// ever exist, held in `cpu_state::KERNEL_SPACE`.
    pub fn boot() -> Self {
        Self { root: Root::Boot }
    }

    /// A fresh, owned address space with every slot unpopulated.
    /// Mirrors `initEmpty()` (folded into construction here, since
    /// nothing meaningful can be done with a `Root::Native` before its
    /// tree exists).
    pub fn new_empty() -> Self {
        Self {
            root: Root::Native(PageTableNode::new_trapped()),
        }
    }

    fn native_root(&mut self) -> &mut PageTableNode {
        match &mut self.root {
            Root::Native(root) => root.as_mut(),
            Root::Boot => panic!("address space operation requires an owned page-table tree; the boot address space has none (see Root::Boot)"),
        }
    }

    fn native_root_ref(&self) -> &PageTableNode {
        match &self.root {
            Root::Native(root) => root.as_ref(),
            Root::Boot => panic!("address space operation requires an owned page-table tree; the boot address space has none (see Root::Boot)"),
        }
    }

    pub fn is_boot(&self) -> bool {
        matches!(self.root, Root::Boot)
    }

    /// Loads this address space's root into CR3 and records it as the
    /// active one. A no-op on `Root::Boot`, whose mapping is already
    /// active from the moment the bootloader hands control to the
    /// kernel.
    pub fn activate(&mut self) {
        if let Root::Native(root) = &self.root {
            let frame_number = root.physical_frame();
            let frame = PhysFrame::containing_address(PhysAddr::new(frame_number * PAGE_SIZE));
            let flags = Cr3::read().1;
            unsafe {
                Cr3::write(frame, flags);
            }
        }
        cpu_state::set_current(self as *mut AddressSpace);
    }

    /// Walks the tree down to the leaf slot that `virt` resolves to,
    /// creating interior nodes along the way when `create` is set.
    /// Returns `PageDescriptor::Missing` only when an interior node is
    /// absent and `create` is false — once the walk reaches the leaf
    /// level it always returns `Present`, whether or not that leaf is
    /// actually mapped, exactly like the original (`getPhysicalAddress`
    /// relies on being able to read `entry.frame()` off an unmapped
    /// leaf without a null check).
    pub fn get_page(&mut self, virt: u64, create: bool) -> PageDescriptor<'_> {
        let indexes = tree_indices(page_index(virt));
        let mut node = self.native_root();

        for &idx in &indexes[..3] {
            node = if create {
                node.get_or_create_child(idx)
            } else {
                match node.get_child_mut(idx) {
                    Some(child) => child,
                    None => return PageDescriptor::Missing { vaddr: virt },
                }
            };
        }

        let leaf_index = indexes[3];
        let mut descriptor = PageDescriptor::Present {
            vaddr: virt,
            node,
            index: leaf_index,
        };
        descriptor.record_debug_addr();
        descriptor
    }

    /// Physical address `virt` currently resolves to, or the address
    /// implied by the trap sentinel if it was never mapped (callers
    /// that care should check `get_page(..).is_present()` first).
    ///
    /// `Root::Boot` owns no tree to walk: the bootloader's own mapping
    /// is a flat `virt = phys + physical_memory_offset()` identity, so
    /// this short-circuits straight to that arithmetic instead of
    /// falling into `get_page`'s `native_root()` (which panics for
    /// `Root::Boot`, as there is no tree to descend).
    pub fn get_physical_address(&mut self, virt: u64) -> u64 {
        if self.is_boot() {
            return virt - super::physical_memory_offset().as_u64();
        }

        let frame = match self.get_page(virt, false) {
            PageDescriptor::Missing { .. } => ADDR_TRAP,
            ref present => present.entry().map(|e| e.frame()).unwrap_or(ADDR_TRAP),
        };
        frame * PAGE_SIZE + (virt % PAGE_SIZE)
    }

    /// Installs `phys` as the leaf's mapping and records `attrs`.
    /// Marks `phys`'s frame allocated in the global frame pool, same
    /// as the original unconditionally does on every map.
    ///
    /// Takes no `self`: every caller already holds a `PageDescriptor`
    /// borrowed out of a prior `get_page` call, and a `self` parameter
    /// here would have to re-borrow the same address space while that
    /// borrow is still live for nothing this function actually needs
    /// (it only ever touches the descriptor and the global frame
    /// pool). Associated function instead of a method for that reason.
    pub fn map_page<'a>(mut page: PageDescriptor<'a>, phys: u64, attrs: PageAttributes) -> PageDescriptor<'a> {
        if let Some(allocator) = FRAMES.lock().as_mut() {
            allocator.mark_allocated(phys / PAGE_SIZE);
        }

        if let Some(entry) = page.entry_mut() {
            entry.set_present(true);
            entry.set_user(true);
            entry.set_rw(true);
            entry.set_frame(phys / PAGE_SIZE);
        }
        page.set_attrs(attrs);
        page.record_debug_addr();
        page
    }

    pub fn name_page(mut page: PageDescriptor<'_>, name: &'static str) {
        page.set_name(name);
    }

    /// Maps `page` to a freshly allocated frame if it isn't already
    /// present.
    pub fn allocate_page<'a>(page: PageDescriptor<'a>, attrs: PageAttributes) -> PageDescriptor<'a> {
        if page.is_present() {
            return page;
        }
        let frame = FRAMES
            .lock()
            .as_mut()
            .expect("frame allocator not initialized")
            .allocate()
            .expect("out of physical memory");
        Self::map_page(page, frame * PAGE_SIZE, attrs)
    }

    /// Maps every page in `[base, base + size)`, rounded out to whole
    /// pages, to freshly allocated frames.
    pub fn allocate_space(&mut self, base: u64, size: u64, attrs: PageAttributes) {
        let top = base + size;
        let base = base / PAGE_SIZE * PAGE_SIZE;
        let top = (top + PAGE_SIZE - 1) / PAGE_SIZE * PAGE_SIZE;

        let mut v = base;
        while v < top {
            let page = self.get_page(v, true);
            Self::allocate_page(page, attrs);
            v += PAGE_SIZE;
        }
    }

    /// Returns the mapped frame to the physical frame pool and resets
    /// the leaf slot to "never populated". A no-op if the page wasn't
    /// mapped.
    pub fn release_page(mut page: PageDescriptor<'_>) {
        if !page.is_present() {
            return;
        }
        let frame = page.entry().unwrap().frame();
        FRAMES
            .lock()
            .as_mut()
            .expect("frame allocator not initialized")
            .release(frame);

        if let PageDescriptor::Present { node, index, .. } = &mut page {
            node.clear_leaf(*index);
        }
    }

    pub fn release_space(&mut self, base: u64, size: u64) {
        let top = base + size;
        let base = base / PAGE_SIZE * PAGE_SIZE;
        let top = (top + PAGE_SIZE - 1) / PAGE_SIZE * PAGE_SIZE;

        let mut v = base;
        while v < top {
            let page = self.get_page(v, true);
            Self::release_page(page);
            v += PAGE_SIZE;
        }
    }

    /// Writes a single page's worth of bytes (at most) across address
    /// spaces: `buf` is a virtual address in the *current* address
    /// space, `base` a virtual address in `self`. See
    /// `transfer::write_page`.
    pub fn write_page(&mut self, buf: u64, base: u64, size: usize) {
        super::transfer::write_page(self, buf, base, size);
    }

    /// Arbitrary-length cross-address-space write, batched one page at
    /// a time. See `transfer::write`.
    pub fn write(&mut self, buf: u64, base: u64, size: usize) {
        super::transfer::write(self, buf, base, size);
    }

    /// Coalesced present-leaf report for diagnostics. See
    /// `dump::dump`.
    pub fn walk_present_leaves(&self, mut f: impl FnMut(u64, u64, PageAttributes, Option<&'static str>)) {
        if self.is_boot() {
            return;
        }
        let root = self.native_root_ref();
        for_each_present_leaf(root, |addr, node, index| {
            f(addr, node.entries[index].frame(), node.attrs[index], node.names[index]);
        });
    }

    /// Produces a new address space by walking every present leaf of
    /// this one: private pages (no `SHARED`) are dropped, `SHARED`
    /// pages are aliased into the clone, and `SHARED | COPY` pages get
    /// a freshly allocated frame with the source's contents duplicated
    /// into it via `transfer::copy_page_physical`.
    ///
    /// Disables interrupts and pauses the scheduler for the duration
    /// of the walk (§4.7/§5) — it repeatedly remaps `TEMP_1`/`TEMP_2`
    /// in the *current* address space and reloads CR3 to flush them,
    /// which is not safe to preempt.
    ///
    /// Panics if called on the boot address space, which carries no
    /// per-page attribute metadata to clone from.
    pub fn clone_address_space(&mut self) -> AddressSpace {
        if self.is_boot() {
            panic!("clone_address_space: the boot address space cannot be cloned");
        }

        crate::cpu::disable_interrupts();
        crate::sched::pause();

        let mut result = AddressSpace::new_empty();

        let root_ptr = self.native_root_ref() as *const PageTableNode;
        // Safety: see the identical pattern in `Drop::drop` below — the
        // walk only reads interior structure that outlives this call,
        // while mutation through `self` touches leaf slots only.
        let root = unsafe { &*root_ptr };

        for_each_present_leaf(root, |addr, node, index| {
            let attrs = node.attrs[index];

            if !attrs.is_inherited_on_clone() {
                return;
            }

            let old_entry = node.entries[index];
            let old_name = node.names[index];

            if attrs.is_copy_on_clone() {
                let new_page = result.get_page(addr, true);
                let new_page = AddressSpace::allocate_page(new_page, attrs);
                let new_frame = new_page.entry().unwrap().frame();
                AddressSpace::name_page(new_page, old_name.unwrap_or("---"));

                super::transfer::copy_page_physical(
                    old_entry.frame() * PAGE_SIZE,
                    new_frame * PAGE_SIZE,
                );
            } else {
                // Bare SHARED: alias the same frame by copying the raw
                // entry verbatim, exactly as §4.7 describes ("copy the
                // entire entry, attributes byte, ... from source to
                // P"). Deliberately does NOT go through `map_page` —
                // §4.7's tie-break note is explicit that the frame
                // allocator is not re-marked for this case, since the
                // frame is already allocated and this address space is
                // never the one that releases it (see `Drop`, §9).
                let mut new_page = result.get_page(addr, true);
                if let Some(entry) = new_page.entry_mut() {
                    *entry = old_entry;
                }
                new_page.set_attrs(attrs);
                if let Some(name) = old_name {
                    new_page.set_name(name);
                }
                new_page.record_debug_addr();
            }
        });

        crate::cpu::enable_interrupts();
        result
    }
}

/// Walks every present leaf in `root`, reconstructing the canonical
/// virtual address of each leaf and invoking `f` with that address
/// plus the leaf's owning node and slot index, so callers can read its
/// entry/attrs/name without a second tree walk. Shared by
/// `clone_address_space`, the `Drop` impl below, and `dump`.
pub(super) fn for_each_present_leaf(root: &PageTableNode, mut f: impl FnMut(u64, &PageTableNode, usize)) {
    for i in 0..512 {
        let Some(pml4_child) = root.get_child(i) else { continue };
        for j in 0..512 {
            let Some(pdpt_child) = pml4_child.get_child(j) else { continue };
            for l in 0..512 {
                let Some(pd_child) = pdpt_child.get_child(l) else { continue };
                for m in 0..512 {
                    if !pd_child.entries[m].present() {
                        continue;
                    }
                    let mut addr = i as u64;
                    addr = addr * 512 + j as u64;
                    addr = addr * 512 + l as u64;
                    addr = addr * 512 + m as u64;
                    addr *= PAGE_SIZE;
                    if addr >= 0x0000_8000_0000_0000 {
                        addr += super::CANONICAL_HOLE_OFFSET;
                    }
                    if pd_child.entries[m].is_trapped() {
                        // §4.7: a present leaf whose frame field is still
                        // the trap sentinel means the tree was corrupted
                        // by something other than this module's own
                        // accessors (those never leave `present` set on a
                        // trapped slot). Not recoverable.
                        fatal_corrupted_leaf(addr);
                    }
                    f(addr, pd_child, m);
                }
            }
        }
    }
}

/// Structural corruption: a leaf marked `present` whose frame field is
/// still the trap sentinel (§4.1's "Failure", §4.7's tie-break). Logs
/// through the lock-free writer and halts — this is not recoverable,
/// matching the base spec's declaration that the condition is fatal.
fn fatal_corrupted_leaf(vaddr: u64) -> ! {
    crate::serial_println_raw!("vm core: corrupted page table at {:#018x} (present leaf holds ADDR_TRAP)", vaddr);
    crate::cpu::idle_loop();
}

impl Drop for AddressSpace {
    /// Releases every `SHARED | COPY` leaf's frame back to the pool —
    /// the owner of a duplicated frame is whichever address space
    /// holds the `COPY` attribute, so only that side frees it on
    /// teardown. Aliased (`SHARED`-only) pages are left alone; their
    /// other owner is still using the frame.
    fn drop(&mut self) {
        if self.is_boot() {
            return;
        }

        let root_ptr = self.native_root_ref() as *const PageTableNode;
        // Safety: `for_each_present_leaf` only reads through `root_ptr`
        // while `self.get_page` below only touches leaf slots already
        // visited; no interior node is reallocated during the walk.
        let root = unsafe { &*root_ptr };

        let mut owned_leaves = alloc::vec::Vec::new();
        for_each_present_leaf(root, |addr, node, index| {
            if node.attrs[index].is_copy_on_clone() {
                owned_leaves.push(addr);
            }
        });

        for addr in owned_leaves {
            let page = self.get_page(addr, false);
            AddressSpace::release_page(page);
        }
    }
}
