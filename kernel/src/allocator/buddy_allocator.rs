// kernel/src/allocator/buddy_allocator.rs
//
// Physical-memory buddy allocator. Backs the kernel heap (see
// `allocator::heap`), which in turn backs every `Box`/`Vec` the VM
// core uses for interior `PageTableNode`s and diagnostic output.
//
// Free blocks are singly-linked through their own first 8 bytes,
// accessed via the physical memory offset — the same trick the
// physical frame allocator and the VM core's node allocation lean on
// everywhere: kernel-mapped physical memory is always reachable at
// `physical_memory_offset() + phys`.

use spin::Mutex;
use x86_64::PhysAddr;

const MIN_ORDER: usize = 12; // 4 KiB
const MAX_ORDER: usize = 28; // 256 MiB, adjust to taste for a bigger heap

pub struct BuddyAllocator {
    free_lists: [FreeList; MAX_ORDER - MIN_ORDER + 1],
    total_memory: u64,
}

#[derive(Clone, Copy)]
struct FreeList {
    head: Option<PhysAddr>,
}

impl FreeList {
    const fn new() -> Self {
        Self { head: None }
    }
}

#[repr(C)]
struct FreeBlock {
    next: Option<PhysAddr>,
}

impl BuddyAllocator {
    pub const fn new() -> Self {
        const INIT: FreeList = FreeList::new();
        Self {
            free_lists: [INIT; MAX_ORDER - MIN_ORDER + 1],
            total_memory: 0,
        }
    }

    #[inline]
    fn order_to_index(&self, order: usize) -> usize {
        order - MIN_ORDER
    }

    /// Registers a usable physical memory region, breaking it into
    /// maximally-aligned power-of-two blocks.
    ///
    /// # Safety
    /// `[start, end)` must be physical memory not otherwise in use and
    /// reachable through the physical memory offset mapping.
    pub unsafe fn add_region(&mut self, start: u64, end: u64) {
        let mut current_addr = start;
        self.total_memory += end - start;

        while current_addr < end {
            let remaining = end - current_addr;
            if remaining < (1 << MIN_ORDER) {
                break;
            }

            let align_order = current_addr.trailing_zeros() as usize;
            let size_order = (63 - remaining.leading_zeros()) as usize;
            let order = align_order.min(size_order).min(MAX_ORDER).max(MIN_ORDER);

            self.add_block(order, PhysAddr::new(current_addr));
            current_addr += 1u64 << order;
        }
    }

    unsafe fn add_block(&mut self, order: usize, addr: PhysAddr) {
        let idx = self.order_to_index(order);
        let virt_addr = crate::memory::physical_memory_offset() + addr.as_u64();

        let new_block = FreeBlock {
            next: self.free_lists[idx].head,
        };
        virt_addr.as_mut_ptr::<FreeBlock>().write(new_block);
        self.free_lists[idx].head = Some(addr);
    }

    unsafe fn remove_from_head(&mut self, order: usize, addr: PhysAddr) {
        let idx = self.order_to_index(order);
        debug_assert_eq!(self.free_lists[idx].head, Some(addr));

        let virt = crate::memory::physical_memory_offset() + addr.as_u64();
        let block = &*virt.as_ptr::<FreeBlock>();
        self.free_lists[idx].head = block.next;
    }

    unsafe fn remove_arbitrary(&mut self, order: usize, addr: PhysAddr) {
        let idx = self.order_to_index(order);
        if self.free_lists[idx].head == Some(addr) {
            self.remove_from_head(order, addr);
            return;
        }

        let phys_offset = crate::memory::physical_memory_offset();
        let mut prev_addr = match self.free_lists[idx].head {
            Some(a) => a,
            None => return,
        };

        loop {
            let prev_virt = phys_offset + prev_addr.as_u64();
            let prev_block = &mut *prev_virt.as_mut_ptr::<FreeBlock>();
            match prev_block.next {
                Some(next_addr) if next_addr == addr => {
                    let target_virt = phys_offset + addr.as_u64();
                    let target_block = &*target_virt.as_ptr::<FreeBlock>();
                    prev_block.next = target_block.next;
                    return;
                }
                Some(next_addr) => prev_addr = next_addr,
                None => return,
            }
        }
    }

    unsafe fn is_free(&self, order: usize, addr: PhysAddr) -> bool {
        let idx = self.order_to_index(order);
        let phys_offset = crate::memory::physical_memory_offset();
        let mut current = self.free_lists[idx].head;
        while let Some(block_addr) = current {
            if block_addr == addr {
                return true;
            }
            let virt = phys_offset + block_addr.as_u64();
            current = (&*virt.as_ptr::<FreeBlock>()).next;
        }
        false
    }

    unsafe fn split_block(&mut self, from_order: usize, addr: PhysAddr, to_order: usize) {
        let mut current_order = from_order;
        while current_order > to_order {
            current_order -= 1;
            let buddy_addr = PhysAddr::new(addr.as_u64() + (1u64 << current_order));
            self.add_block(current_order, buddy_addr);
        }
    }

    #[inline]
    fn buddy_of(&self, addr: PhysAddr, order: usize) -> PhysAddr {
        PhysAddr::new(addr.as_u64() ^ (1u64 << order))
    }

    /// Allocates a `2^order`-byte block, aligned to its own size.
    ///
    /// # Safety
    /// `order` must be within `[MIN_ORDER, MAX_ORDER]`.
    pub unsafe fn allocate(&mut self, order: usize) -> Option<PhysAddr> {
        debug_assert!((MIN_ORDER..=MAX_ORDER).contains(&order));

        let idx = self.order_to_index(order);
        if let Some(addr) = self.free_lists[idx].head {
            self.remove_from_head(order, addr);
            return Some(addr);
        }

        for larger_order in (order + 1)..=MAX_ORDER {
            let larger_idx = self.order_to_index(larger_order);
            if let Some(addr) = self.free_lists[larger_idx].head {
                self.remove_from_head(larger_order, addr);
                self.split_block(larger_order, addr, order);
                return Some(addr);
            }
        }

        crate::serial_println_raw!("buddy: out of memory for order {}", order);
        None
    }

    /// Frees a block previously returned by `allocate(order)`, coalescing
    /// with its buddy when possible.
    ///
    /// # Safety
    /// `addr`/`order` must match a prior `allocate` call exactly once
    /// (no double-free, no mismatched order).
    pub unsafe fn deallocate(&mut self, addr: PhysAddr, order: usize) {
        debug_assert!((MIN_ORDER..=MAX_ORDER).contains(&order));
        debug_assert_eq!(addr.as_u64() % (1u64 << order), 0);

        let mut current_addr = addr;
        let mut current_order = order;

        while current_order < MAX_ORDER {
            let buddy_addr = self.buddy_of(current_addr, current_order);
            if !self.is_free(current_order, buddy_addr) {
                break;
            }
            self.remove_arbitrary(current_order, buddy_addr);
            current_addr = PhysAddr::new(current_addr.as_u64().min(buddy_addr.as_u64()));
            current_order += 1;
        }

        self.add_block(current_order, current_addr);
    }

    pub fn debug_print_stats(&self) {
        crate::serial_println!("buddy: {} MiB total", self.total_memory / (1024 * 1024));
        for order in MIN_ORDER..=MAX_ORDER {
            let idx = self.order_to_index(order);
            let mut count = 0usize;
            unsafe {
                let mut current = self.free_lists[idx].head;
                while let Some(addr) = current {
                    count += 1;
                    let virt = crate::memory::physical_memory_offset() + addr.as_u64();
                    current = (&*virt.as_ptr::<FreeBlock>()).next;
                }
            }
            if count > 0 {
                crate::serial_println!("  order {order}: {count} free block(s) of {} bytes", 1u64 << order);
            }
        }
    }
}

pub static BUDDY: Mutex<BuddyAllocator> = Mutex::new(BuddyAllocator::new());
