// kernel/src/memory/dump.rs
//
// Diagnostic range coalescing (§4.9). `AddressSpace::walk_present_leaves`
// already visits leaves in increasing canonical-address order (the
// radix tree's natural PML4/PDPT/PD/PT iteration order, re-offset for
// the canonical hole exactly as lookup does) so this just needs to
// merge a leaf into the previous run whenever both its virtual and
// physical address continue it — attributes are allowed to differ
// within a run, only contiguity is required.

use alloc::vec::Vec;

use super::address_space::AddressSpace;
use super::entry::PageAttributes;
use super::PAGE_SIZE;

/// One coalesced run of virtually and physically contiguous present
/// pages.
#[derive(Debug, Clone, Copy)]
pub struct Range {
    pub virt_start: u64,
    pub phys_start: u64,
    /// Run length, in pages.
    pub pages: u64,
    /// The attributes of the run's *first* leaf. A run may straddle
    /// leaves with differing attributes (§4.9 does not require them to
    /// match); this is only a representative sample for the report.
    pub attrs: PageAttributes,
    pub name: Option<&'static str>,
}

impl Range {
    pub fn length_bytes(&self) -> u64 {
        self.pages * PAGE_SIZE
    }
}

/// Produces the coalesced leaf report for `space`.
pub fn dump(space: &AddressSpace) -> Vec<Range> {
    let mut ranges: Vec<Range> = Vec::new();

    space.walk_present_leaves(|vaddr, frame, attrs, name| {
        let phys = frame * PAGE_SIZE;

        if let Some(last) = ranges.last_mut() {
            let virt_contiguous = last.virt_start + last.length_bytes() == vaddr;
            let phys_contiguous = last.phys_start + last.length_bytes() == phys;
            if virt_contiguous && phys_contiguous {
                last.pages += 1;
                return;
            }
        }

        ranges.push(Range {
            virt_start: vaddr,
            phys_start: phys,
            pages: 1,
            attrs,
            name,
        });
    });

    ranges
}

/// Logs `dump(space)` to the serial console, one line per coalesced
/// run, for post-mortem and boot-time diagnostics.
pub fn log(space: &AddressSpace) {
    let ranges = dump(space);
    crate::serial_println!("address space dump: {} run(s)", ranges.len());
    for range in ranges {
        crate::serial_println!(
            "  {:#018x}..{:#018x} -> {:#018x} [{:?}] {}",
            range.virt_start,
            range.virt_start + range.length_bytes(),
            range.phys_start,
            range.attrs,
            range.name.unwrap_or("-"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::entry::PageAttributes;

    #[test_case]
    fn adjacent_pages_coalesce_into_one_run() {
        let mut space = AddressSpace::new_empty();
        space.allocate_space(0x20_0000, 3 * 4096, PageAttributes::USER);

        let ranges = dump(&space);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].virt_start, 0x20_0000);
        assert_eq!(ranges[0].pages, 3);
    }

    #[test_case]
    fn non_adjacent_pages_stay_separate_runs() {
        let mut space = AddressSpace::new_empty();
        space.allocate_space(0x30_0000, 4096, PageAttributes::USER);
        space.allocate_space(0x50_0000, 4096, PageAttributes::USER);

        let ranges = dump(&space);
        assert_eq!(ranges.len(), 2);
    }
}
