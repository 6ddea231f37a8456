use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, IntoBytes};

use crate::{Gfn, Pa, Va};

/// Supported paging modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PagingMode {
    /// 32-bit paging (2 levels, 4-byte entries, optional 4MB pages).
    Legacy,

    /// Physical Address Extension (3 levels, 8-byte entries, optional 2MB
    /// pages).
    Pae,

    /// 64-bit paging (4 levels, 8-byte entries, optional 1GB and 2MB
    /// pages).
    Ia32e,
}

impl PagingMode {
    /// Returns the address width (i.e. pointer size) of the paging mode in
    /// bytes.
    pub fn address_width(self) -> usize {
        match self {
            Self::Legacy => 4,
            Self::Pae => 4,
            Self::Ia32e => 8,
        }
    }

    /// Returns the size of a paging structure entry in bytes.
    pub fn entry_size(self) -> u64 {
        match self {
            Self::Legacy => 4,
            Self::Pae | Self::Ia32e => 8,
        }
    }

    /// Returns the level at which a page table walk starts.
    pub fn top_level(self) -> PageTableLevel {
        match self {
            Self::Legacy => PageTableLevel::Pd,
            Self::Pae => PageTableLevel::Pdpt,
            Self::Ia32e => PageTableLevel::Pml4,
        }
    }

    /// Returns the virtual address as seen by the paging structures.
    ///
    /// 32-bit modes only translate the low 32 bits. In 64-bit mode, the
    /// sign-extended upper bits are dropped.
    pub fn linear_address(self, va: Va) -> Va {
        match self {
            Self::Legacy | Self::Pae => Va(va.0 & 0xffff_ffff),
            Self::Ia32e => Va(va.0 & 0x0000_ffff_ffff_ffff),
        }
    }

    /// Returns the index of the entry selected by `va` in the table at
    /// `level`.
    pub fn index(self, va: Va, level: PageTableLevel) -> u64 {
        match (self, level) {
            (Self::Legacy, PageTableLevel::Pd) => (va.0 >> 22) & 0x3ff,
            (Self::Legacy, _) => (va.0 >> 12) & 0x3ff,

            (Self::Pae, PageTableLevel::Pdpt) => (va.0 >> 30) & 0x3,

            (_, PageTableLevel::Pml4) => (va.0 >> 39) & 0x1ff,
            (_, PageTableLevel::Pdpt) => (va.0 >> 30) & 0x1ff,
            (_, PageTableLevel::Pd) => (va.0 >> 21) & 0x1ff,
            (_, PageTableLevel::Pt) => (va.0 >> 12) & 0x1ff,
        }
    }

    /// Returns the offset mask of a page mapped at `level`, or `None` if the
    /// page-size bit is reserved at that level.
    ///
    /// The `PT` level always maps a 4KB page; bit 7 there is the PAT bit.
    pub fn page_offset_mask(self, level: PageTableLevel) -> Option<u64> {
        match (self, level) {
            (_, PageTableLevel::Pt) => Some(0xfff),

            // 4MB page (PSE).
            (Self::Legacy, PageTableLevel::Pd) => Some(0x3f_ffff),

            // 2MB page.
            (Self::Pae | Self::Ia32e, PageTableLevel::Pd) => Some(0x1f_ffff),

            // 1GB page.
            (Self::Ia32e, PageTableLevel::Pdpt) => Some(0x3fff_ffff),

            _ => None,
        }
    }

    /// Returns the mask selecting the physical address bits of an entry.
    pub fn address_mask(self) -> u64 {
        match self {
            Self::Legacy => 0xffff_f000,
            Self::Pae | Self::Ia32e => 0x000f_ffff_ffff_f000,
        }
    }
}

/// The levels in the page table hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PageTableLevel {
    /// Page Table (PT) - the lowest level, pointing directly to 4KB pages.
    Pt,

    /// Page Directory (PD) - can point to PTs, 2MB or 4MB large pages.
    Pd,

    /// Page Directory Pointer Table (PDPT) - can point to PDs or (in 64-bit
    /// mode) 1GB large pages.
    Pdpt,

    /// Page Map Level 4 (PML4) - the highest level in 4-level paging.
    Pml4,
}

impl PageTableLevel {
    /// Returns the next lower level in the page table hierarchy.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Pt => None,
            Self::Pd => Some(Self::Pt),
            Self::Pdpt => Some(Self::Pd),
            Self::Pml4 => Some(Self::Pdpt),
        }
    }

    /// Returns the conventional name of the level.
    pub fn name(self) -> &'static str {
        match self {
            Self::Pt => "PT",
            Self::Pd => "PD",
            Self::Pdpt => "PDPT",
            Self::Pml4 => "PML4",
        }
    }
}

/// A page table entry in the paging structures.
///
/// 4-byte legacy entries are zero-extended.
#[repr(transparent)]
#[derive(Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes)]
pub struct PageTableEntry(pub u64);

impl PageTableEntry {
    /// Checks if the page is present in physical memory.
    pub fn present(self) -> bool {
        self.0 & 1 != 0
    }

    /// Checks if the page is writable.
    pub fn write(self) -> bool {
        (self.0 >> 1) & 1 != 0
    }

    /// Checks if the page is accessible in user mode.
    pub fn supervisor(self) -> bool {
        (self.0 >> 2) & 1 != 0
    }

    /// Checks if the page has been accessed.
    pub fn accessed(self) -> bool {
        (self.0 >> 5) & 1 != 0
    }

    /// Checks if the page has been written to.
    pub fn dirty(self) -> bool {
        (self.0 >> 6) & 1 != 0
    }

    /// Checks if the page-size bit is set.
    pub fn large(self) -> bool {
        (self.0 >> 7) & 1 != 0
    }

    /// Checks if the page is global (shared between all processes).
    pub fn global(self) -> bool {
        (self.0 >> 8) & 1 != 0
    }

    /// Extracts the page frame number from a 64-bit entry.
    pub fn pfn(self) -> Gfn {
        const BITS: u64 = 40;
        const MASK: u64 = (1 << BITS) - 1;
        Gfn::new((self.0 >> 12) & MASK)
    }

    /// Returns the physical address this entry points to, either the next
    /// table or the base of a page mapped at `level`.
    pub fn address(self, mode: PagingMode, level: PageTableLevel) -> Pa {
        let mask = match mode.page_offset_mask(level) {
            Some(offset_mask) if level != PageTableLevel::Pt && self.large() => {
                mode.address_mask() & !offset_mask
            }
            _ => mode.address_mask(),
        };

        Pa(self.0 & mask)
    }
}

impl std::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PageTableEntry")
            .field("present", &self.present())
            .field("write", &self.write())
            .field("supervisor", &self.supervisor())
            .field("accessed", &self.accessed())
            .field("dirty", &self.dirty())
            .field("large", &self.large())
            .field("global", &self.global())
            .field("pfn", &self.pfn())
            .finish()
    }
}
