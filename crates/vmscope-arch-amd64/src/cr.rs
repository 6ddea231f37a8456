use crate::{Pa, PagingMode};

/// Control register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ControlRegister {
    /// Control Register 0.
    Cr0,

    /// Control Register 3 ([`Cr3`]).
    Cr3,

    /// Control Register 4.
    Cr4,

    /// Extended Control Register 0.
    Xcr0,
}

/// `CR3` control register.
///
/// Contains the physical address of the top-level paging structure and
/// controls caching of that structure. Which bits form the address depends
/// on the paging mode.
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct Cr3(pub u64);

impl Cr3 {
    /// Returns the Process Context Identifier (PCID).
    pub fn pcid(self) -> u16 {
        (self.0 & 0xfff) as _
    }

    /// Returns true if the PCID should be invalidated.
    pub fn pcid_invalidate(self) -> bool {
        self.0 >> 63 & 1 != 0
    }

    /// Returns the physical address of the top-level paging structure.
    ///
    /// - **Legacy**: bits 31:12 (page directory, 4KB aligned)
    /// - **PAE**: bits 31:5 (page directory pointer table, 32-byte aligned)
    /// - **IA-32e**: bits 51:12 (PML4, 4KB aligned; PCID and the
    ///   invalidation bit are dropped)
    pub fn root(self, mode: PagingMode) -> Pa {
        let mask = match mode {
            PagingMode::Legacy => 0xffff_f000,
            PagingMode::Pae => 0xffff_ffe0,
            PagingMode::Ia32e => 0x000f_ffff_ffff_f000,
        };

        Pa(self.0 & mask)
    }
}

impl std::fmt::Debug for Cr3 {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Cr3")
            .field("pcid", &self.pcid())
            .field("pcid_invalidate", &self.pcid_invalidate())
            .field("value", &format_args!("0x{:x}", self.0))
            .finish()
    }
}

impl From<u64> for Cr3 {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Cr3> for u64 {
    fn from(value: Cr3) -> Self {
        value.0
    }
}
