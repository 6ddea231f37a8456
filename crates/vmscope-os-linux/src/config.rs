use serde::{Deserialize, Serialize};
use vmscope_arch_amd64::PagingMode;

/// Kernel layout parameters used while locating the translation root.
///
/// The defaults match stock x86 kernels. All fields may be omitted when
/// deserializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxConfig {
    /// Offset of the `pgd` field within `struct mm_struct`.
    pub pgd_offset: u64,

    /// Base of the kernel direct mapping on 32-bit kernels
    /// (`PAGE_OFFSET`).
    pub page_offset: u64,

    /// Base of the kernel text mapping on 64-bit kernels
    /// (`__START_KERNEL_map`).
    pub start_kernel_map: u64,

    /// Physical load address of the 64-bit kernel (`phys_base`).
    pub phys_base: u64,

    /// Name of the kernel's root memory descriptor symbol.
    pub root_symbol: String,

    /// Name of the kernel's initial task symbol.
    pub entry_symbol: String,

    /// Paging mode, if already known.
    ///
    /// When set, the mode is not derived from the root memory descriptor
    /// address.
    pub paging_mode: Option<PagingMode>,
}

impl Default for LinuxConfig {
    fn default() -> Self {
        Self {
            pgd_offset: 0x50,
            page_offset: 0xc000_0000,
            start_kernel_map: 0xffff_ffff_8000_0000,
            phys_base: 0,
            root_symbol: String::from("init_mm"),
            entry_symbol: String::from("init_task"),
            paging_mode: None,
        }
    }
}

impl LinuxConfig {
    /// Sets the offset of `mm_struct::pgd`.
    pub fn with_pgd_offset(self, pgd_offset: u64) -> Self {
        Self { pgd_offset, ..self }
    }

    /// Sets the 32-bit direct mapping base.
    pub fn with_page_offset(self, page_offset: u64) -> Self {
        Self {
            page_offset,
            ..self
        }
    }

    /// Sets the 64-bit physical load address.
    pub fn with_phys_base(self, phys_base: u64) -> Self {
        Self { phys_base, ..self }
    }

    /// Uses the given paging mode instead of deriving it.
    pub fn with_paging_mode(self, paging_mode: PagingMode) -> Self {
        Self {
            paging_mode: Some(paging_mode),
            ..self
        }
    }
}
