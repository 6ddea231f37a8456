mod amd64;

pub use self::amd64::{phys_addr_32, phys_addr_64};

use vmscope_core::{Architecture, InitError, Pa, Va};

use crate::LinuxConfig;

/// Architecture-specific parts of the Linux kernel bootstrap.
pub trait ArchAdapter: Architecture {
    /// Returns the paging mode configured in `config`, if any.
    fn configured_paging_mode(config: &LinuxConfig) -> Option<Self::PagingMode>;

    /// Derives the paging mode from the address of the root memory
    /// descriptor.
    fn classify(init_mm: Va, physical_address_extension: bool) -> Self::PagingMode;

    /// Returns the translation root held in a raw root register value.
    fn root_from_register(value: u64, mode: Self::PagingMode) -> Pa;

    /// Converts an address in the statically mapped kernel region to a
    /// physical address without walking the page tables.
    fn phys_addr(config: &LinuxConfig, mode: Self::PagingMode, va: Va) -> Result<Pa, InitError>;
}
