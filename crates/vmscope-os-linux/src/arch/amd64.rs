use vmscope_arch_amd64::{Amd64, PagingMode};
use vmscope_core::{InitError, Pa, Va};

use super::ArchAdapter;
use crate::LinuxConfig;

impl ArchAdapter for Amd64 {
    fn configured_paging_mode(config: &LinuxConfig) -> Option<PagingMode> {
        config.paging_mode
    }

    fn classify(init_mm: Va, physical_address_extension: bool) -> PagingMode {
        Amd64::classify(init_mm, physical_address_extension)
    }

    fn root_from_register(value: u64, mode: PagingMode) -> Pa {
        Amd64::root_from_register(value, mode)
    }

    fn phys_addr(config: &LinuxConfig, mode: PagingMode, va: Va) -> Result<Pa, InitError> {
        match mode {
            PagingMode::Ia32e => phys_addr_64(config, va),
            PagingMode::Legacy | PagingMode::Pae => phys_addr_32(config, va),
        }
    }
}

/// `__phys_addr` of the 64-bit kernel text mapping.
///
/// `pa = va - __START_KERNEL_map + phys_base`
pub fn phys_addr_64(config: &LinuxConfig, va: Va) -> Result<Pa, InitError> {
    let offset = va
        .0
        .checked_sub(config.start_kernel_map)
        .ok_or(InitError::NotKernelMapped(va))?;

    Ok(Pa(offset.wrapping_add(config.phys_base)))
}

/// `__phys_addr` of the 32-bit kernel direct mapping.
///
/// `pa = va - PAGE_OFFSET`
pub fn phys_addr_32(config: &LinuxConfig, va: Va) -> Result<Pa, InitError> {
    if va.0 > u64::from(u32::MAX) {
        return Err(InitError::NotKernelMapped(va));
    }

    let pa = va
        .checked_sub(config.page_offset)
        .ok_or(InitError::NotKernelMapped(va))?;

    Ok(Pa(pa.0))
}
