//! Linux kernel bootstrap.
//!
//! Locates the kernel page global directory of a Linux guest, either from
//! the root register captured by the driver, or from the kernel's root
//! memory descriptor (`init_mm`) through the static kernel mapping.

mod arch;
mod config;
mod system_map;

#[cfg(test)]
mod mock;

use vmscope_core::{
    Architecture, InitError, KernelState, Pa, SymbolResolver, Va, VmiCore, VmiDriver, VmiOs,
};

pub use self::{
    arch::{ArchAdapter, phys_addr_32, phys_addr_64},
    config::LinuxConfig,
    system_map::SystemMap,
};

/// VMI operations for the Linux operating system.
pub struct LinuxOs<Driver, Symbols = SystemMap>
where
    Driver: VmiDriver,
    Symbols: SymbolResolver,
{
    symbols: Symbols,
    config: LinuxConfig,

    _marker: std::marker::PhantomData<Driver>,
}

impl<Driver, Symbols> LinuxOs<Driver, Symbols>
where
    Driver: VmiDriver,
    Driver::Architecture: ArchAdapter,
    Symbols: SymbolResolver,
{
    /// Creates a new `LinuxOs` instance with the default kernel layout.
    pub fn new(symbols: Symbols) -> Self {
        Self::with_config(symbols, LinuxConfig::default())
    }

    /// Creates a new `LinuxOs` instance.
    pub fn with_config(symbols: Symbols, config: LinuxConfig) -> Self {
        Self {
            symbols,
            config,
            _marker: std::marker::PhantomData,
        }
    }

    /// Returns the kernel layout configuration.
    pub fn config(&self) -> &LinuxConfig {
        &self.config
    }

    /// Returns the symbol resolver.
    pub fn symbols(&self) -> &Symbols {
        &self.symbols
    }

    /// Locates the kernel page global directory.
    ///
    /// A root register captured by the driver takes precedence. For a fully
    /// virtualized guest it is used directly, with its control bits
    /// dropped. For a paravirtualized guest it holds a virtual address,
    /// which is translated against the root derived from `init_mm`.
    ///
    /// Without a root register, the root is read from `init_mm.pgd`.
    pub fn locate_root(
        &self,
        vmi: &VmiCore<Driver>,
    ) -> Result<KernelState<Driver::Architecture>, InitError> {
        let register = vmi.current_root_register();
        let paravirtualized = vmi.is_paravirtualized();
        let init_mm = self.symbols.resolve(&self.config.root_symbol);

        tracing::debug!(
            register = ?register.map(Va),
            paravirtualized,
            init_mm = ?init_mm,
            "locating kernel root"
        );

        let mode = match (Driver::Architecture::configured_paging_mode(&self.config), init_mm) {
            (Some(mode), _) => mode,
            (None, Some(init_mm)) => {
                let physical_address_extension = vmi.info()?.physical_address_extension;
                Driver::Architecture::classify(init_mm, physical_address_extension)
            }
            (None, None) if register.is_some() => return Err(InitError::PagingModeUnknown),
            (None, None) => return Err(InitError::RootNotFound),
        };

        let root = match register {
            Some(value) if !paravirtualized => {
                Driver::Architecture::root_from_register(value, mode)
            }
            _ => {
                let init_mm = match (init_mm, register) {
                    (Some(init_mm), _) => init_mm,
                    (None, Some(_)) => {
                        return Err(InitError::SymbolNotFound(self.config.root_symbol.clone()));
                    }
                    (None, None) => return Err(InitError::RootNotFound),
                };

                let pgd = self.pgd_from_init_mm(vmi, mode, init_mm)?;

                match register {
                    Some(value) => {
                        let pa = vmi.translate_address(mode, Va(value), pgd)?;
                        tracing::debug!(va = %Va(value), %pa, "paravirtualized root register");
                        Driver::Architecture::root_from_register(pa.0, mode)
                    }
                    None => pgd,
                }
            }
        };

        let entry_point = self.symbols.resolve(&self.config.entry_symbol);

        tracing::debug!(%root, ?mode, entry_point = ?entry_point, "kernel root located");
        Ok(KernelState::new(root, mode).with_entry_point(entry_point))
    }

    /// Reads `init_mm.pgd` and converts it to a physical address.
    fn pgd_from_init_mm(
        &self,
        vmi: &VmiCore<Driver>,
        mode: <Driver::Architecture as Architecture>::PagingMode,
        init_mm: Va,
    ) -> Result<Pa, InitError> {
        let field = Driver::Architecture::phys_addr(
            &self.config,
            mode,
            init_mm + self.config.pgd_offset,
        )?;

        let address_width = Driver::Architecture::address_width(mode);
        let pgd = Va(vmi.read_address(field, address_width)?);
        let pa = Driver::Architecture::phys_addr(&self.config, mode, pgd)?;

        tracing::debug!(%field, %pgd, %pa, "init_mm.pgd");
        Ok(pa)
    }
}

impl<Driver, Symbols> VmiOs<Driver> for LinuxOs<Driver, Symbols>
where
    Driver: VmiDriver,
    Driver::Architecture: ArchAdapter,
    Symbols: SymbolResolver,
{
    fn locate_kernel(
        &self,
        vmi: &VmiCore<Driver>,
    ) -> Result<KernelState<Driver::Architecture>, InitError> {
        self.locate_root(vmi)
    }
}
