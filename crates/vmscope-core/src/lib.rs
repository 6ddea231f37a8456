//! Core VMI functionality.

pub mod arch;
mod core;
mod driver;
mod error;
mod event;
pub mod os;
mod session;

#[cfg(test)]
mod mock;

use zerocopy::{FromBytes, IntoBytes};

pub use self::{
    arch::{Architecture, EventReason, EventTrigger},
    core::{Gfn, Pa, Va, VcpuId, VmiInfo},
    driver::VmiDriver,
    error::{InitError, RegistrationError, TranslationError, VmiError},
    event::{
        EventDescriptor, EventHandle, EventRegistry, EventWatch, InterruptWatch, ListenOutcome,
        RegisterAccess, RegisterWatch, VmiEvent, VmiEventCallback, VmiEventContext,
    },
    os::{KernelState, SymbolResolver, VmiOs},
    session::VmiSession,
};

/// The core functionality for Virtual Machine Introspection (VMI).
///
/// Wraps a driver and provides typed access to guest physical memory and
/// page table walks. No translation is cached; every call goes to the
/// driver.
pub struct VmiCore<Driver>
where
    Driver: VmiDriver,
{
    driver: Driver,
}

impl<Driver> VmiCore<Driver>
where
    Driver: VmiDriver,
{
    /// Creates a new `VmiCore` instance with the given driver.
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }

    /// Returns the driver used by this `VmiCore` instance.
    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Consumes the `VmiCore` and returns the driver.
    pub fn into_driver(self) -> Driver {
        self.driver
    }

    /// Retrieves information about the virtual machine.
    pub fn info(&self) -> Result<VmiInfo, VmiError> {
        self.driver.info()
    }

    /// Pauses the virtual machine.
    pub fn pause(&self) -> Result<(), VmiError> {
        self.driver.pause()
    }

    /// Resumes the virtual machine.
    pub fn resume(&self) -> Result<(), VmiError> {
        self.driver.resume()
    }

    /// Pauses the virtual machine and returns a guard that will resume it when
    /// dropped.
    pub fn pause_guard(&self) -> Result<VmiPauseGuard<'_, Driver>, VmiError> {
        VmiPauseGuard::new(&self.driver)
    }

    /// Returns the raw value of the page table root register, if the
    /// driver captured one.
    pub fn current_root_register(&self) -> Option<u64> {
        self.driver.current_root_register()
    }

    /// Returns `true` if the guest is paravirtualized.
    pub fn is_paravirtualized(&self) -> bool {
        self.driver.is_paravirtualized()
    }

    /// Reads guest physical memory.
    pub fn read(&self, pa: Pa, buffer: &mut [u8]) -> Result<(), VmiError> {
        self.driver.read_physical(pa, buffer)
    }

    /// Writes guest physical memory.
    pub fn write(&self, pa: Pa, buffer: &[u8]) -> Result<(), VmiError> {
        self.driver.write_physical(pa, buffer)
    }

    /// Reads a single byte from guest physical memory.
    pub fn read_u8(&self, pa: Pa) -> Result<u8, VmiError> {
        let mut buffer = [0u8; 1];
        self.read(pa, &mut buffer)?;
        Ok(buffer[0])
    }

    /// Reads a 32-bit unsigned integer from guest physical memory.
    pub fn read_u32(&self, pa: Pa) -> Result<u32, VmiError> {
        let mut buffer = [0u8; 4];
        self.read(pa, &mut buffer)?;
        Ok(u32::from_le_bytes(buffer))
    }

    /// Reads a 64-bit unsigned integer from guest physical memory.
    pub fn read_u64(&self, pa: Pa) -> Result<u64, VmiError> {
        let mut buffer = [0u8; 8];
        self.read(pa, &mut buffer)?;
        Ok(u64::from_le_bytes(buffer))
    }

    /// Reads an address-sized unsigned integer from guest physical memory.
    ///
    /// `address_width` must be 4 or 8.
    pub fn read_address(&self, pa: Pa, address_width: usize) -> Result<u64, VmiError> {
        match address_width {
            4 => Ok(self.read_u32(pa)? as u64),
            8 => self.read_u64(pa),
            _ => Err(VmiError::InvalidAddressWidth),
        }
    }

    /// Reads a struct from guest physical memory.
    pub fn read_struct<T>(&self, pa: Pa) -> Result<T, VmiError>
    where
        T: FromBytes + IntoBytes,
    {
        let mut result = T::new_zeroed();
        self.read(pa, result.as_mut_bytes())?;
        Ok(result)
    }

    /// Translates a virtual address to a physical address with a full page
    /// table walk from `root`.
    pub fn translate_address(
        &self,
        mode: <Driver::Architecture as Architecture>::PagingMode,
        va: Va,
        root: Pa,
    ) -> Result<Pa, TranslationError> {
        <Driver::Architecture as Architecture>::translate_address(self, mode, va, root)
    }

    /// Reads virtual memory, translating every page separately.
    ///
    /// Fails on the first page that cannot be translated; the buffer is
    /// then partially filled.
    pub fn read_va(
        &self,
        mode: <Driver::Architecture as Architecture>::PagingMode,
        root: Pa,
        va: Va,
        buffer: &mut [u8],
    ) -> Result<(), TranslationError> {
        let page_size = <Driver::Architecture as Architecture>::PAGE_SIZE;
        let mut position = 0usize;

        while position < buffer.len() {
            let address = va + position as u64;
            let pa = self.translate_address(mode, address, root)?;

            let offset = address.0 & (page_size - 1);
            let size = std::cmp::min(buffer.len() - position, (page_size - offset) as usize);

            self.read(pa, &mut buffer[position..position + size])?;
            position += size;
        }

        Ok(())
    }
}

/// A guard that pauses the virtual machine on creation and resumes it on drop.
pub struct VmiPauseGuard<'a, Driver>
where
    Driver: VmiDriver,
{
    driver: &'a Driver,
}

impl<'a, Driver> VmiPauseGuard<'a, Driver>
where
    Driver: VmiDriver,
{
    /// Pauses the virtual machine.
    pub fn new(driver: &'a Driver) -> Result<Self, VmiError> {
        driver.pause()?;
        Ok(Self { driver })
    }
}

impl<Driver> Drop for VmiPauseGuard<'_, Driver>
where
    Driver: VmiDriver,
{
    fn drop(&mut self) {
        if let Err(err) = self.driver.resume() {
            tracing::error!(?err, "Failed to resume the virtual machine");
        }
    }
}
