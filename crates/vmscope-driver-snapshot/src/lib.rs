//! VMI driver for raw physical memory snapshots.
//!
//! A snapshot is frozen: reads are served from a memory-mapped image, and
//! everything that needs a live hypervisor (writes, monitors, the event
//! channel) fails with [`VmiError::NotSupported`].

mod driver;
mod error;


use std::{path::Path, time::Duration};

use vmscope_core::{Architecture, EventTrigger, Pa, VmiDriver, VmiError, VmiEvent, VmiInfo};

pub use self::error::Error;
use self::driver::SnapshotDriver;

/// VMI driver for raw physical memory snapshots.
pub struct VmiSnapshotDriver<Arch>
where
    Arch: Architecture,
{
    inner: SnapshotDriver<Arch>,
}

impl<Arch> VmiSnapshotDriver<Arch>
where
    Arch: Architecture,
{
    /// Creates a new VMI driver over the snapshot at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, VmiError> {
        Ok(Self {
            inner: SnapshotDriver::new(path)?,
        })
    }

    /// Sets the page table root register recorded with the snapshot.
    pub fn with_root_register(mut self, value: u64) -> Self {
        self.inner.root_register = Some(value);
        self
    }

    /// Sets whether the guest ran with Physical Address Extension enabled.
    pub fn with_physical_address_extension(mut self, physical_address_extension: bool) -> Self {
        self.inner.physical_address_extension = physical_address_extension;
        self
    }

    /// Returns the size of the image in bytes.
    pub fn size(&self) -> u64 {
        self.inner.size()
    }
}

impl<Arch> VmiDriver for VmiSnapshotDriver<Arch>
where
    Arch: Architecture,
{
    type Architecture = Arch;

    fn info(&self) -> Result<VmiInfo, VmiError> {
        Ok(self.inner.info()?)
    }

    fn pause(&self) -> Result<(), VmiError> {
        Ok(self.inner.pause()?)
    }

    fn resume(&self) -> Result<(), VmiError> {
        Ok(self.inner.resume()?)
    }

    fn read_physical(&self, pa: Pa, buffer: &mut [u8]) -> Result<(), VmiError> {
        Ok(self.inner.read_physical(pa, buffer)?)
    }

    fn write_physical(&self, pa: Pa, buffer: &[u8]) -> Result<(), VmiError> {
        Ok(self.inner.write_physical(pa, buffer)?)
    }

    fn current_root_register(&self) -> Option<u64> {
        self.inner.root_register
    }

    fn is_paravirtualized(&self) -> bool {
        false
    }

    fn monitor_enable(&self, trigger: EventTrigger<Arch>) -> Result<(), VmiError> {
        Ok(self.inner.monitor_enable(trigger)?)
    }

    fn monitor_disable(&self, trigger: EventTrigger<Arch>) -> Result<(), VmiError> {
        Ok(self.inner.monitor_disable(trigger)?)
    }

    fn wait_for_event(&self, timeout: Duration) -> Result<Option<VmiEvent<Arch>>, VmiError> {
        Ok(self.inner.wait_for_event(timeout)?)
    }

    fn set_interrupt_reinjection(
        &self,
        event: &VmiEvent<Arch>,
        reinject: bool,
    ) -> Result<(), VmiError> {
        Ok(self.inner.set_interrupt_reinjection(event, reinject)?)
    }
}
