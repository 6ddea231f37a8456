use std::time::Duration;

use crate::{Architecture, EventTrigger, Pa, VmiError, VmiEvent, VmiInfo};

/// A trait for implementing a VMI driver.
///
/// The driver is the only component that talks to the hypervisor (or to a
/// memory snapshot). Everything above it works in terms of guest physical
/// memory and event notifications.
pub trait VmiDriver {
    /// The architecture supported by the driver.
    type Architecture: Architecture + ?Sized;

    /// Retrieves information about the virtual machine.
    fn info(&self) -> Result<VmiInfo, VmiError>;

    /// Pauses the virtual machine.
    fn pause(&self) -> Result<(), VmiError>;

    /// Resumes the virtual machine.
    fn resume(&self) -> Result<(), VmiError>;

    /// Reads `buffer.len()` bytes of guest physical memory at `pa`.
    fn read_physical(&self, pa: Pa, buffer: &mut [u8]) -> Result<(), VmiError>;

    /// Writes `buffer` to guest physical memory at `pa`.
    fn write_physical(&self, pa: Pa, buffer: &[u8]) -> Result<(), VmiError>;

    /// Returns the raw value of the register holding the page table root,
    /// if the driver captured one.
    fn current_root_register(&self) -> Option<u64>;

    /// Returns `true` if the guest is paravirtualized.
    ///
    /// For paravirtualized guests, [`current_root_register`] holds a
    /// virtual address.
    ///
    /// [`current_root_register`]: Self::current_root_register
    fn is_paravirtualized(&self) -> bool;

    /// Arms the hypervisor monitor for the given trigger.
    fn monitor_enable(&self, trigger: EventTrigger<Self::Architecture>) -> Result<(), VmiError>;

    /// Disarms the hypervisor monitor for the given trigger.
    fn monitor_disable(&self, trigger: EventTrigger<Self::Architecture>) -> Result<(), VmiError>;

    /// Waits at most `timeout` for the next notification.
    ///
    /// Returns `Ok(None)` if no notification became available in time.
    /// A zero timeout polls without blocking.
    fn wait_for_event(
        &self,
        timeout: Duration,
    ) -> Result<Option<VmiEvent<Self::Architecture>>, VmiError>;

    /// Tells the hypervisor whether the interrupt that caused `event` should
    /// be delivered to the guest once the event is released.
    fn set_interrupt_reinjection(
        &self,
        event: &VmiEvent<Self::Architecture>,
        reinject: bool,
    ) -> Result<(), VmiError>;
}
