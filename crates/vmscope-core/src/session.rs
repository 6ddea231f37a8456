use std::{
    cell::Cell,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use crate::{
    EventDescriptor, EventHandle, EventRegistry, InitError, KernelState, ListenOutcome, Pa,
    RegistrationError, TranslationError, Va, VmiCore, VmiDriver, VmiError, event, os::VmiOs,
};

/// A VMI session.
///
/// The session combines a [`VmiCore`] with an OS-specific [`VmiOs`]
/// implementation. It owns the kernel translation state and the event
/// registry; nothing is shared between sessions.
pub struct VmiSession<Driver, Os>
where
    Driver: VmiDriver,
    Os: VmiOs<Driver>,
{
    core: VmiCore<Driver>,
    os: Os,
    kernel: KernelState<Driver::Architecture>,
    registry: EventRegistry<Driver>,
    event_processing_overhead: Cell<Duration>,
}

impl<Driver, Os> std::ops::Deref for VmiSession<Driver, Os>
where
    Driver: VmiDriver,
    Os: VmiOs<Driver>,
{
    type Target = VmiCore<Driver>;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

impl<Driver, Os> VmiSession<Driver, Os>
where
    Driver: VmiDriver,
    Os: VmiOs<Driver>,
{
    /// Initializes a session.
    ///
    /// The virtual machine is paused while the kernel translation root is
    /// being located, and resumed afterwards.
    pub fn init(driver: Driver, os: Os) -> Result<Self, InitError> {
        let core = VmiCore::new(driver);

        let kernel = {
            let _pause_guard = core.pause_guard()?;
            os.locate_kernel(&core)?
        };

        tracing::debug!(
            root = %kernel.root(),
            paging_mode = ?kernel.paging_mode(),
            "session initialized"
        );

        Ok(Self {
            core,
            os,
            kernel,
            registry: EventRegistry::new(),
            event_processing_overhead: Cell::new(Duration::ZERO),
        })
    }

    /// Returns the VMI core.
    pub fn core(&self) -> &VmiCore<Driver> {
        &self.core
    }

    /// Returns the underlying OS-specific implementation.
    pub fn underlying_os(&self) -> &Os {
        &self.os
    }

    /// Returns the kernel translation state.
    pub fn kernel(&self) -> &KernelState<Driver::Architecture> {
        &self.kernel
    }

    /// Returns the event registry.
    pub fn registry(&self) -> &EventRegistry<Driver> {
        &self.registry
    }

    /// Locates the kernel translation root again.
    ///
    /// Use after the guest has changed its paging setup (e.g. after a
    /// reboot). On failure the previous state is kept.
    pub fn resynchronize(&mut self) -> Result<(), InitError> {
        let kernel = {
            let _pause_guard = self.core.pause_guard()?;
            self.os.locate_kernel(&self.core)?
        };

        if kernel != self.kernel {
            tracing::debug!(
                old = ?self.kernel,
                new = ?kernel,
                "kernel state changed"
            );
        }

        self.kernel = kernel;
        Ok(())
    }

    /// Translates a kernel virtual address to a physical address.
    pub fn translate(&self, va: Va) -> Result<Pa, TranslationError> {
        self.core
            .translate_address(self.kernel.paging_mode(), va, self.kernel.root())
    }

    /// Reads kernel virtual memory.
    pub fn read_va(&self, va: Va, buffer: &mut [u8]) -> Result<(), TranslationError> {
        self.core
            .read_va(self.kernel.paging_mode(), self.kernel.root(), va, buffer)
    }

    /// Reads a 32-bit unsigned integer from kernel virtual memory.
    pub fn read_u32_va(&self, va: Va) -> Result<u32, TranslationError> {
        let mut buffer = [0u8; 4];
        self.read_va(va, &mut buffer)?;
        Ok(u32::from_le_bytes(buffer))
    }

    /// Reads a 64-bit unsigned integer from kernel virtual memory.
    pub fn read_u64_va(&self, va: Va) -> Result<u64, TranslationError> {
        let mut buffer = [0u8; 8];
        self.read_va(va, &mut buffer)?;
        Ok(u64::from_le_bytes(buffer))
    }

    /// Reads a pointer-sized value from kernel virtual memory.
    ///
    /// The width follows the session's paging mode.
    pub fn read_address_va(&self, va: Va) -> Result<Va, TranslationError> {
        use crate::Architecture as _;

        match Driver::Architecture::address_width(self.kernel.paging_mode()) {
            4 => Ok(Va(self.read_u32_va(va)? as u64)),
            8 => Ok(Va(self.read_u64_va(va)?)),
            _ => Err(TranslationError::Read(VmiError::InvalidAddressWidth)),
        }
    }

    /// Registers an event descriptor and arms the driver monitor.
    ///
    /// Disabled interrupt watches are registered without arming the
    /// monitor. If arming fails, the registration is rolled back.
    pub fn register_event(
        &mut self,
        descriptor: EventDescriptor<Driver>,
    ) -> Result<EventHandle, RegistrationError> {
        let trigger = descriptor.trigger();
        let enabled = descriptor.watch().enabled();
        let handle = self.registry.register(descriptor)?;

        if enabled && let Err(err) = self.core.driver().monitor_enable(trigger) {
            tracing::debug!(?trigger, %err, "failed to arm monitor");
            if let Err(err) = self.registry.deregister(handle) {
                tracing::warn!(?handle, %err, "failed to roll back registration");
            }
            return Err(RegistrationError::Driver(err));
        }

        Ok(handle)
    }

    /// Disarms the driver monitor and deregisters an event descriptor.
    ///
    /// If the monitor cannot be disarmed, the descriptor stays registered
    /// so that a later call can retry.
    pub fn deregister_event(
        &mut self,
        handle: EventHandle,
    ) -> Result<EventDescriptor<Driver>, RegistrationError> {
        let descriptor = self
            .registry
            .get(handle)
            .ok_or(RegistrationError::NotRegistered)?;

        if descriptor.watch().enabled() {
            self.core.driver().monitor_disable(descriptor.trigger())?;
        }

        self.registry.deregister(handle)
    }

    /// Runs one pass over the event channel, blocking for at most `timeout`.
    ///
    /// Each pending notification that matches a registered descriptor
    /// invokes its callback exactly once. Notifications without a matching
    /// descriptor are discarded.
    ///
    /// If re-injecting an interrupt fails, the pass stops with
    /// [`ListenOutcome::Error`] and the callbacks already invoked in this
    /// pass are not counted.
    pub fn listen(&mut self, timeout: Duration) -> ListenOutcome {
        event::listen(
            &self.core,
            &self.kernel,
            &mut self.registry,
            timeout,
            &self.event_processing_overhead,
        )
    }

    /// Calls [`listen`] repeatedly until `cancel` is set.
    ///
    /// The flag is checked between calls, so the loop stops within one
    /// `timeout` interval. Returns the total number of invoked callbacks.
    ///
    /// [`listen`]: Self::listen
    pub fn listen_until(
        &mut self,
        timeout: Duration,
        cancel: &AtomicBool,
    ) -> Result<usize, VmiError> {
        let mut total = 0;

        while !cancel.load(Ordering::Relaxed) {
            match self.listen(timeout) {
                ListenOutcome::Timeout => {}
                ListenOutcome::Dispatched(count) => total += count,
                ListenOutcome::Error(err) => return Err(err),
            }
        }

        Ok(total)
    }

    /// Returns the total time spent dispatching events.
    pub fn event_processing_overhead(&self) -> Duration {
        self.event_processing_overhead.get()
    }

    /// Disarms every registered monitor and returns the driver.
    ///
    /// Failures to disarm are logged; the registry is cleared regardless.
    pub fn teardown(mut self) -> Driver {
        for (handle, descriptor) in self.registry.drain() {
            if !descriptor.watch().enabled() {
                continue;
            }

            if let Err(err) = self.core.driver().monitor_disable(descriptor.trigger()) {
                tracing::warn!(?handle, %err, "failed to disarm monitor");
            }
        }

        let Self { core, .. } = self;
        core.into_driver()
    }
}
