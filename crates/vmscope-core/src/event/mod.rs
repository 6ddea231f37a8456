//! Event descriptors, the event registry and the dispatch loop.

mod listen;
mod registry;

#[cfg(test)]
mod listen_tests;

use crate::{
    Architecture, EventReason as _, EventTrigger, KernelState, Pa, TranslationError, Va, VcpuId,
    VmiCore, VmiDriver,
};

pub(crate) use self::listen::listen;
pub use self::registry::EventRegistry;

/// A notification delivered by the driver's event channel.
pub struct VmiEvent<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// The ID of the virtual CPU where the event occurred.
    vcpu_id: VcpuId,

    /// The reason for the event.
    reason: Arch::EventReason,
}

impl<Arch> VmiEvent<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// Creates a new VMI event.
    pub fn new(vcpu_id: VcpuId, reason: Arch::EventReason) -> Self {
        Self { vcpu_id, reason }
    }

    /// Returns the ID of the virtual CPU where the event occurred.
    pub fn vcpu_id(&self) -> VcpuId {
        self.vcpu_id
    }

    /// Returns a reference to the reason for the event.
    pub fn reason(&self) -> &Arch::EventReason {
        &self.reason
    }

    /// Returns the trigger this event satisfies, if any.
    pub fn trigger(&self) -> Option<EventTrigger<Arch>> {
        self.reason.trigger()
    }
}

impl<Arch> Clone for VmiEvent<Arch>
where
    Arch: Architecture + ?Sized,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<Arch> Copy for VmiEvent<Arch> where Arch: Architecture + ?Sized {}

impl<Arch> std::fmt::Debug for VmiEvent<Arch>
where
    Arch: Architecture + ?Sized,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VmiEvent")
            .field("vcpu_id", &self.vcpu_id)
            .field("reason", &self.reason)
            .finish()
    }
}

bitflags::bitflags! {
    /// Access directions of a register watch.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct RegisterAccess: u8 {
        /// The register is read.
        const READ = 1 << 0;

        /// The register is written.
        const WRITE = 1 << 1;
    }
}

/// Watches accesses to a special register (e.g. `CR3`).
///
/// Only write-direction monitoring is supported; registering any other
/// direction fails with [`RegistrationError::UnsupportedAccessDirection`].
///
/// [`RegistrationError::UnsupportedAccessDirection`]: crate::RegistrationError::UnsupportedAccessDirection
pub struct RegisterWatch<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// The watched register.
    pub register: Arch::SpecialRegister,

    /// The access direction filter.
    pub access: RegisterAccess,
}

impl<Arch> RegisterWatch<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// Watches writes to `register`.
    pub fn write(register: Arch::SpecialRegister) -> Self {
        Self {
            register,
            access: RegisterAccess::WRITE,
        }
    }
}

/// Watches an interrupt vector (e.g. the `INT3` breakpoint).
pub struct InterruptWatch<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// The watched interrupt vector.
    pub vector: Arch::InterruptVector,

    /// Whether the watch is armed.
    ///
    /// A disabled watch keeps its registry slot, but the driver monitor is
    /// not armed and matching notifications are discarded.
    pub enabled: bool,

    /// Whether the interrupt is delivered to the guest after the callback
    /// returns, so that the guest's own handler still runs.
    pub reinject: bool,
}

impl<Arch> InterruptWatch<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// Creates an enabled watch for `vector`.
    pub fn new(vector: Arch::InterruptVector) -> Self {
        Self {
            vector,
            enabled: true,
            reinject: false,
        }
    }

    /// Sets the re-injection policy.
    pub fn with_reinject(self, reinject: bool) -> Self {
        Self { reinject, ..self }
    }

    /// Sets the enabled flag.
    pub fn with_enabled(self, enabled: bool) -> Self {
        Self { enabled, ..self }
    }
}

/// What an event descriptor watches.
pub enum EventWatch<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// A register access watch.
    Register(RegisterWatch<Arch>),

    /// An interrupt watch.
    Interrupt(InterruptWatch<Arch>),
}

impl<Arch> EventWatch<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// Returns the trigger class and identifying field of the watch.
    pub fn trigger(&self) -> EventTrigger<Arch> {
        match self {
            Self::Register(watch) => EventTrigger::Register(watch.register),
            Self::Interrupt(watch) => EventTrigger::Interrupt(watch.vector),
        }
    }

    /// Returns `true` if the driver monitor should be armed for this watch.
    pub fn enabled(&self) -> bool {
        match self {
            Self::Register(_) => true,
            Self::Interrupt(watch) => watch.enabled,
        }
    }

    /// Returns the re-injection policy, or `None` for non-interrupt
    /// watches.
    pub fn reinject(&self) -> Option<bool> {
        match self {
            Self::Register(_) => None,
            Self::Interrupt(watch) => Some(watch.reinject),
        }
    }
}

impl<Arch> From<RegisterWatch<Arch>> for EventWatch<Arch>
where
    Arch: Architecture + ?Sized,
{
    fn from(value: RegisterWatch<Arch>) -> Self {
        Self::Register(value)
    }
}

impl<Arch> From<InterruptWatch<Arch>> for EventWatch<Arch>
where
    Arch: Architecture + ?Sized,
{
    fn from(value: InterruptWatch<Arch>) -> Self {
        Self::Interrupt(value)
    }
}

/// The state handed to an event callback.
///
/// Callbacks may translate and read kernel memory through the context; the
/// session's translation root and paging mode are already applied.
pub struct VmiEventContext<'a, Driver>
where
    Driver: VmiDriver,
{
    core: &'a VmiCore<Driver>,
    kernel: &'a KernelState<Driver::Architecture>,
    event: &'a VmiEvent<Driver::Architecture>,
}

impl<Driver> std::ops::Deref for VmiEventContext<'_, Driver>
where
    Driver: VmiDriver,
{
    type Target = VmiCore<Driver>;

    fn deref(&self) -> &Self::Target {
        self.core
    }
}

impl<'a, Driver> VmiEventContext<'a, Driver>
where
    Driver: VmiDriver,
{
    pub(crate) fn new(
        core: &'a VmiCore<Driver>,
        kernel: &'a KernelState<Driver::Architecture>,
        event: &'a VmiEvent<Driver::Architecture>,
    ) -> Self {
        Self {
            core,
            kernel,
            event,
        }
    }

    /// Returns the VMI core.
    pub fn core(&self) -> &'a VmiCore<Driver> {
        self.core
    }

    /// Returns the kernel translation state of the session.
    pub fn kernel(&self) -> &'a KernelState<Driver::Architecture> {
        self.kernel
    }

    /// Returns the event being dispatched.
    pub fn event(&self) -> &'a VmiEvent<Driver::Architecture> {
        self.event
    }

    /// Translates a kernel virtual address using the session's root.
    pub fn translate(&self, va: Va) -> Result<Pa, TranslationError> {
        self.core
            .translate_address(self.kernel.paging_mode(), va, self.kernel.root())
    }

    /// Reads kernel virtual memory using the session's root.
    pub fn read_va(&self, va: Va, buffer: &mut [u8]) -> Result<(), TranslationError> {
        self.core
            .read_va(self.kernel.paging_mode(), self.kernel.root(), va, buffer)
    }
}

/// The callback capability stored in an event descriptor.
///
/// Implemented for every `FnMut(&VmiEventContext<Driver>)` closure.
pub trait VmiEventCallback<Driver>
where
    Driver: VmiDriver,
{
    /// Called once per notification matching the descriptor.
    fn on_event(&mut self, ctx: &VmiEventContext<'_, Driver>);
}

impl<Driver, F> VmiEventCallback<Driver> for F
where
    Driver: VmiDriver,
    F: FnMut(&VmiEventContext<'_, Driver>),
{
    fn on_event(&mut self, ctx: &VmiEventContext<'_, Driver>) {
        self(ctx)
    }
}

/// An event descriptor: what to watch, and what to call when it fires.
pub struct EventDescriptor<Driver>
where
    Driver: VmiDriver,
{
    watch: EventWatch<Driver::Architecture>,
    callback: Box<dyn VmiEventCallback<Driver>>,
}

impl<Driver> EventDescriptor<Driver>
where
    Driver: VmiDriver,
{
    /// Creates a descriptor invoking `callback` for each matching event.
    pub fn new(
        watch: impl Into<EventWatch<Driver::Architecture>>,
        callback: impl FnMut(&VmiEventContext<'_, Driver>) + 'static,
    ) -> Self {
        Self::with_callback(watch, callback)
    }

    /// Creates a descriptor from a callback object.
    pub fn with_callback(
        watch: impl Into<EventWatch<Driver::Architecture>>,
        callback: impl VmiEventCallback<Driver> + 'static,
    ) -> Self {
        Self {
            watch: watch.into(),
            callback: Box::new(callback),
        }
    }

    /// Returns what the descriptor watches.
    pub fn watch(&self) -> &EventWatch<Driver::Architecture> {
        &self.watch
    }

    /// Returns the trigger class and identifying field of the descriptor.
    pub fn trigger(&self) -> EventTrigger<Driver::Architecture> {
        self.watch.trigger()
    }

    pub(crate) fn invoke(&mut self, ctx: &VmiEventContext<'_, Driver>) {
        self.callback.on_event(ctx);
    }
}

/// Identifies a registered event descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventHandle(pub(crate) u64);

/// The outcome of a single [`VmiSession::listen`] call.
///
/// [`VmiSession::listen`]: crate::VmiSession::listen
#[must_use]
#[derive(Debug)]
pub enum ListenOutcome {
    /// No registered descriptor was triggered before the timeout.
    Timeout,

    /// The given number of callbacks were invoked.
    Dispatched(usize),

    /// The event channel failed. The registry is left intact.
    Error(crate::VmiError),
}

impl ListenOutcome {
    /// Returns the number of invoked callbacks.
    pub fn dispatched(&self) -> usize {
        match self {
            Self::Dispatched(count) => *count,
            _ => 0,
        }
    }

    /// Returns `true` if the event channel failed.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}
