use crate::{ControlRegister, Gfn, Interrupt};

/// Event generated when a control register is written to.
#[derive(Debug, Clone, Copy)]
pub struct EventWriteControlRegister {
    /// The control register that was written to (CR0, CR3, CR4 or XCR0).
    pub register: ControlRegister,

    /// New value of the control register.
    pub new_value: u64,

    /// Old value of the control register.
    pub old_value: u64,
}

/// Event generated when an interrupt or exception occurs.
#[derive(Debug, Clone, Copy)]
pub struct EventInterrupt {
    /// GFN of the instruction that caused the interrupt.
    pub gfn: Gfn,

    /// Information about the interrupt/exception.
    pub interrupt: Interrupt,
}

/// Event generated when a singlestep event occurs.
#[derive(Debug, Clone, Copy)]
pub struct EventSinglestep {
    /// GFN of the instruction that caused the singlestep.
    pub gfn: Gfn,
}

/// Reason for an event.
#[derive(Debug, Clone, Copy)]
pub enum EventReason {
    /// Control register write event.
    WriteControlRegister(EventWriteControlRegister),

    /// Interrupt or exception event.
    Interrupt(EventInterrupt),

    /// Singlestep event.
    ///
    /// Singlestep events cannot be registered and are always discarded by
    /// the dispatch loop.
    Singlestep(EventSinglestep),
}

impl EventReason {
    /// Returns the control register write event, if this is one.
    pub fn as_write_control_register(&self) -> Option<&EventWriteControlRegister> {
        match self {
            Self::WriteControlRegister(write_control_register) => Some(write_control_register),
            _ => None,
        }
    }

    /// Returns the interrupt or exception event, if this is one.
    pub fn as_interrupt(&self) -> Option<&EventInterrupt> {
        match self {
            Self::Interrupt(interrupt) => Some(interrupt),
            _ => None,
        }
    }

    /// Returns the singlestep event, if this is one.
    pub fn as_singlestep(&self) -> Option<&EventSinglestep> {
        match self {
            Self::Singlestep(singlestep) => Some(singlestep),
            _ => None,
        }
    }
}
