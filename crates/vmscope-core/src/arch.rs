//! Architecture abstraction.
//!
//! An [`Architecture`] describes how physical memory is paged, how a virtual
//! address is walked through the paging structures, and which hardware
//! events the guest can raise.

use std::{fmt::Debug, hash::Hash};

use crate::{Gfn, Pa, TranslationError, Va, VmiCore, VmiDriver};

/// Defines an interface for CPU architecture-specific operations and constants.
pub trait Architecture {
    /// The size of a memory page in bytes for the given architecture.
    ///
    /// # Architecture-specific
    ///
    /// - **AMD64**: `0x1000` (4096 bytes)
    const PAGE_SIZE: u64;

    /// The number of bits to shift when converting between page numbers and
    /// physical addresses.
    ///
    /// # Architecture-specific
    ///
    /// - **AMD64**: `12` (2^12 = 4096)
    const PAGE_SHIFT: u64;

    /// A bitmask used to isolate the page number from a full address.
    ///
    /// # Architecture-specific
    ///
    /// - **AMD64**: `0xFFFFFFFFFFFFF000`
    const PAGE_MASK: u64;

    /// The page table geometries supported by the architecture.
    ///
    /// # Architecture-specific
    ///
    /// - **AMD64**: Legacy 32-bit, PAE, 4-level long mode
    type PagingMode: Debug + Clone + Copy + PartialEq + Eq;

    /// An enumeration representing the levels of page tables in the
    /// architecture's paging structure.
    type PageTableLevel: Debug + Clone + Copy;

    /// Registers whose accesses can be monitored.
    ///
    /// # Architecture-specific
    ///
    /// - **AMD64**: `CR0`, `CR3`, `CR4`, `XCR0`
    type SpecialRegister: Debug + Clone + Copy + PartialEq + Eq + Hash;

    /// Interrupt vectors that can be monitored.
    type InterruptVector: Debug + Clone + Copy + PartialEq + Eq + Hash;

    /// Architecture-specific event details.
    type EventReason: EventReason<Architecture = Self>;

    /// Converts a guest physical address (GPA) to a guest frame number (GFN).
    fn gfn_from_pa(pa: Pa) -> Gfn;

    /// Converts a guest frame number (GFN) to a guest physical address (GPA).
    fn pa_from_gfn(gfn: Gfn) -> Pa;

    /// Extracts the offset within a page from a physical address.
    fn pa_offset(pa: Pa) -> u64;

    /// Returns the pointer size, in bytes, of the given paging mode.
    fn address_width(mode: Self::PagingMode) -> usize;

    /// Performs a full page table walk to translate a virtual address to a
    /// physical address.
    ///
    /// Every call is a fresh walk; intermediate tables are never cached.
    fn translate_address<Driver>(
        vmi: &VmiCore<Driver>,
        mode: Self::PagingMode,
        va: Va,
        root: Pa,
    ) -> Result<Pa, TranslationError>
    where
        Driver: VmiDriver<Architecture = Self>;
}

/// The trigger class and identifying field of an event.
///
/// At most one event descriptor can be registered per trigger.
pub enum EventTrigger<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// A write to the given register.
    Register(Arch::SpecialRegister),

    /// An interrupt with the given vector.
    Interrupt(Arch::InterruptVector),
}

impl<Arch> Clone for EventTrigger<Arch>
where
    Arch: Architecture + ?Sized,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<Arch> Copy for EventTrigger<Arch> where Arch: Architecture + ?Sized {}

impl<Arch> PartialEq for EventTrigger<Arch>
where
    Arch: Architecture + ?Sized,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Register(a), Self::Register(b)) => a == b,
            (Self::Interrupt(a), Self::Interrupt(b)) => a == b,
            _ => false,
        }
    }
}

impl<Arch> Eq for EventTrigger<Arch> where Arch: Architecture + ?Sized {}

impl<Arch> Hash for EventTrigger<Arch>
where
    Arch: Architecture + ?Sized,
{
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Register(register) => register.hash(state),
            Self::Interrupt(vector) => vector.hash(state),
        }
    }
}

impl<Arch> Debug for EventTrigger<Arch>
where
    Arch: Architecture + ?Sized,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register(register) => f.debug_tuple("Register").field(register).finish(),
            Self::Interrupt(vector) => f.debug_tuple("Interrupt").field(vector).finish(),
        }
    }
}

/// The reason for a VM exit or similar event.
pub trait EventReason
where
    Self: Debug + Clone + Copy,
{
    /// The specific CPU architecture implementation.
    type Architecture: Architecture + ?Sized;

    /// Returns the trigger this event satisfies, if it belongs to a class
    /// that can be registered.
    ///
    /// Events of other classes (e.g. single-step) return `None` and are
    /// discarded by the dispatch loop.
    fn trigger(&self) -> Option<EventTrigger<Self::Architecture>>;

    /// Returns `true` if the event was caused by an interrupt, and the
    /// driver should be told whether to re-deliver it.
    fn is_interrupt(&self) -> bool {
        matches!(self.trigger(), Some(EventTrigger::Interrupt(_)))
    }
}
