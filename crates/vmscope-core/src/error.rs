use crate::{Pa, Va};

/// An error raised by the driver or the hypervisor transport.
///
/// This is also the error surfaced by the event channel from
/// [`VmiSession::listen`].
///
/// [`VmiSession::listen`]: crate::VmiSession::listen
#[derive(thiserror::Error, Debug)]
pub enum VmiError {
    /// An error occurred in the VMI driver.
    #[error(transparent)]
    Driver(Box<dyn std::error::Error>),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The given address has invalid width.
    #[error("Invalid address width")]
    InvalidAddressWidth,

    /// The given timeout is invalid.
    #[error("The given timeout is invalid.")]
    InvalidTimeout,

    /// Operation not supported.
    #[error("Operation not supported.")]
    NotSupported,

    /// Out of bounds.
    #[error("Out of bounds")]
    OutOfBounds,

    /// Other error.
    #[error("{0}")]
    Other(&'static str),
}

/// An error that occurred while walking the page tables.
///
/// Translation errors are always recoverable by the caller. A missing page
/// is frequently meaningful (the guest paged it out, or the address is
/// simply unmapped), so it is never retried internally.
#[derive(thiserror::Error, Debug)]
pub enum TranslationError {
    /// A paging structure entry on the walk had its present bit clear.
    #[error("Page not present (va: {va}, root: {root}, level: {level})")]
    PageNotPresent {
        /// The virtual address being translated.
        va: Va,

        /// The root of the page table hierarchy.
        root: Pa,

        /// The name of the level at which the walk stopped.
        level: &'static str,
    },

    /// A paging structure entry has bits set that are reserved at its level.
    #[error("Invalid table entry 0x{entry:016x} at {entry_address} (level: {level})")]
    InvalidTableEntry {
        /// The raw value of the entry.
        entry: u64,

        /// The physical address of the entry.
        entry_address: Pa,

        /// The name of the level holding the entry.
        level: &'static str,
    },

    /// Reading a paging structure from physical memory failed.
    #[error(transparent)]
    Read(#[from] VmiError),
}

impl TranslationError {
    /// Returns `true` if the walk stopped at a non-present entry.
    pub fn is_page_not_present(&self) -> bool {
        matches!(self, Self::PageNotPresent { .. })
    }
}

/// An error that prevented a session from being initialized.
///
/// Initialization errors are unrecoverable for the session; the caller has
/// to initialize a new one.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    /// Neither a root register nor the root memory descriptor symbol
    /// was available.
    #[error("Kernel page table root not found")]
    RootNotFound,

    /// A required kernel symbol could not be resolved.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// The paging mode could not be determined.
    #[error("Paging mode could not be determined")]
    PagingModeUnknown,

    /// An address expected to lie in the statically mapped kernel region
    /// does not.
    #[error("Address {0} is not in the static kernel mapping")]
    NotKernelMapped(Va),

    /// Translating a bootstrap address failed.
    #[error(transparent)]
    Translation(#[from] TranslationError),

    /// The driver failed during initialization.
    #[error(transparent)]
    Driver(#[from] VmiError),
}

/// An error returned when registering or deregistering an event.
///
/// Registration errors leave the registry unchanged.
#[derive(thiserror::Error, Debug)]
pub enum RegistrationError {
    /// Only write-direction monitoring of registers is supported.
    #[error("Unsupported register access direction")]
    UnsupportedAccessDirection,

    /// A descriptor with the same trigger is already registered.
    #[error("An event with the same trigger is already registered")]
    AlreadyRegistered,

    /// The handle does not refer to a registered event.
    #[error("Event is not registered")]
    NotRegistered,

    /// The driver failed to arm or disarm the monitor.
    #[error(transparent)]
    Driver(#[from] VmiError),
}
