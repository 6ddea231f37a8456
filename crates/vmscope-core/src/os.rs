//! Operating system abstraction.
//!
//! The core never interprets guest kernel structures itself. An OS
//! component locates the kernel's translation root, and a symbol resolver
//! supplies kernel symbol addresses.

use crate::{Architecture, InitError, Pa, Va, VmiCore, VmiDriver};

/// Resolves kernel symbol names to virtual addresses.
pub trait SymbolResolver {
    /// Returns the virtual address of `name`, if known.
    fn resolve(&self, name: &str) -> Option<Va>;
}

impl<T> SymbolResolver for &T
where
    T: SymbolResolver + ?Sized,
{
    fn resolve(&self, name: &str) -> Option<Va> {
        (**self).resolve(name)
    }
}

/// Operating system trait.
pub trait VmiOs<Driver>
where
    Driver: VmiDriver,
{
    /// Establishes the kernel translation root and paging mode.
    ///
    /// Called with the virtual machine paused.
    fn locate_kernel(
        &self,
        vmi: &VmiCore<Driver>,
    ) -> Result<KernelState<Driver::Architecture>, InitError>;
}

/// The kernel translation state of a session.
///
/// Every translation performed by the session uses this root and paging
/// mode until the session is re-initialized.
pub struct KernelState<Arch>
where
    Arch: Architecture + ?Sized,
{
    root: Pa,
    paging_mode: Arch::PagingMode,
    entry_point: Option<Va>,
}

impl<Arch> KernelState<Arch>
where
    Arch: Architecture + ?Sized,
{
    /// Creates a new kernel state.
    pub fn new(root: Pa, paging_mode: Arch::PagingMode) -> Self {
        Self {
            root,
            paging_mode,
            entry_point: None,
        }
    }

    /// Sets the virtual address of the kernel's initial task.
    pub fn with_entry_point(self, entry_point: Option<Va>) -> Self {
        Self {
            entry_point,
            ..self
        }
    }

    /// Returns the physical address of the kernel page global directory.
    pub fn root(&self) -> Pa {
        self.root
    }

    /// Returns the paging mode.
    pub fn paging_mode(&self) -> Arch::PagingMode {
        self.paging_mode
    }

    /// Returns the virtual address of the kernel's initial task, if the
    /// symbol was resolved.
    pub fn entry_point(&self) -> Option<Va> {
        self.entry_point
    }
}

impl<Arch> Clone for KernelState<Arch>
where
    Arch: Architecture + ?Sized,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<Arch> Copy for KernelState<Arch> where Arch: Architecture + ?Sized {}

impl<Arch> PartialEq for KernelState<Arch>
where
    Arch: Architecture + ?Sized,
{
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
            && self.paging_mode == other.paging_mode
            && self.entry_point == other.entry_point
    }
}

impl<Arch> Eq for KernelState<Arch> where Arch: Architecture + ?Sized {}

impl<Arch> std::fmt::Debug for KernelState<Arch>
where
    Arch: Architecture + ?Sized,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelState")
            .field("root", &self.root)
            .field("paging_mode", &self.paging_mode)
            .field("entry_point", &self.entry_point)
            .finish()
    }
}
