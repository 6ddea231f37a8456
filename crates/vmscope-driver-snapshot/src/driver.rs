use std::{fs::File, path::Path, time::Duration};

use memmap2::Mmap;
use vmscope_core::{Architecture, EventTrigger, Gfn, Pa, VmiEvent, VmiInfo};

use crate::Error;

/// Raw physical memory image.
///
/// The image is a flat copy of guest physical memory: byte `n` of the file
/// is guest physical address `n`.
pub struct SnapshotDriver<Arch>
where
    Arch: Architecture,
{
    mmap: Mmap,
    pub(crate) root_register: Option<u64>,
    pub(crate) physical_address_extension: bool,
    _marker: std::marker::PhantomData<Arch>,
}

impl<Arch> SnapshotDriver<Arch>
where
    Arch: Architecture,
{
    pub fn new(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        tracing::debug!(path = %path.display(), size = mmap.len(), "snapshot mapped");

        Ok(Self {
            mmap,
            root_register: None,
            physical_address_extension: false,
            _marker: std::marker::PhantomData,
        })
    }

    pub fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    pub fn info(&self) -> Result<VmiInfo, Error> {
        let max_gfn = match self.size() {
            0 => Gfn(0),
            size => Arch::gfn_from_pa(Pa(size - 1)),
        };

        Ok(VmiInfo {
            page_size: Arch::PAGE_SIZE,
            page_shift: Arch::PAGE_SHIFT,
            max_gfn,
            vcpus: 0,
            physical_address_extension: self.physical_address_extension,
        })
    }

    pub fn pause(&self) -> Result<(), Error> {
        Ok(())
    }

    pub fn resume(&self) -> Result<(), Error> {
        Ok(())
    }

    pub fn read_physical(&self, pa: Pa, buffer: &mut [u8]) -> Result<(), Error> {
        let start = usize::try_from(pa.0).map_err(|_| Error::OutOfBounds)?;
        let end = start
            .checked_add(buffer.len())
            .ok_or(Error::OutOfBounds)?;

        let content = self.mmap.get(start..end).ok_or(Error::OutOfBounds)?;
        buffer.copy_from_slice(content);
        Ok(())
    }

    pub fn write_physical(&self, _pa: Pa, _buffer: &[u8]) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    pub fn monitor_enable(&self, _trigger: EventTrigger<Arch>) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    pub fn monitor_disable(&self, _trigger: EventTrigger<Arch>) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    pub fn wait_for_event(&self, _timeout: Duration) -> Result<Option<VmiEvent<Arch>>, Error> {
        Err(Error::NotSupported)
    }

    pub fn set_interrupt_reinjection(
        &self,
        _event: &VmiEvent<Arch>,
        _reinject: bool,
    ) -> Result<(), Error> {
        Err(Error::NotSupported)
    }
}
