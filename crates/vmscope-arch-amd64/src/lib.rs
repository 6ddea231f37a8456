//! x86 architecture definitions.
//!
//! Covers the three x86 paging geometries: legacy 32-bit paging, PAE and
//! 4-level IA-32e paging.

mod cr;
mod event;
mod interrupt;
mod paging;
mod translation;


use vmscope_core::{
    Architecture, EventTrigger, Gfn, Pa, TranslationError, Va, VmiCore, VmiDriver,
};

pub use self::{
    cr::{ControlRegister, Cr3},
    event::{EventInterrupt, EventReason, EventSinglestep, EventWriteControlRegister},
    interrupt::{ExceptionVector, Interrupt},
    paging::{PageTableEntry, PageTableLevel, PagingMode},
    translation::{TranslationEntries, TranslationEntry, VaTranslation},
};

/// AMD64 architecture.
#[derive(Debug)]
pub struct Amd64;

impl Architecture for Amd64 {
    const PAGE_SIZE: u64 = 0x1000;
    const PAGE_SHIFT: u64 = 12;
    const PAGE_MASK: u64 = 0xFFFFFFFFFFFFF000;

    type PagingMode = PagingMode;
    type PageTableLevel = PageTableLevel;
    type SpecialRegister = ControlRegister;
    type InterruptVector = ExceptionVector;
    type EventReason = EventReason;

    fn gfn_from_pa(pa: Pa) -> Gfn {
        Gfn(pa.0 >> Self::PAGE_SHIFT)
    }

    fn pa_from_gfn(gfn: Gfn) -> Pa {
        Pa(gfn.0 << Self::PAGE_SHIFT)
    }

    fn pa_offset(pa: Pa) -> u64 {
        pa.0 & !Self::PAGE_MASK
    }

    fn address_width(mode: PagingMode) -> usize {
        mode.address_width()
    }

    fn translate_address<Driver>(
        vmi: &VmiCore<Driver>,
        mode: PagingMode,
        va: Va,
        root: Pa,
    ) -> Result<Pa, TranslationError>
    where
        Driver: VmiDriver<Architecture = Self>,
    {
        Self::walk(vmi, mode, va, root, &mut TranslationEntries::new())
    }
}

impl Amd64 {
    /// Determines the paging mode from the virtual address of a kernel
    /// bootstrap symbol.
    ///
    /// 64-bit kernels live in the top of the canonical address space, so
    /// the top nibble of their addresses is all ones. Other kernels are
    /// 32-bit, and whether they use PAE is reported by the driver.
    pub fn classify(bootstrap_va: Va, physical_address_extension: bool) -> PagingMode {
        if bootstrap_va.0 >> 60 == 0xf {
            PagingMode::Ia32e
        }
        else if physical_address_extension {
            PagingMode::Pae
        }
        else {
            PagingMode::Legacy
        }
    }

    /// Returns the translation root held in a raw `CR3` value.
    pub fn root_from_register(value: u64, mode: PagingMode) -> Pa {
        Cr3(value).root(mode)
    }

    /// Performs a page table walk and records every visited entry.
    ///
    /// If the walk fails, the returned [`VaTranslation`] holds the entries
    /// read so far (including the one that stopped the walk) and no
    /// physical address.
    pub fn translation<Driver>(
        vmi: &VmiCore<Driver>,
        mode: PagingMode,
        va: Va,
        root: Pa,
    ) -> VaTranslation
    where
        Driver: VmiDriver<Architecture = Self>,
    {
        let mut entries = TranslationEntries::new();
        let pa = Self::walk(vmi, mode, va, root, &mut entries).ok();
        VaTranslation { entries, pa }
    }

    fn walk<Driver>(
        vmi: &VmiCore<Driver>,
        mode: PagingMode,
        va: Va,
        root: Pa,
        entries: &mut TranslationEntries,
    ) -> Result<Pa, TranslationError>
    where
        Driver: VmiDriver<Architecture = Self>,
    {
        let linear = mode.linear_address(va);
        let mut table = Cr3(root.0).root(mode);
        let mut level = mode.top_level();

        loop {
            let entry_address = table + mode.index(linear, level) * mode.entry_size();
            let entry = match mode.entry_size() {
                4 => PageTableEntry(vmi.read_u32(entry_address)? as u64),
                _ => vmi.read_struct::<PageTableEntry>(entry_address)?,
            };

            entries.push(TranslationEntry {
                level,
                entry,
                entry_address,
            });

            if !entry.present() {
                return Err(TranslationError::PageNotPresent {
                    va,
                    root,
                    level: level.name(),
                });
            }

            let leaf = level == PageTableLevel::Pt || entry.large();
            if leaf {
                let offset_mask = match mode.page_offset_mask(level) {
                    Some(offset_mask) => offset_mask,
                    None => {
                        return Err(TranslationError::InvalidTableEntry {
                            entry: entry.0,
                            entry_address,
                            level: level.name(),
                        });
                    }
                };

                return Ok(entry.address(mode, level) + (linear.0 & offset_mask));
            }

            table = entry.address(mode, level);
            level = match level.next() {
                Some(next) => next,
                None => {
                    return Err(TranslationError::InvalidTableEntry {
                        entry: entry.0,
                        entry_address,
                        level: level.name(),
                    });
                }
            };
        }
    }
}

impl vmscope_core::EventReason for EventReason {
    type Architecture = Amd64;

    fn trigger(&self) -> Option<EventTrigger<Amd64>> {
        match self {
            Self::WriteControlRegister(event) => Some(EventTrigger::Register(event.register)),
            Self::Interrupt(event) => Some(EventTrigger::Interrupt(event.interrupt.vector)),
            Self::Singlestep(_) => None,
        }
    }
}
