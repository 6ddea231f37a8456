use smallvec::SmallVec;

use super::{PageTableEntry, PageTableLevel};
use crate::Pa;

/// A single paging structure entry visited during a page table walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationEntry {
    /// The level of the table holding the entry.
    pub level: PageTableLevel,

    /// The raw entry.
    pub entry: PageTableEntry,

    /// The physical address where this entry is located in memory.
    pub entry_address: Pa,
}

impl TranslationEntry {
    /// Checks if the entry maps a page rather than pointing to a table.
    pub fn is_leaf(&self) -> bool {
        self.entry.present()
            && match self.level {
                PageTableLevel::Pt => true,
                _ => self.entry.large(),
            }
    }
}

/// Collection of translation entries, typically used in page table walks.
pub type TranslationEntries = SmallVec<[TranslationEntry; 4]>;

/// The record of a page table walk.
///
/// Holds every entry that was read, including the one at which the walk
/// stopped.
#[derive(Debug)]
pub struct VaTranslation {
    pub(super) entries: TranslationEntries,
    pub(super) pa: Option<Pa>,
}

impl VaTranslation {
    /// Returns the page table entries traversed during the walk.
    pub fn entries(&self) -> &[TranslationEntry] {
        &self.entries
    }

    /// Consumes the `VaTranslation` and returns the `TranslationEntries`.
    pub fn into_entries(self) -> TranslationEntries {
        self.entries
    }

    /// Returns the physical address resulting from the translation, if
    /// successful.
    pub fn pa(&self) -> Option<Pa> {
        self.pa
    }

    /// Returns the entry that mapped the page, if the walk succeeded.
    pub fn leaf(&self) -> Option<&TranslationEntry> {
        self.pa?;
        self.entries.last()
    }
}

impl IntoIterator for VaTranslation {
    type Item = TranslationEntry;
    type IntoIter = <TranslationEntries as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
