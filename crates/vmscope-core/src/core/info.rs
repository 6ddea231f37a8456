use serde::{Deserialize, Serialize};

use crate::Gfn;

/// Represents information about the introspected virtual machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmiInfo {
    /// The size of a page in bytes.
    pub page_size: u64,

    /// The shift value to convert a page number to a page address.
    pub page_shift: u64,

    /// The maximum guest frame number.
    pub max_gfn: Gfn,

    /// The number of virtual CPUs.
    pub vcpus: u16,

    /// Whether the guest runs with Physical Address Extension enabled.
    ///
    /// Only meaningful for 32-bit guests, where it selects between legacy
    /// 2-level paging and 3-level PAE paging.
    pub physical_address_extension: bool,
}
