//! Kernel address translation and hardware event monitoring for Virtual
//! Machine Introspection.
//!
//! This crate re-exports the workspace crates behind feature flags:
//!
//! - [`arch::amd64`]: x86 paging (legacy, PAE, IA-32e) and events
//!   (`arch-amd64`)
//! - [`driver::snapshot`]: raw physical memory snapshots
//!   (`driver-snapshot`)
//! - [`os::linux`]: Linux kernel bootstrap and `System.map` symbols
//!   (`os-linux`)
//!
//! # Example
//!
//! ```no_run
//! use vmscope::{
//!     VmiSession,
//!     arch::amd64::Amd64,
//!     driver::snapshot::VmiSnapshotDriver,
//!     os::linux::{LinuxOs, SystemMap},
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let driver = VmiSnapshotDriver::<Amd64>::new("memory.raw")?;
//! let os = LinuxOs::new(SystemMap::from_file("System.map")?);
//! let session = VmiSession::init(driver, os)?;
//!
//! println!("kernel root: {}", session.kernel().root());
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub use vmscope_core::*;

/// Architecture implementations.
pub mod arch {
    pub use vmscope_core::arch::*;

    /// AMD64 architecture.
    #[cfg(feature = "arch-amd64")]
    #[cfg_attr(docsrs, doc(cfg(feature = "arch-amd64")))]
    pub mod amd64 {
        pub use vmscope_arch_amd64::*;
    }
}

/// VMI drivers.
pub mod driver {
    pub use vmscope_core::VmiDriver;

    /// Raw physical memory snapshot driver.
    #[cfg(feature = "driver-snapshot")]
    #[cfg_attr(docsrs, doc(cfg(feature = "driver-snapshot")))]
    pub mod snapshot {
        pub use vmscope_driver_snapshot::*;
    }
}

/// Operating system support.
pub mod os {
    pub use vmscope_core::os::*;

    /// Linux kernel bootstrap.
    #[cfg(feature = "os-linux")]
    #[cfg_attr(docsrs, doc(cfg(feature = "os-linux")))]
    pub mod linux {
        pub use vmscope_os_linux::*;
    }
}
