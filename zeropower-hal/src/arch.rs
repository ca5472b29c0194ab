//! Portable in-line assembly
//!
//! The barrier and wait instructions are only emitted on the Cortex-M0+
//! itself. On any other target (the host running the unit tests) they are
//! replaced with placeholders that do nothing.

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod inner {
    pub use cortex_m::asm::{dsb, wfi};
}

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
mod inner {
    /// Placeholder function to emit a data synchronisation barrier
    pub fn dsb() {}
    /// Placeholder function to wait for an interrupt
    pub fn wfi() {}
}

pub use inner::*;
