//! ARM64 physical CPU primitives
//!
//! Host-side interrupt masking and CPU identification used by the
//! world-switch round. The DAIF mask is taken once per round and restored
//! on every return path, so no host interrupt handler can observe a
//! partially switched register context.

pub mod syndrome;
pub mod vcpu;

#[cfg(target_arch = "aarch64")]
use aarch64_cpu::registers::{DAIF, MPIDR_EL1};
#[cfg(target_arch = "aarch64")]
use tock_registers::interfaces::{Readable, Writeable};

bitflags::bitflags! {
    /// DAIF exception mask bits (PSTATE)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DaifFlags: u64 {
        /// Debug exception mask
        const D = 1 << 9;
        /// SError (asynchronous abort) mask
        const A = 1 << 8;
        /// IRQ mask
        const I = 1 << 7;
        /// FIQ mask
        const F = 1 << 6;
    }
}

/// Saved interrupt state returned by [`irq_lock`]
pub type IrqKey = u64;

/// Mask debug, SError, FIQ and IRQ on the executing CPU
///
/// Returns the previous DAIF value for [`irq_unlock`].
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn irq_lock() -> IrqKey {
    let key = DAIF.get();
    DAIF.write(DAIF::D::Masked + DAIF::A::Masked + DAIF::I::Masked + DAIF::F::Masked);
    key
}

/// Restore the DAIF state saved by [`irq_lock`]
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn irq_unlock(key: IrqKey) {
    DAIF.set(key);
}

/// CPU number of the executing core (MPIDR_EL1 Aff0)
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn current_cpu_id() -> usize {
    (MPIDR_EL1.get() & 0xFF) as usize
}

// Host-side fallbacks so the engine and its tests build off-target.
#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn irq_lock() -> IrqKey {
    DaifFlags::empty().bits()
}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn irq_unlock(_key: IrqKey) {}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn current_cpu_id() -> usize {
    0
}
