//! Virtual machine state visible to the world switch
//!
//! A full VM object (memory layout, device set, vCPU list) lives in the
//! surrounding hypervisor. The switch engine only consumes the VM
//! identity and the reboot request flag.

use crate::core::vmm::VmId;
use core::sync::atomic::{AtomicBool, Ordering};

/// Per-VM state consumed by the world-switch round
pub struct Vm {
    /// Unique VM ID
    id: VmId,
    /// Reboot requested; consumed by the next round of any of its vCPUs
    reboot_requested: AtomicBool,
}

impl Vm {
    /// Create VM state for the given ID
    pub fn new(id: VmId) -> Self {
        Self {
            id,
            reboot_requested: AtomicBool::new(false),
        }
    }

    /// VM ID
    pub fn id(&self) -> VmId {
        self.id
    }

    /// Flag the VM for reboot
    ///
    /// May be called from another core; the flag is consumed exactly once
    /// by the next world-switch round.
    pub fn request_reboot(&self) {
        self.reboot_requested.store(true, Ordering::Release);
    }

    /// Consume a pending reboot request
    pub fn take_reboot_request(&self) -> bool {
        self.reboot_requested.swap(false, Ordering::AcqRel)
    }
}
