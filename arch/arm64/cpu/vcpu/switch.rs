//! Per-round world switch for ARM64 vCPUs
//!
//! One call runs the guest for one scheduling quantum:
//!
//! ```text
//! mask DAIF -> vGIC flush -> (reboot baseline reload) ->
//! guest EL1 context load -> trampoline -> guest EL1 context store ->
//! vGIC sync -> dispatch by exit class -> restore DAIF
//! ```
//!
//! Host interrupts stay masked for the whole guest-resident window, so no
//! host handler can observe a partially switched register context. Every
//! boundary failure surfaces as one negative result per round; retry and
//! vCPU termination policy belong to the scheduler.

use crate::arch::arm64::cpu::vcpu::{exception, Vcpu};
use crate::arch::arm64::cpu::{irq_lock, irq_unlock};
use crate::arch::arm64::ExitReason;
use crate::core::vmm::boundary::{HostContext, VmOps};
use crate::core::vmm::Vm;
use crate::{Error, Result};

/// DISR_EL1 fields preserved in the synthetic deferred-error syndrome:
/// A (valid) bit [31], IDS bit [24], ISS bits [23:0]
const DISR_SYNDROME_MASK: u64 = 0x81FF_FFFF;

/// Build the guest-visible deferred SError syndrome from the host DISR
#[inline]
pub const fn deferred_serror_syndrome(disr: u64) -> u64 {
    disr & DISR_SYNDROME_MASK
}

/// Run one world-switch round for the vCPU
pub fn vcpu_world_switch(vm: &mut Vm, vcpu: &mut Vcpu, ops: &mut VmOps<'_>) -> Result<()> {
    let key = irq_lock();

    // Commit pending virtual interrupts before the guest can observe them.
    // A failure here aborts the round; the guest is not entered.
    if let Err(e) = ops.vgic.flush(vcpu) {
        log::error!("vGIC flush failed for vCPU {}: {}", vcpu.id, e);
        irq_unlock(key);
        return Err(e);
    }

    if vm.take_reboot_request() {
        log::info!("VM {} reboot: reloading vCPU {} baseline", vm.id(), vcpu.id);
        vcpu.reload_boot_context();
    }

    // Guest-resident window.
    unsafe { vcpu.sysregs.load() };
    let mut host = HostContext::default();
    let raw = ops.entry.run(vcpu, &mut host);
    unsafe { vcpu.sysregs.store() };

    // Best effort: a failed sync is logged but does not discard the exit.
    if let Err(e) = ops.vgic.sync(vcpu) {
        log::warn!("vGIC sync failed for vCPU {}: {}", vcpu.id, e);
    }

    let reason = match ExitReason::from_raw(raw) {
        Some(reason) => reason,
        None => {
            log::error!(
                "trampoline reported unsupported exit classification {:#x} for vCPU {}",
                raw,
                vcpu.id
            );
            irq_unlock(key);
            return Err(Error::NotFound);
        }
    };
    vcpu.note_exit(reason);

    match reason {
        ExitReason::Irq | ExitReason::IrqInSync => {
            irq_unlock(key);
            Ok(())
        }
        ExitReason::Sync => {
            let result = exception::handle_sync_exception(vm, vcpu, ops);
            irq_unlock(key);
            result
        }
        ExitReason::Serror => {
            let syndrome = deferred_serror_syndrome(vcpu.fault.disr);
            log::error!(
                "SError from vCPU {}: deferred syndrome {:#010x}; guest injection not implemented",
                vcpu.id,
                syndrome
            );
            irq_unlock(key);
            Err(Error::NotImplemented)
        }
    }
}
