//! Synchronous exception routing for ARM64 guests
//!
//! One dispatch per guest exit: decode ESR_EL2.EC, run the matching
//! handler, then retire the trapped instruction. The match is exhaustive
//! over the classes this engine routes, so adding or removing a class is
//! a compile-time-checked change.
//!
//! PC advance policy: every class except HVC advances the guest PC by the
//! trapped instruction length after a successful handler. HVC encodes its
//! own continuation (the exception return address already points past the
//! instruction). The lazy-mapping translation-fault path advances once
//! more inside the handler; both advances are applied.

use crate::arch::arm64::cpu::syndrome::{esr, hvc_imm16, wfx};
use crate::arch::arm64::cpu::vcpu::{sysreg, Vcpu, VcpuState};
use crate::arch::arm64::mmu::fault;
use crate::arch::arm64::ExceptionClass;
use crate::core::vmm::boundary::VmOps;
use crate::core::vmm::Vm;
use crate::{Error, Result};

/// Route one synchronous guest exit
pub fn handle_sync_exception(vm: &mut Vm, vcpu: &mut Vcpu, ops: &mut VmOps<'_>) -> Result<()> {
    let esr_val = vcpu.fault.esr;
    let ec_raw = esr::exception_class(esr_val);

    let ec = match ExceptionClass::from_raw(ec_raw) {
        Some(ec) => ec,
        None => {
            log::error!(
                "unsupported exception class {:#04x} on vCPU {} (ESR {:#x})",
                ec_raw,
                vcpu.id,
                esr_val
            );
            return Err(Error::NoDevice);
        }
    };

    let result = match ec {
        ExceptionClass::Unknown => Ok(()),
        ExceptionClass::WfiWfe => handle_wfx(vcpu, ops, esr::iss(esr_val)),
        // AArch32 coprocessor accesses are ignored.
        ExceptionClass::McrMrc | ExceptionClass::McrrMrrc => Ok(()),
        // Lazy FP disable policy: no FP/SIMD state is moved here.
        ExceptionClass::SimdFp => Ok(()),
        ExceptionClass::IllegalState => Ok(()),
        ExceptionClass::Hvc64 => handle_hvc(vcpu, ops, esr::iss(esr_val)),
        ExceptionClass::MsrMrsSystem => sysreg::handle_sysreg_trap(vcpu, ops),
        ExceptionClass::InstrAbortLowerEl => {
            let ipa = fault::fault_ipa(vcpu.fault.hpfar, vcpu.fault.far);
            log::debug!(
                "instruction abort from vCPU {} at IPA {:#x}; no recovery",
                vcpu.id,
                ipa
            );
            Ok(())
        }
        ExceptionClass::DataAbortLowerEl => fault::handle_data_abort(vm, vcpu, ops),
        ExceptionClass::InstrAbortSameEl
        | ExceptionClass::PcAlignment
        | ExceptionClass::DataAbortSameEl
        | ExceptionClass::SpAlignment => {
            log::error!(
                "{} on vCPU {}: recovery not implemented",
                ec.name(),
                vcpu.id
            );
            Err(Error::NotImplemented)
        }
    };

    // Retire the trapped instruction; HVC already continues past it.
    if result.is_ok() && ec != ExceptionClass::Hvc64 {
        vcpu.regs.advance_pc(esr::instruction_len(esr_val));
    }

    result
}

/// Trapped WFI/WFE
///
/// AArch32-style conditional encodings are out of scope: the condition
/// field must be valid and "always". WFE is only a yield hint; WFI parks
/// the vCPU until an interrupt is pending.
fn handle_wfx(vcpu: &mut Vcpu, ops: &mut VmOps<'_>, iss: u32) -> Result<()> {
    if !wfx::cond_valid(iss) || wfx::cond(iss) != wfx::COND_ALWAYS {
        log::warn!("conditional WFI/WFE is not supported (ISS {:#x})", iss);
        return Err(Error::NotSupported);
    }

    if wfx::is_wfe(iss) {
        if vcpu.state == VcpuState::Running {
            vcpu.state = VcpuState::Ready;
            ops.sched.make_runnable(vcpu);
        }
    } else {
        vcpu.state = VcpuState::Blocked;
        ops.sched.park_until_interrupt(vcpu);
    }
    Ok(())
}

/// Trapped HVC instruction
///
/// Immediate 0 is the PSCI conduit; every other immediate is reserved for
/// future hypervisor-call ABIs and ignored.
fn handle_hvc(vcpu: &mut Vcpu, ops: &mut VmOps<'_>, iss: u32) -> Result<()> {
    let imm = hvc_imm16(iss);
    if imm != 0 {
        log::debug!("HVC #{:#x} from vCPU {}: reserved, ignored", imm, vcpu.id);
        return Ok(());
    }
    ops.psci.call(vcpu.id, &mut vcpu.regs)
}
