//! Stage-2 data-abort handling for ARM64
//!
//! Reconstructs the guest IPA from the fault address registers and routes
//! a stage-2 data abort to one of three families:
//! - translation fault: MMIO device probe first, then the lazy-mapping
//!   policy (unmapped-but-valid guest pages fault once and are backed)
//! - access fault: a present mapping hit by an MMIO access; emulate it
//! - permission fault and everything else: fatal, the stage-2 state is
//!   inconsistent
//!
//! Reference: ARM DDI 0487, D17.2.37 (ISS encoding for Data Abort)

use crate::arch::arm64::cpu::syndrome::{esr, DataAbortIss};
use crate::arch::arm64::cpu::vcpu::context::GprIndex;
use crate::arch::arm64::cpu::vcpu::Vcpu;
use crate::core::vmm::boundary::{DeviceProbe, MmioAccess, VmOps};
use crate::core::vmm::Vm;
use crate::{Error, Result};

/// HPFAR_EL2.FIPA field: bits [43:4] hold the faulting page number
pub const HPFAR_FIPA_MASK: u64 = 0x0000_0FFF_FFFF_FFF0;

/// In-page offset bits taken from FAR_EL2 (4KB granule)
pub const PAGE_OFFSET_MASK: u64 = 0xFFF;

/// Data fault status codes with the fault level collapsed
///
/// DFSC encodes the faulting translation level in its low 2 bits; the
/// classifier treats all levels of a family alike.
pub mod dfsc {
    /// Translation fault, any level
    pub const TRANSLATION: u8 = 0b00_0100;
    /// Access flag fault, any level
    pub const ACCESS_FLAG: u8 = 0b00_1000;
    /// Permission fault, any level
    pub const PERMISSION: u8 = 0b00_1100;
}

/// Stage-2 data-abort families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage2FaultKind {
    /// Page not mapped (any level)
    Translation,
    /// Mapping present but not yet marked accessed (any level)
    AccessFlag,
    /// Access denied (any level)
    Permission,
    /// Any other status code
    Other(u8),
}

impl Stage2FaultKind {
    /// Classify a raw DFSC value, collapsing the fault level
    pub const fn from_dfsc(code: u8) -> Self {
        match code & !0b11 {
            dfsc::TRANSLATION => Self::Translation,
            dfsc::ACCESS_FLAG => Self::AccessFlag,
            dfsc::PERMISSION => Self::Permission,
            other => Self::Other(other),
        }
    }
}

/// Reconstruct the faulting guest IPA from the fault address pair
///
/// Page number from HPFAR_EL2, in-page offset from FAR_EL2. Pure; valid
/// only for abort-class exits.
#[inline]
pub const fn fault_ipa(hpfar: u64, far: u64) -> u64 {
    ((hpfar & HPFAR_FIPA_MASK) << 8) | (far & PAGE_OFFSET_MASK)
}

/// Route a stage-2 data abort taken from a lower exception level
pub fn handle_data_abort(vm: &mut Vm, vcpu: &mut Vcpu, ops: &mut VmOps<'_>) -> Result<()> {
    let esr_val = vcpu.fault.esr;
    let iss = DataAbortIss::new(esr::iss(esr_val));
    let ipa = fault_ipa(vcpu.fault.hpfar, vcpu.fault.far);

    match Stage2FaultKind::from_dfsc(iss.dfsc()) {
        Stage2FaultKind::Translation => handle_translation_fault(vm, vcpu, ops, &iss, ipa),
        Stage2FaultKind::AccessFlag => handle_access_fault(vm, vcpu, ops, &iss, ipa),
        kind => {
            log::error!(
                "stage-2 state inconsistent for vCPU {}: {:?} (DFSC {:#04x}) at IPA {:#x}",
                vcpu.id,
                kind,
                iss.dfsc(),
                ipa
            );
            Err(Error::NoDevice)
        }
    }
}

/// Translation fault: device setup or lazy mapping
fn handle_translation_fault(
    vm: &mut Vm,
    vcpu: &mut Vcpu,
    ops: &mut VmOps<'_>,
    iss: &DataAbortIss,
    ipa: u64,
) -> Result<()> {
    match ops.device.probe(vm, ipa) {
        // Device emulation handled the fault as a privileged setup step.
        Ok(DeviceProbe::Claimed) => Ok(()),
        // Ordinary guest memory: back the page and retire the instruction.
        Ok(DeviceProbe::NotDevice) => {
            ops.memory.map_lazy(vm, ipa)?;
            vcpu.regs.advance_pc(esr::instruction_len(vcpu.fault.esr));
            Ok(())
        }
        Err(e) => {
            vcpu.regs.poison(GprIndex::from_raw(iss.srt()), ipa);
            Err(e)
        }
    }
}

/// Access fault: the mapping exists, so this is an emulated MMIO access
fn handle_access_fault(
    vm: &mut Vm,
    vcpu: &mut Vcpu,
    ops: &mut VmOps<'_>,
    iss: &DataAbortIss,
    ipa: u64,
) -> Result<()> {
    if !iss.isv() {
        log::warn!(
            "access fault at IPA {:#x} without a valid instruction syndrome",
            ipa
        );
        return Err(Error::NotSupported);
    }

    let size = iss.access_size()?;
    let direction = iss.direction();
    let reg = vcpu.regs.slot(GprIndex::from_raw(iss.srt()));

    ops.device
        .emulate(
            vm,
            MmioAccess {
                direction,
                addr: ipa,
                reg,
                size,
            },
        )
        .map_err(|_| Error::NoDevice)
}
