//! Trapped MSR/MRS emulation for ARM64 guests
//!
//! Only two register groups are emulated here: the GIC software-generated
//! interrupt registers (forwarded to the vGIC) and the guest virtual
//! timer registers (forwarded to the timer model). Every other trapped
//! identity is reported as a missing device; the trap configuration is
//! expected not to produce any.
//!
//! Reference: ARM DDI 0487, D17.2.37 (ISS encoding for MSR/MRS)

use crate::arch::arm64::cpu::syndrome::{esr, sysreg_identity, SysRegIss};
use crate::arch::arm64::cpu::vcpu::context::GprIndex;
use crate::arch::arm64::cpu::vcpu::Vcpu;
use crate::core::vmm::boundary::{AccessDirection, VmOps};
use crate::{Error, Result};

/// ISS identities of the emulated system registers
pub mod regs {
    use super::sysreg_identity;

    /// ICC_SGI1R_EL1 - group 1 SGI generation
    pub const ICC_SGI1R_EL1: u32 = sysreg_identity(3, 0, 12, 11, 5);
    /// ICC_ASGI1R_EL1 - group 1 SGI generation, other security state
    pub const ICC_ASGI1R_EL1: u32 = sysreg_identity(3, 1, 12, 11, 6);
    /// ICC_SGI0R_EL1 - group 0 SGI generation
    pub const ICC_SGI0R_EL1: u32 = sysreg_identity(3, 2, 12, 11, 7);
    /// CNTV_CTL_EL0 - virtual timer control
    pub const CNTV_CTL_EL0: u32 = sysreg_identity(3, 3, 14, 3, 1);
    /// CNTV_CVAL_EL0 - virtual timer compare value
    pub const CNTV_CVAL_EL0: u32 = sysreg_identity(3, 3, 14, 3, 2);
    /// CNTV_TVAL_EL0 - virtual timer value
    pub const CNTV_TVAL_EL0: u32 = sysreg_identity(3, 3, 14, 3, 0);
}

/// Emulate one trapped MSR/MRS/system instruction
pub fn handle_sysreg_trap(vcpu: &mut Vcpu, ops: &mut VmOps<'_>) -> Result<()> {
    let iss = SysRegIss::new(esr::iss(vcpu.fault.esr));
    let direction = iss.direction();
    let idx = GprIndex::from_raw(iss.rt());
    let vcpu_id = vcpu.id;

    match iss.identity() {
        regs::ICC_SGI1R_EL1 | regs::ICC_ASGI1R_EL1 | regs::ICC_SGI0R_EL1 => {
            // The SGI registers are write-only; a trapped read is ignored.
            if direction == AccessDirection::Write {
                let value = vcpu.regs.read(idx);
                ops.vgic.raise_sgi(vcpu_id, value);
            }
            Ok(())
        }
        regs::CNTV_CTL_EL0 => {
            ops.timer.ctl(vcpu_id, direction, vcpu.regs.slot(idx));
            Ok(())
        }
        regs::CNTV_CVAL_EL0 => {
            ops.timer.cval(vcpu_id, direction, vcpu.regs.slot(idx));
            Ok(())
        }
        regs::CNTV_TVAL_EL0 => {
            ops.timer.tval(vcpu_id, direction, vcpu.regs.slot(idx));
            Ok(())
        }
        identity => {
            log::warn!(
                "unhandled system register trap on vCPU {}: identity {:#010x}, {:?}",
                vcpu_id,
                identity,
                direction
            );
            Err(Error::NoDevice)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vmm::boundary::mock::*;

    fn sysreg_esr(identity: u32, rt: u32, read: bool) -> u64 {
        let mut iss = identity | (rt << 5);
        if read {
            iss |= 1;
        }
        // EC = MSR/MRS trap, IL set
        (0x18u64 << 26) | esr::IL_BIT | iss as u64
    }

    fn vcpu_with_esr(esr: u64) -> Vcpu {
        let mut vcpu = Vcpu::new(2, 1, 0);
        vcpu.fault.esr = esr;
        vcpu
    }

    #[test]
    fn test_sgi_write_forwards_value() {
        let mut vcpu = vcpu_with_esr(sysreg_esr(regs::ICC_SGI1R_EL1, 3, false));
        vcpu.regs.x[3] = 0x0001_0001;
        let mut mocks = Mocks::default();

        let result = with_ops(&mut mocks, |ops| handle_sysreg_trap(&mut vcpu, ops));

        assert!(result.is_ok());
        assert_eq!(mocks.vgic.sgis, vec![(2, 0x0001_0001)]);
    }

    #[test]
    fn test_sgi_read_is_ignored() {
        let mut vcpu = vcpu_with_esr(sysreg_esr(regs::ICC_SGI0R_EL1, 3, true));
        let mut mocks = Mocks::default();

        let result = with_ops(&mut mocks, |ops| handle_sysreg_trap(&mut vcpu, ops));

        assert!(result.is_ok());
        assert!(mocks.vgic.sgis.is_empty());
    }

    #[test]
    fn test_timer_registers_forward_both_directions() {
        let mut mocks = Mocks::default();
        mocks.timer.read_value = 0x77;

        let mut vcpu = vcpu_with_esr(sysreg_esr(regs::CNTV_CTL_EL0, 1, true));
        let result = with_ops(&mut mocks, |ops| handle_sysreg_trap(&mut vcpu, ops));
        assert!(result.is_ok());
        assert_eq!(vcpu.regs.x[1], 0x77);

        let mut vcpu = vcpu_with_esr(sysreg_esr(regs::CNTV_CVAL_EL0, 1, false));
        vcpu.regs.x[1] = 0x1234;
        let result = with_ops(&mut mocks, |ops| handle_sysreg_trap(&mut vcpu, ops));
        assert!(result.is_ok());

        let mut vcpu = vcpu_with_esr(sysreg_esr(regs::CNTV_TVAL_EL0, 1, true));
        let result = with_ops(&mut mocks, |ops| handle_sysreg_trap(&mut vcpu, ops));
        assert!(result.is_ok());

        assert_eq!(
            mocks.timer.calls,
            vec![
                ("ctl", AccessDirection::Read),
                ("cval", AccessDirection::Write),
                ("tval", AccessDirection::Read),
            ]
        );
    }

    #[test]
    fn test_unknown_identity_is_no_device() {
        // SCTLR_EL1 (op0=3, op1=0, crn=1, crm=0, op2=0) is not emulated here
        let ident = sysreg_identity(3, 0, 1, 0, 0);
        let mut vcpu = vcpu_with_esr(sysreg_esr(ident, 0, false));
        let mut mocks = Mocks::default();

        let result = with_ops(&mut mocks, |ops| handle_sysreg_trap(&mut vcpu, ops));

        assert_eq!(result, Err(Error::NoDevice));
        assert!(mocks.vgic.sgis.is_empty());
        assert!(mocks.timer.calls.is_empty());
    }

    #[test]
    fn test_sgi_write_from_xzr_reads_scratch_pattern() {
        use crate::arch::arm64::cpu::vcpu::context::XZR_SCRATCH_PATTERN;

        let mut vcpu = vcpu_with_esr(sysreg_esr(regs::ICC_SGI1R_EL1, 31, false));
        let mut mocks = Mocks::default();

        let result = with_ops(&mut mocks, |ops| handle_sysreg_trap(&mut vcpu, ops));

        assert!(result.is_ok());
        assert_eq!(mocks.vgic.sgis, vec![(2, XZR_SCRATCH_PATTERN)]);
    }
}
