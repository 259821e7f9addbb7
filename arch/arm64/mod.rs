//! ARM64 (AArch64) host support for rtvisor
//!
//! Everything the world-switch engine knows about the ARMv8-A
//! virtualization extensions lives under this module:
//! - exception syndrome decoding (ESR_EL2 and its per-class ISS views)
//! - the virtual CPU context and its per-round switch
//! - stage-2 fault address reconstruction and data-abort classification
//!
//! The hypervisor runs at EL2; guests run at EL1/EL0 in AArch64 state.
//! AArch32 guests are rejected by this engine.
//!
//! ## References
//! - [ARM Architecture Reference Manual ARMv8-A](https://developer.arm.com/documentation/ddi0487/latest)

pub mod cpu;
pub mod mmu;

pub use cpu::vcpu::{Vcpu, VcpuState};

/// Page size (4KB granule)
pub const PAGE_SIZE: usize = 4096;

/// Page shift
pub const PAGE_SHIFT: usize = 12;

/// Maximum number of physical CPUs this engine tracks
pub const MAX_CPUS: usize = 8;

/// Exception classes routed by the synchronous dispatcher
///
/// The variants are the ESR_EL2.EC encodings this engine distinguishes.
/// Every encoding outside this set (including the architecture's reserved
/// codes) decodes to `None` and is treated as an unsupported exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionClass {
    /// Unknown reason
    Unknown = 0b000000,
    /// Trapped WFI or WFE instruction
    WfiWfe = 0b000001,
    /// Trapped MCR or MRC access (AArch32 coprocessor)
    McrMrc = 0b000011,
    /// Trapped MCRR or MRRC access (AArch32 coprocessor)
    McrrMrrc = 0b000100,
    /// Trapped access to SVE/SIMD/FP functionality
    SimdFp = 0b000111,
    /// Illegal execution state
    IllegalState = 0b001110,
    /// HVC instruction executed in AArch64 state
    Hvc64 = 0b010110,
    /// Trapped MSR, MRS, or System instruction (AArch64)
    MsrMrsSystem = 0b011000,
    /// Instruction abort from a lower exception level
    InstrAbortLowerEl = 0b100000,
    /// Instruction abort taken without a change in exception level
    InstrAbortSameEl = 0b100001,
    /// PC alignment fault
    PcAlignment = 0b100010,
    /// Data abort from a lower exception level
    DataAbortLowerEl = 0b100100,
    /// Data abort taken without a change in exception level
    DataAbortSameEl = 0b100101,
    /// SP alignment fault
    SpAlignment = 0b100110,
}

impl ExceptionClass {
    /// Decode a raw 6-bit EC value
    ///
    /// Returns `None` for every encoding this engine does not route,
    /// independent of the ISS contents.
    pub const fn from_raw(ec: u8) -> Option<Self> {
        match ec {
            0b000000 => Some(Self::Unknown),
            0b000001 => Some(Self::WfiWfe),
            0b000011 => Some(Self::McrMrc),
            0b000100 => Some(Self::McrrMrrc),
            0b000111 => Some(Self::SimdFp),
            0b001110 => Some(Self::IllegalState),
            0b010110 => Some(Self::Hvc64),
            0b011000 => Some(Self::MsrMrsSystem),
            0b100000 => Some(Self::InstrAbortLowerEl),
            0b100001 => Some(Self::InstrAbortSameEl),
            0b100010 => Some(Self::PcAlignment),
            0b100100 => Some(Self::DataAbortLowerEl),
            0b100101 => Some(Self::DataAbortSameEl),
            0b100110 => Some(Self::SpAlignment),
            _ => None,
        }
    }

    /// Exception class name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown reason",
            Self::WfiWfe => "WFI/WFE",
            Self::McrMrc => "MCR/MRC",
            Self::McrrMrrc => "MCRR/MRRC",
            Self::SimdFp => "SIMD/FP access",
            Self::IllegalState => "illegal execution state",
            Self::Hvc64 => "HVC (AArch64)",
            Self::MsrMrsSystem => "MSR/MRS/system instruction",
            Self::InstrAbortLowerEl => "instruction abort, lower EL",
            Self::InstrAbortSameEl => "instruction abort, same EL",
            Self::PcAlignment => "PC alignment fault",
            Self::DataAbortLowerEl => "data abort, lower EL",
            Self::DataAbortSameEl => "data abort, same EL",
            Self::SpAlignment => "SP alignment fault",
        }
    }
}

/// Guest exit classification, reported by the guest-entry trampoline
///
/// The discriminants are a bit-exact contract with the assembly exit path:
/// the trampoline returns one of these four raw values in a register, and
/// the orchestrator refuses anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExitReason {
    /// Synchronous exception from the guest
    Sync = 0,
    /// Physical interrupt while the guest was resident
    Irq = 1,
    /// System error (SError) while the guest was resident
    Serror = 2,
    /// Physical interrupt taken during synchronous exception entry
    IrqInSync = 3,
}

impl ExitReason {
    /// Decode the trampoline's raw classification value
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Sync),
            1 => Some(Self::Irq),
            2 => Some(Self::Serror),
            3 => Some(Self::IrqInSync),
            _ => None,
        }
    }
}
