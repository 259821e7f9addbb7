//! Architecture support
//!
//! rtvisor targets ARMv8-A hosts only; the engine rejects AArch32 guests
//! and carries no other backends. The module is still selected through
//! `cfg_if` so a future port slots in next to `arm64`.

cfg_if::cfg_if! {
    if #[cfg(feature = "arch_arm64")] {
        pub mod arm64;

        pub use arm64::{ExceptionClass, ExitReason};
    } else {
        compile_error!("rtvisor requires the arch_arm64 feature");
    }
}
