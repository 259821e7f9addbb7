//! Core hypervisor modules
//!
//! Architecture-independent pieces of the world-switch engine: virtual
//! machine identity, and the boundaries to the subsystems this engine
//! drives but does not implement.

pub mod vmm;
