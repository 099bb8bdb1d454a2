//! Top-level facade crate for ragbridge.
//!
//! Re-exports the wire contracts and the bridge runtime so users can depend on a single crate.

pub mod core {
    pub use ragbridge_core::*;
}

pub mod gateway {
    pub use ragbridge_gateway::*;
}
