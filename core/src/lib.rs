//! Capillary Core Library
//!
//! Duty-cycle decision core for battery-powered nodes in a low-power
//! "capillary" wireless network. Provides the energy-threshold off-time
//! policy, off-time extension negotiation, the per-node energy source
//! registry, and the node lifecycle glue.

pub mod energy;
pub mod error;
pub mod node;
pub mod policy;

pub use energy::{EnergySource, EnergySourceRegistry, MockEnergySource};
pub use error::{CapillaryError, Result};
pub use node::{CapillaryNode, NodeConfig, NodeId, NodeKind, NodeState};
pub use policy::{DutyCyclePolicy, PolicyConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
