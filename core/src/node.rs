//! Capillary Node
//!
//! Binds one duty-cycle policy to one node: identity, node kind, attached
//! energy sources, and the start/stop lifecycle. The host's scheduler drives
//! a node sequentially; instances are independent of each other.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::energy::EnergySourceRegistry;
use crate::error::{CapillaryError, Result};
use crate::policy::{DutyCyclePolicy, PolicyConfig};

/// Unique identifier for a node in the capillary network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generate a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a node in the capillary network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Battery-limited end device; off-time driven by residual energy
    EndDevice,

    /// Relay/coordinator; off-time driven by negotiated extensions
    Coordinator,
}

impl NodeKind {
    /// Whether this kind of node decides its off-time from its own energy
    pub fn is_energy_constrained(&self) -> bool {
        matches!(self, NodeKind::EndDevice)
    }
}

/// Configuration for a capillary node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Human-readable name for this node
    pub name: String,

    /// Role of the node in the network
    pub kind: NodeKind,

    /// Duty-cycle policy parameters
    pub policy: PolicyConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "capillary-node".to_string(),
            kind: NodeKind::EndDevice,
            policy: PolicyConfig::default(),
        }
    }
}

/// Lifecycle state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Stopped,
    Running,
}

/// A node participating in the capillary network
///
/// Owns exactly one [`DutyCyclePolicy`] and the registry of energy sources
/// attached to the node. `next_off_time` is the per-decision-point entry the
/// host scheduler calls; the returned duration is advisory.
pub struct CapillaryNode {
    /// Unique node identifier
    id: NodeId,

    /// Node configuration
    config: NodeConfig,

    /// Current lifecycle state
    state: NodeState,

    /// The node's duty-cycle policy
    policy: DutyCyclePolicy,

    /// Energy sources attached to this node
    energy: Arc<EnergySourceRegistry>,
}

impl CapillaryNode {
    /// Create a new node with the given configuration
    ///
    /// Fails with [`CapillaryError::InvalidConfig`] if the embedded policy
    /// configuration is invalid.
    pub fn new(config: NodeConfig) -> Result<Self> {
        let policy = DutyCyclePolicy::new(config.policy.clone())?;

        Ok(Self {
            id: NodeId::new(),
            config,
            state: NodeState::Stopped,
            policy,
            energy: Arc::new(EnergySourceRegistry::new()),
        })
    }

    /// Get the node's unique identifier
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's role
    pub fn kind(&self) -> NodeKind {
        self.config.kind
    }

    /// Get the node's configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Get the current lifecycle state
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Get the energy source registry
    ///
    /// The host attaches its battery/harvester models here before starting
    /// the node.
    pub fn energy(&self) -> &Arc<EnergySourceRegistry> {
        &self.energy
    }

    /// Get the duty-cycle policy
    pub fn policy(&self) -> &DutyCyclePolicy {
        &self.policy
    }

    /// Subscribe to the off-times this node computes
    pub fn subscribe_off_time(&self) -> watch::Receiver<Duration> {
        self.policy.subscribe()
    }

    /// Start the node and activate its duty-cycle policy
    pub fn start(&mut self) -> Result<()> {
        if self.state != NodeState::Stopped {
            return Err(CapillaryError::InvalidConfig(
                "Node is already running".to_string(),
            ));
        }

        self.policy.activate();
        self.state = NodeState::Running;
        tracing::info!(node_id = %self.id, kind = ?self.config.kind, "Capillary node started");

        Ok(())
    }

    /// Stop the node and release its energy sources
    pub fn stop(&mut self) -> Result<()> {
        if self.state != NodeState::Running {
            return Err(CapillaryError::NotRunning);
        }

        self.energy.clear();
        self.state = NodeState::Stopped;
        tracing::info!(node_id = %self.id, "Capillary node stopped");

        Ok(())
    }

    /// Decide how long the node should stay powered off
    ///
    /// Scans the attached energy sources for the aggregate residual fraction
    /// and delegates to the policy. The fraction is 0 when no sources are
    /// attached, so a started end device without a battery model sleeps
    /// maximally.
    pub fn next_off_time(&mut self) -> Result<Duration> {
        if self.state != NodeState::Running {
            return Err(CapillaryError::NotRunning);
        }

        let energy_fraction = self.energy.max_energy_fraction();
        Ok(self.policy.compute_off_time(self.config.kind, energy_fraction))
    }

    /// Forward an off-time extension request from an attached node
    pub fn negotiate_extension(&mut self, requested: Duration) {
        self.policy.negotiate_extension(requested);
    }
}

impl std::fmt::Debug for CapillaryNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapillaryNode")
            .field("id", &self.id)
            .field("kind", &self.config.kind)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::MockEnergySource;

    fn end_device() -> CapillaryNode {
        CapillaryNode::new(NodeConfig::default()).unwrap()
    }

    fn coordinator() -> CapillaryNode {
        CapillaryNode::new(NodeConfig {
            kind: NodeKind::Coordinator,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_node_id_generation() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_node_id_display() {
        let id = NodeId::from_uuid(Uuid::nil());
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn test_node_kind_constraint() {
        assert!(NodeKind::EndDevice.is_energy_constrained());
        assert!(!NodeKind::Coordinator.is_energy_constrained());
    }

    #[test]
    fn test_node_config_default() {
        let config = NodeConfig::default();
        assert_eq!(config.kind, NodeKind::EndDevice);
        assert_eq!(config.policy.max_off_time, Duration::from_secs(60));
    }

    #[test]
    fn test_node_rejects_invalid_policy_config() {
        let config = NodeConfig {
            policy: PolicyConfig {
                min_energy_threshold: 2.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(CapillaryNode::new(config).is_err());
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let mut node = end_device();
        assert_eq!(node.state(), NodeState::Stopped);

        node.start().unwrap();
        assert_eq!(node.state(), NodeState::Running);

        // Can't start again while running.
        assert!(node.start().is_err());

        node.stop().unwrap();
        assert_eq!(node.state(), NodeState::Stopped);

        // Can't stop a stopped node.
        assert!(matches!(node.stop(), Err(CapillaryError::NotRunning)));
    }

    #[test]
    fn test_off_time_requires_running_node() {
        let mut node = end_device();
        assert!(matches!(
            node.next_off_time(),
            Err(CapillaryError::NotRunning)
        ));
    }

    #[test]
    fn test_end_device_uses_attached_sources() {
        let mut node = end_device();
        node.energy().add(Arc::new(MockEnergySource::new(0.8)));
        node.start().unwrap();

        assert_eq!(node.next_off_time().unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_end_device_without_sources_sleeps_maximally() {
        let mut node = end_device();
        node.start().unwrap();

        assert_eq!(node.next_off_time().unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn test_end_device_takes_best_source() {
        let mut node = end_device();
        node.energy().add(Arc::new(MockEnergySource::new(0.1)));
        node.energy().add(Arc::new(MockEnergySource::new(0.5)));
        node.start().unwrap();

        // Max fraction 0.5 -> interior branch -> 30s.
        let off = node.next_off_time().unwrap();
        assert!((off.as_secs_f64() - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_coordinator_negotiation_through_node() {
        let mut node = coordinator();
        node.start().unwrap();

        // Activation leaves the full extension pending.
        assert_eq!(node.next_off_time().unwrap(), Duration::from_secs(61));

        node.negotiate_extension(Duration::from_secs(10));
        node.negotiate_extension(Duration::from_secs(5));
        assert_eq!(node.next_off_time().unwrap(), Duration::from_secs(11));
        assert_eq!(node.next_off_time().unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_stop_releases_energy_sources() {
        let mut node = end_device();
        node.energy().add(Arc::new(MockEnergySource::new(0.9)));
        node.start().unwrap();
        node.stop().unwrap();

        assert!(node.energy().is_empty());
    }

    #[tokio::test]
    async fn test_node_publishes_off_time() {
        let mut node = coordinator();
        let mut rx = node.subscribe_off_time();
        node.start().unwrap();

        node.next_off_time().unwrap();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Duration::from_secs(61));
    }
}
