//! Energy source registry
//!
//! Host-side view of the energy stores attached to one node. The policy
//! never scans sources itself; it consumes the single aggregate fraction
//! this registry produces.

use std::sync::{Arc, RwLock};

/// A store of residual energy attached to a node
///
/// Implement this for each battery/harvester model the host simulates.
pub trait EnergySource: Send + Sync {
    /// Remaining charge as a fraction of capacity, in [0, 1]
    fn energy_fraction(&self) -> f64;
}

/// Registry of the energy sources attached to one node
#[derive(Default)]
pub struct EnergySourceRegistry {
    sources: RwLock<Vec<Arc<dyn EnergySource>>>,
}

impl EnergySourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an energy source
    pub fn add(&self, source: Arc<dyn EnergySource>) {
        self.sources.write().unwrap().push(source);
        tracing::debug!(count = self.len(), "Attached energy source");
    }

    /// Number of attached sources
    pub fn len(&self) -> usize {
        self.sources.read().unwrap().len()
    }

    /// Whether no sources are attached
    pub fn is_empty(&self) -> bool {
        self.sources.read().unwrap().is_empty()
    }

    /// Detach all sources
    pub fn clear(&self) {
        self.sources.write().unwrap().clear();
        tracing::debug!("Detached all energy sources");
    }

    /// Maximum residual fraction across all attached sources
    ///
    /// Returns 0.0 when no sources are attached. Source readings are clamped
    /// to [0, 1] so a misbehaving source cannot push the policy outside its
    /// input domain.
    pub fn max_energy_fraction(&self) -> f64 {
        self.sources
            .read()
            .unwrap()
            .iter()
            .map(|source| source.energy_fraction().clamp(0.0, 1.0))
            .fold(0.0, f64::max)
    }
}

impl std::fmt::Debug for EnergySourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnergySourceRegistry")
            .field("source_count", &self.len())
            .finish()
    }
}

/// Fixed-fraction energy source for testing
#[derive(Debug, Clone)]
pub struct MockEnergySource {
    pub fraction: f64,
}

impl MockEnergySource {
    /// Create a source that always reports the given fraction
    pub fn new(fraction: f64) -> Self {
        Self { fraction }
    }
}

impl EnergySource for MockEnergySource {
    fn energy_fraction(&self) -> f64 {
        self.fraction
    }
}
