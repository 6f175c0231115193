//! The Applier Capability and Registry (spec §4.4): the trait every
//! subsystem applier implements, and the name→applier map the Transaction
//! Engine consults in a fixed order.

mod dhcp;
mod firewall;
mod netmask;
mod network;

pub use dhcp::DhcpApplier;
pub use firewall::FirewallApplier;
pub use network::NetworkApplier;

use std::collections::HashMap;

use routectl_process::ApplyContext;
use routectl_types::{ConfigBundle, RouterConfError};

/// Default sequencing of appliers during `commit` (spec §4.4, §4.6).
pub const DEFAULT_APPLY_ORDER: [&str; 3] = ["network", "firewall", "dhcp"];

/// A subsystem that can push config into live system state.
///
/// Every applier receives the full [`ConfigBundle`] rather than just its
/// own named document, because DHCP pool ranges are derived from the
/// `network` document's interface addresses (spec §9 resolution) — an
/// applier that only needs its own config simply ignores the rest.
///
/// Implementations must make `apply` safely re-runnable with the same
/// input, and must capture whatever live state `rollback` needs to undo
/// the most recent `apply` — the registry holds applier instances for the
/// lifetime of the process so that captured state survives across calls.
pub trait Applier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Translate `configs` into system state.
    fn apply(&self, ctx: &ApplyContext, configs: &ConfigBundle) -> Result<(), RouterConfError>;

    /// Inspect live system state; return `Ok` only when the intended
    /// configuration is present.
    fn validate(&self, ctx: &ApplyContext) -> Result<(), RouterConfError>;

    /// Restore whatever system state was captured before the most recent `apply`.
    fn rollback(&self, ctx: &ApplyContext) -> Result<(), RouterConfError>;
}

#[derive(Default)]
pub struct ApplierRegistry {
    appliers: HashMap<String, Box<dyn Applier>>,
}

impl ApplierRegistry {
    pub fn new() -> Self {
        Self { appliers: HashMap::new() }
    }

    /// The registry pre-populated with the three built-in appliers under
    /// their spec names (`network`, `firewall`, `dhcp`).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(NetworkApplier::new()));
        registry.register(Box::new(FirewallApplier::new()));
        registry.register(Box::new(DhcpApplier::new()));
        registry
    }

    pub fn register(&mut self, applier: Box<dyn Applier>) {
        self.appliers.insert(applier.name().to_string(), applier);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Applier> {
        self.appliers.get(name).map(|b| b.as_ref())
    }

    /// The configured apply order, filtered down to names actually
    /// registered — unknown names in the order are skipped (spec §4.4).
    pub fn ordered(&self, order: &[&str]) -> Vec<&dyn Applier> {
        order.iter().filter_map(|name| self.get(name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_defaults_registers_network_firewall_dhcp() {
        let registry = ApplierRegistry::with_defaults();
        assert!(registry.get("network").is_some());
        assert!(registry.get("firewall").is_some());
        assert!(registry.get("dhcp").is_some());
    }

    #[test]
    fn ordered_skips_unknown_names() {
        let registry = ApplierRegistry::with_defaults();
        let order = ["network", "nonexistent", "dhcp"];
        let appliers = registry.ordered(&order);
        assert_eq!(appliers.iter().map(|a| a.name()).collect::<Vec<_>>(), vec!["network", "dhcp"]);
    }

    #[test]
    fn default_apply_order_matches_spec() {
        assert_eq!(DEFAULT_APPLY_ORDER, ["network", "firewall", "dhcp"]);
    }
}
