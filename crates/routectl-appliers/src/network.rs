//! Network Applier (spec §4.4.1): interface address/route state.

use std::collections::HashMap;
use std::sync::Mutex;

use routectl_process::{run, ApplyContext};
use routectl_types::{ConfigBundle, ConfigDocument, RouterConfError};

use crate::netmask::netmask_to_cidr;
use crate::Applier;

fn valid_interface_name(name: &str) -> bool {
    (1..=15).contains(&name.len()) && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Opaque pre-apply state, kept for rollback but not yet interpreted
/// further than "an interface we touched" (spec §4.4.1: "kept for future
/// enhancement; restoring exact prior addresses is not required").
struct InterfaceCapture {
    #[allow(dead_code)]
    blob: String,
}

pub struct NetworkApplier {
    captures: Mutex<HashMap<String, InterfaceCapture>>,
}

impl NetworkApplier {
    pub fn new() -> Self {
        Self { captures: Mutex::new(HashMap::new()) }
    }

    fn apply_interface(&self, ctx: &ApplyContext, name: &str, section: &routectl_types::Section) -> Result<(), RouterConfError> {
        let capture = run(ctx, "ip", &["-d", "addr", "show", name]).map(|out| out.stdout).unwrap_or_default();
        self.captures.lock().unwrap().insert(name.to_string(), InterfaceCapture { blob: capture });

        let proto = section.option("proto").ok_or_else(|| RouterConfError::validation("proto", "missing"))?;
        match proto {
            "static" => self.apply_static(ctx, name, section),
            "dhcp" => self.apply_dhcp(ctx, name),
            "none" => {
                run(ctx, "ip", &["link", "set", name, "down"])?;
                Ok(())
            }
            other => Err(RouterConfError::validation("proto", other)),
        }
    }

    fn apply_static(&self, ctx: &ApplyContext, name: &str, section: &routectl_types::Section) -> Result<(), RouterConfError> {
        let ipaddr = section.option("ipaddr").ok_or_else(|| RouterConfError::validation("ipaddr", "missing"))?;
        let netmask = section.option("netmask").ok_or_else(|| RouterConfError::validation("netmask", "missing"))?;
        let cidr = netmask_to_cidr(netmask);
        let with_prefix = format!("{ipaddr}/{cidr}");

        run(ctx, "ip", &["addr", "flush", "dev", name])?;
        run(ctx, "ip", &["addr", "add", &with_prefix, "dev", name])?;
        run(ctx, "ip", &["link", "set", name, "up"])?;

        if let Some(gateway) = section.option("gateway") {
            let _ = run(ctx, "ip", &["route", "del", "default"]);
            let added = run(ctx, "ip", &["route", "add", "default", "via", gateway, "dev", name])?;
            if added.exit_code != 0 && !added.stderr.contains("File exists") {
                return Err(RouterConfError::apply("network", format!("adding default route failed: {}", added.stderr)));
            }
        }
        Ok(())
    }

    fn apply_dhcp(&self, ctx: &ApplyContext, name: &str) -> Result<(), RouterConfError> {
        run(ctx, "ip", &["link", "set", name, "up"])?;
        let _ = run(ctx, "dhclient", &["-r", name]);
        run(ctx, "dhclient", &[name])?;
        Ok(())
    }

    /// A stronger validation than the spec's default `Ok` contract: assert
    /// each configured interface reports link state `UP` afterward. Not
    /// called by the Transaction Engine by default (spec §9 resolution).
    pub fn validate_strict(&self, ctx: &ApplyContext, doc: &ConfigDocument) -> Result<(), RouterConfError> {
        for section in doc.sections_of_type("interface") {
            let Some(name) = &section.name else { continue };
            if section.option("proto") == Some("none") {
                continue;
            }
            let out = run(ctx, "ip", &["link", "show", name])?;
            if !out.stdout.contains("UP") {
                return Err(RouterConfError::apply("network", format!("{name} is not up after apply")));
            }
        }
        Ok(())
    }
}

impl Default for NetworkApplier {
    fn default() -> Self {
        Self::new()
    }
}

impl Applier for NetworkApplier {
    fn name(&self) -> &'static str {
        "network"
    }

    fn apply(&self, ctx: &ApplyContext, configs: &ConfigBundle) -> Result<(), RouterConfError> {
        let Some(doc) = configs.get("network") else { return Ok(()) };
        for section in doc.sections_of_type("interface") {
            let name = section.name.clone().ok_or_else(|| RouterConfError::validation("interface.name", "missing"))?;
            if !valid_interface_name(&name) {
                return Err(RouterConfError::validation("interface.name", name));
            }
            self.apply_interface(ctx, &name, section)?;
        }
        Ok(())
    }

    /// Returns `Ok` unconditionally: the interface being up after `apply`
    /// is already asserted by `apply`'s own error handling (spec §4.4.1).
    fn validate(&self, _ctx: &ApplyContext) -> Result<(), RouterConfError> {
        Ok(())
    }

    fn rollback(&self, ctx: &ApplyContext) -> Result<(), RouterConfError> {
        let names: Vec<String> = self.captures.lock().unwrap().drain().map(|(name, _)| name).collect();
        let mut errors = Vec::new();
        for name in names {
            if let Err(e) = run(ctx, "ip", &["addr", "flush", "dev", &name]) {
                errors.push(format!("{name}: flush failed: {e}"));
            }
            if let Err(e) = run(ctx, "ip", &["link", "set", &name, "down"]) {
                errors.push(format!("{name}: link down failed: {e}"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RouterConfError::RollbackError(errors))
        }
    }
}
