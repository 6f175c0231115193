//! Firewall Applier (spec §4.4.2, §6.3): validates and renders a single
//! nftables ruleset and loads it as one atomic replace.

use std::sync::Mutex;

use routectl_process::{run, ApplyContext};
use routectl_types::{ConfigBundle, ConfigDocument, RouterConfError, Section};

use crate::Applier;

const VALID_PROTOS: &[&str] = &["tcp", "udp", "icmp", "icmpv6", "esp", "ah", "sctp", "all"];
const VALID_TARGETS: &[&str] = &["accept", "drop", "reject"];
const VALID_POLICIES: &[&str] = &["accept", "drop"];

pub struct FirewallApplier {
    captured_ruleset: Mutex<Option<String>>,
}

impl FirewallApplier {
    pub fn new() -> Self {
        Self { captured_ruleset: Mutex::new(None) }
    }

    fn render(doc: &ConfigDocument) -> Result<String, RouterConfError> {
        let defaults = doc.first_of_type("defaults");
        let input_policy = policy_of(defaults, "input", "accept")?;
        let output_policy = policy_of(defaults, "output", "accept")?;
        let forward_policy = policy_of(defaults, "forward", "drop")?;

        let mut forward_lines = vec!["ct state established,related accept".to_string()];
        for rule in doc.sections_of_type("rule") {
            forward_lines.push(render_rule(rule)?);
        }
        forward_lines.push("ct state invalid drop".to_string());

        let mut postrouting_lines = Vec::new();
        for zone in doc.sections_of_type("zone") {
            if zone.option("masq") == Some("1") {
                for iface in zone.lists.get("network").into_iter().flatten() {
                    postrouting_lines.push(format!("oifname \"{iface}\" masquerade"));
                }
            }
        }

        let mut out = String::new();
        out.push_str("table inet routectl {\n");
        out.push_str(&format!(
            "  chain input {{\n    type filter hook input priority 0; policy {input_policy};\n    iif \"lo\" accept\n    ct state established,related accept\n    ip protocol icmp accept\n    ip6 nexthdr icmpv6 accept\n  }}\n\n"
        ));
        out.push_str(&format!("  chain forward {{\n    type filter hook forward priority 0; policy {forward_policy};\n"));
        for line in &forward_lines {
            out.push_str(&format!("    {line}\n"));
        }
        out.push_str("  }\n\n");
        out.push_str(&format!("  chain output {{\n    type filter hook output priority 0; policy {output_policy};\n  }}\n\n"));
        out.push_str("  chain prerouting {\n    type nat hook prerouting priority -100; policy accept;\n  }\n\n");
        out.push_str("  chain postrouting {\n    type nat hook postrouting priority 100; policy accept;\n");
        for line in &postrouting_lines {
            out.push_str(&format!("    {line}\n"));
        }
        out.push_str("  }\n}\n");
        Ok(out)
    }
}

fn policy_of(defaults: Option<&Section>, key: &str, fallback: &str) -> Result<String, RouterConfError> {
    let policy = defaults.and_then(|d| d.option(key)).unwrap_or(fallback);
    if VALID_POLICIES.contains(&policy) {
        Ok(policy.to_string())
    } else {
        Err(RouterConfError::validation(format!("defaults.{key}"), policy))
    }
}

fn render_rule(rule: &Section) -> Result<String, RouterConfError> {
    let mut parts = Vec::new();
    if let Some(src) = rule.option("src") {
        parts.push(format!("iifname \"{src}\""));
    }
    if let Some(dest) = rule.option("dest") {
        parts.push(format!("oifname \"{dest}\""));
    }

    let proto = rule.option("proto").unwrap_or("all");
    if proto != "all" && !VALID_PROTOS.contains(&proto) {
        return Err(RouterConfError::validation("rule.proto", proto));
    }
    if proto != "all" {
        parts.push(format!("ip protocol {proto}"));
    }

    if let Some(src_port) = rule.option("src_port") {
        validate_port_spec(src_port)?;
        parts.push(format!("{proto} sport {{ {} }}", src_port.replace('-', "-")));
    }
    if let Some(dest_port) = rule.option("dest_port") {
        validate_port_spec(dest_port)?;
        parts.push(format!("{proto} dport {{ {dest_port} }}"));
    }

    let target = rule.option("target").unwrap_or("accept");
    if !VALID_TARGETS.contains(&target) {
        return Err(RouterConfError::validation("rule.target", target));
    }
    parts.push(target.to_string());

    Ok(parts.join(" "))
}

fn validate_port_spec(spec: &str) -> Result<(), RouterConfError> {
    for part in spec.split(',') {
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: u32 = lo.parse().map_err(|_| RouterConfError::validation("rule.port", spec))?;
            let hi: u32 = hi.parse().map_err(|_| RouterConfError::validation("rule.port", spec))?;
            if !(1..=65535).contains(&lo) || !(1..=65535).contains(&hi) || lo > hi {
                return Err(RouterConfError::validation("rule.port", spec));
            }
        } else {
            let port: u32 = part.parse().map_err(|_| RouterConfError::validation("rule.port", spec))?;
            if !(1..=65535).contains(&port) {
                return Err(RouterConfError::validation("rule.port", spec));
            }
        }
    }
    Ok(())
}

impl Default for FirewallApplier {
    fn default() -> Self {
        Self::new()
    }
}

impl Applier for FirewallApplier {
    fn name(&self) -> &'static str {
        "firewall"
    }

    fn apply(&self, ctx: &ApplyContext, configs: &ConfigBundle) -> Result<(), RouterConfError> {
        let empty = ConfigDocument::new();
        let doc = configs.get("firewall").unwrap_or(&empty);
        let ruleset = Self::render(doc)?;

        let captured = run(ctx, "nft", &["list", "ruleset"]).map(|out| out.stdout).unwrap_or_default();
        *self.captured_ruleset.lock().unwrap() = Some(captured);

        load_ruleset(ctx, &ruleset)
    }

    fn validate(&self, ctx: &ApplyContext) -> Result<(), RouterConfError> {
        let out = run(ctx, "nft", &["list", "ruleset"])?;
        if out.stdout.trim().is_empty() {
            Err(RouterConfError::apply("firewall", "live ruleset is empty after apply"))
        } else {
            Ok(())
        }
    }

    fn rollback(&self, ctx: &ApplyContext) -> Result<(), RouterConfError> {
        let Some(blob) = self.captured_ruleset.lock().unwrap().take() else {
            return Ok(());
        };
        load_ruleset(ctx, &blob)
    }
}

fn load_ruleset(ctx: &ApplyContext, ruleset: &str) -> Result<(), RouterConfError> {
    let path = std::env::temp_dir().join(format!("routectl-ruleset-{}.nft", std::process::id()));
    std::fs::write(&path, ruleset).map_err(|e| RouterConfError::io(path.display().to_string(), e))?;
    let result = run(ctx, "nft", &["-f", &path.display().to_string()]);
    let _ = std::fs::remove_file(&path);
    result.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_section(fields: &[(&str, &str)]) -> Section {
        let mut s = Section::new("rule", None);
        for (k, v) in fields {
            s.set_option(*k, *v);
        }
        s
    }

    #[test]
    fn render_uses_default_policies_when_absent() {
        let doc = ConfigDocument::new();
        let ruleset = FirewallApplier::render(&doc).expect("render");
        assert!(ruleset.contains("policy accept;") || ruleset.contains("hook input priority 0; policy accept;"));
        assert!(ruleset.contains("hook forward priority 0; policy drop;"));
    }

    #[test]
    fn render_rejects_invalid_defaults_policy() {
        let mut doc = ConfigDocument::new();
        let mut defaults = Section::new("defaults", None);
        defaults.set_option("input", "bogus");
        doc.push(defaults);
        assert!(matches!(FirewallApplier::render(&doc), Err(RouterConfError::ValidationError { .. })));
    }

    #[test]
    fn render_rejects_invalid_proto() {
        let mut doc = ConfigDocument::new();
        doc.push(rule_section(&[("proto", "bogus"), ("target", "accept")]));
        assert!(matches!(FirewallApplier::render(&doc), Err(RouterConfError::ValidationError { .. })));
    }

    #[test]
    fn render_rejects_out_of_range_port() {
        let mut doc = ConfigDocument::new();
        doc.push(rule_section(&[("dest_port", "70000"), ("target", "accept")]));
        assert!(matches!(FirewallApplier::render(&doc), Err(RouterConfError::ValidationError { .. })));
    }

    #[test]
    fn render_accepts_port_range_and_list() {
        let mut doc = ConfigDocument::new();
        doc.push(rule_section(&[("dest_port", "80,443"), ("target", "accept")]));
        doc.push(rule_section(&[("dest_port", "8000-9000"), ("target", "drop")]));
        assert!(FirewallApplier::render(&doc).is_ok());
    }

    #[test]
    fn render_emits_masquerade_line_for_masq_zones() {
        let mut doc = ConfigDocument::new();
        let mut zone = Section::new("zone", Some("wan".into()));
        zone.set_option("masq", "1");
        zone.push_list("network", "eth0");
        doc.push(zone);

        let ruleset = FirewallApplier::render(&doc).expect("render");
        assert!(ruleset.contains("oifname \"eth0\" masquerade"));
    }
}
