//! DHCP/DNS Applier (spec §4.4.3): renders a dnsmasq-style daemon config
//! and restarts the daemon. Rollback is not separately captured here — the
//! surrounding transaction's snapshot restore and re-apply covers it
//! (spec §4.4.3).

use routectl_process::{run, ApplyContext};
use routectl_types::{ConfigBundle, ConfigDocument, RouterConfError, Section};

use crate::Applier;

const DAEMON_CONFIG_PATH: &str = "/etc/dnsmasq.d/routectl.conf";

pub struct DhcpApplier;

impl DhcpApplier {
    pub fn new() -> Self {
        Self
    }

    /// Derive the `/24` base address for a pool's `start`/`limit` offsets
    /// from the `network` document's matching `interface` section (spec §9
    /// resolution: reject ambiguous or absent interfaces rather than guess).
    fn pool_base(network_doc: Option<&ConfigDocument>, interface: &str) -> Result<[u8; 3], RouterConfError> {
        let network_doc = network_doc.ok_or_else(|| RouterConfError::validation("dhcp.interface", interface))?;
        let section = network_doc
            .named(interface)
            .filter(|s| s.section_type == "interface")
            .ok_or_else(|| RouterConfError::validation("dhcp.interface", interface))?;

        if section.option("proto") != Some("static") {
            return Err(RouterConfError::validation("dhcp.interface", format!("{interface} is not static")));
        }
        let ipaddr = section.option("ipaddr").ok_or_else(|| RouterConfError::validation("dhcp.interface", interface))?;
        let octets: Vec<&str> = ipaddr.split('.').collect();
        if octets.len() != 4 {
            return Err(RouterConfError::validation("dhcp.interface", ipaddr));
        }
        let parsed: Result<Vec<u8>, _> = octets[..3].iter().map(|o| o.parse()).collect();
        let base = parsed.map_err(|_| RouterConfError::validation("dhcp.interface", ipaddr))?;
        Ok([base[0], base[1], base[2]])
    }

    fn render(doc: &ConfigDocument, network_doc: Option<&ConfigDocument>) -> Result<String, RouterConfError> {
        let mut out = String::new();

        if let Some(global) = doc.first_of_type("dnsmasq") {
            for (key, value) in &global.options {
                out.push_str(&format!("{key}={value}\n"));
            }
        }

        for pool in doc.sections_of_type("dhcp") {
            let interface = pool.option("interface").ok_or_else(|| RouterConfError::validation("dhcp.interface", "missing"))?;

            if pool.option("ignore") == Some("1") {
                out.push_str(&format!("no-dhcp-interface={interface}\n"));
                continue;
            }

            let start: u8 = pool.option("start").ok_or_else(|| RouterConfError::validation("dhcp.start", "missing"))?.parse().map_err(|_| RouterConfError::validation("dhcp.start", "not a number"))?;
            let limit: u16 = pool.option("limit").ok_or_else(|| RouterConfError::validation("dhcp.limit", "missing"))?.parse().map_err(|_| RouterConfError::validation("dhcp.limit", "not a number"))?;
            let leasetime = pool.option("leasetime").unwrap_or("12h");

            let base = Self::pool_base(network_doc, interface)?;
            let end = start as u16 + limit;
            if end > 254 {
                return Err(RouterConfError::validation("dhcp.limit", limit.to_string()));
            }

            out.push_str(&format!(
                "dhcp-range={}.{}.{}.{},{}.{}.{}.{},{}\n",
                base[0], base[1], base[2], start, base[0], base[1], base[2], end, leasetime
            ));

            if pool.option("dhcpv6") == Some("1") {
                out.push_str(&format!("dhcp-range={interface},::,constructor:{interface},ra-names\n"));
            }
            if pool.option("ra") == Some("1") {
                out.push_str(&format!("enable-ra\ninterface={interface}\n"));
            }
        }

        for host in doc.sections_of_type("host") {
            out.push_str(&render_host(host));
        }

        Ok(out)
    }
}

fn render_host(host: &Section) -> String {
    let mac = host.option("mac").unwrap_or("");
    let ip = host.option("ip").unwrap_or("");
    let hostname = host.option("hostname");
    match hostname {
        Some(hostname) => format!("dhcp-host={mac},{ip},{hostname}\n"),
        None => format!("dhcp-host={mac},{ip}\n"),
    }
}

impl Default for DhcpApplier {
    fn default() -> Self {
        Self::new()
    }
}

impl Applier for DhcpApplier {
    fn name(&self) -> &'static str {
        "dhcp"
    }

    fn apply(&self, ctx: &ApplyContext, configs: &ConfigBundle) -> Result<(), RouterConfError> {
        let empty = ConfigDocument::new();
        let doc = configs.get("dhcp").unwrap_or(&empty);
        let rendered = Self::render(doc, configs.get("network"))?;
        std::fs::write(DAEMON_CONFIG_PATH, rendered).map_err(|e| RouterConfError::io(DAEMON_CONFIG_PATH, e))?;
        run(ctx, "systemctl", &["restart", "dnsmasq"])?;
        Ok(())
    }

    fn validate(&self, ctx: &ApplyContext) -> Result<(), RouterConfError> {
        let out = run(ctx, "systemctl", &["is-active", "dnsmasq"])?;
        if out.stdout.trim() == "active" {
            Ok(())
        } else {
            Err(RouterConfError::apply("dhcp", "daemon is not active after restart"))
        }
    }

    fn rollback(&self, _ctx: &ApplyContext) -> Result<(), RouterConfError> {
        Ok(())
    }
}
