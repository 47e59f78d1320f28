//! Local network facts: interfaces, default gateways, DNS resolvers.

use std::process::Command;
use std::sync::OnceLock;

use pnet::datalink;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One local interface as reported by the OS.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    #[serde(default)]
    pub ips: Vec<String>,
    pub mac: String,
    pub up: bool,
}

/// Snapshot of the host's network identity. The first gateway is the
/// canonical default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetInfo {
    pub hostname: String,
    #[serde(default)]
    pub interfaces: Vec<Interface>,
    #[serde(default)]
    pub gateways: Vec<String>,
    pub default_gateway: String,
    #[serde(default)]
    pub dns_servers: Vec<String>,
}

fn vpn_adapter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(nord|openvpn|wireguard|^tun|^tap|^wg)").unwrap())
}

impl NetInfo {
    /// Names of up interfaces whose name matches a known VPN/tunnel
    /// driver pattern (WireGuard, OpenVPN, NordVPN, tun/tap).
    pub fn vpn_adapter_names(&self) -> Vec<String> {
        self.interfaces
            .iter()
            .filter(|iface| iface.up && vpn_adapter_re().is_match(iface.name.trim()))
            .map(|iface| iface.name.clone())
            .collect()
    }
}

/// Gather hostname, interfaces, resolvers, and gateway guesses. Individual
/// sources failing leave their fields empty rather than failing the whole
/// snapshot.
pub fn get_basics() -> NetInfo {
    let mut ni = NetInfo {
        hostname: read_hostname(),
        ..Default::default()
    };

    for iface in datalink::interfaces() {
        ni.interfaces.push(Interface {
            name: iface.name.clone(),
            ips: iface.ips.iter().map(|net| net.to_string()).collect(),
            mac: iface.mac.map(|m| m.to_string()).unwrap_or_default(),
            up: iface.is_up(),
        });
    }

    ni.dns_servers = read_dns_servers();
    ni.gateways = guess_gateways();
    if let Some(first) = ni.gateways.first() {
        ni.default_gateway = first.clone();
    }
    ni
}

fn command_output(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .map(|o| {
            let mut text = String::from_utf8_lossy(&o.stdout).into_owned();
            if text.is_empty() {
                text = String::from_utf8_lossy(&o.stderr).into_owned();
            }
            text
        })
        .unwrap_or_default()
}

fn read_hostname() -> String {
    command_output("hostname", &[]).trim().to_string()
}

fn read_dns_servers() -> Vec<String> {
    if cfg!(windows) {
        return parse_ipconfig_dns(&command_output("ipconfig", &["/all"]));
    }
    let contents = std::fs::read_to_string("/etc/resolv.conf").unwrap_or_default();
    parse_resolv_conf(&contents)
}

/// `nameserver X` lines from resolv.conf.
fn parse_resolv_conf(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("nameserver"))
        .filter_map(|l| l.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

/// DNS server addresses from the `ipconfig /all` DNS-servers section. The
/// first server sits on the header line after the colon; continuation
/// lines list more until a blank line or the next `key : value` row.
fn parse_ipconfig_dns(output: &str) -> Vec<String> {
    let mut dns = Vec::new();
    let mut capturing = false;
    for line in output.lines() {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();
        if lower.starts_with("dns servers") {
            capturing = true;
            if let Some((_, value)) = trimmed.split_once(':') {
                let value = value.trim();
                if !value.is_empty() {
                    dns.push(value.to_string());
                }
            }
            continue;
        }
        if capturing {
            if trimmed.is_empty() || trimmed.contains(':') {
                capturing = false;
                continue;
            }
            if trimmed.contains('.') {
                dns.push(trimmed.to_string());
            }
        }
    }
    dns
}

fn guess_gateways() -> Vec<String> {
    if cfg!(windows) {
        return parse_route_print(&command_output("route", &["print", "0.0.0.0"]));
    }
    let mut out = command_output("ip", &["route"]);
    if out.is_empty() {
        out = command_output("route", &["-n"]);
    }
    parse_default_via(&out)
}

/// `default via X dev Y` lines from `ip route` output.
fn parse_default_via(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("default via"))
        .filter_map(|l| l.split_whitespace().nth(2))
        .map(str::to_string)
        .collect()
}

/// Gateway column of `route print 0.0.0.0` rows whose destination and
/// netmask are both 0.0.0.0.
fn parse_route_print(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|l| {
            let fields: Vec<&str> = l.split_whitespace().collect();
            if fields.len() >= 4 && fields[0] == "0.0.0.0" && fields[1] == "0.0.0.0" {
                Some(fields[2].to_string())
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, up: bool) -> Interface {
        Interface {
            name: name.to_string(),
            ips: Vec::new(),
            mac: String::new(),
            up,
        }
    }

    #[test]
    fn vpn_adapters_match_known_name_patterns() {
        let ni = NetInfo {
            interfaces: vec![
                iface("wg0", true),
                iface("tun0", true),
                iface("eth0", true),
                iface("NordLynx", true),
                iface("stun-helper", true),
            ],
            ..Default::default()
        };
        assert_eq!(ni.vpn_adapter_names(), vec!["wg0", "tun0", "NordLynx"]);
    }

    #[test]
    fn down_vpn_adapters_are_ignored() {
        let ni = NetInfo {
            interfaces: vec![iface("wg0", false), iface("openvpn-client", true)],
            ..Default::default()
        };
        assert_eq!(ni.vpn_adapter_names(), vec!["openvpn-client"]);
    }

    #[test]
    fn resolv_conf_nameservers_are_collected_in_order() {
        let contents = "# comment\nnameserver 192.168.1.1\nsearch lan\nnameserver 9.9.9.9\n";
        assert_eq!(
            parse_resolv_conf(contents),
            vec!["192.168.1.1", "9.9.9.9"]
        );
    }

    #[test]
    fn ipconfig_dns_section_captures_continuation_lines() {
        let output = "\
   Subnet Mask . . . . . . . . . . . : 255.255.255.0
   DNS Servers . . . . . . . . . . . : 192.168.1.1
                                       8.8.8.8
   NetBIOS over Tcpip. . . . . . . . : Enabled
";
        assert_eq!(parse_ipconfig_dns(output), vec!["192.168.1.1", "8.8.8.8"]);
    }

    #[test]
    fn default_via_lines_yield_gateways() {
        let output = "default via 192.168.1.1 dev eth0 proto dhcp\n10.0.0.0/24 dev eth1\n";
        assert_eq!(parse_default_via(output), vec!["192.168.1.1"]);
    }

    #[test]
    fn route_print_rows_yield_gateways() {
        let output = "\
Network Destination        Netmask          Gateway       Interface  Metric
          0.0.0.0          0.0.0.0      192.168.1.1    192.168.1.50     25
";
        assert_eq!(parse_route_print(output), vec!["192.168.1.1"]);
    }
}
