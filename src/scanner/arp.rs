//! ARP cache parsing for the layer-2 sweep.
//!
//! Two table formats are understood: the Windows `arp -a` layout
//! (`Interface: <ip> ---` headers followed by tabular rows) and the
//! Unix-like `? (<ip>) at <mac> on <ifname>` lines. Entries are kept only
//! when their address falls inside the sweep network of a candidate
//! target, and the result list is deduplicated by (interface, IP, MAC).

use std::collections::HashSet;
use std::net::Ipv4Addr;

use super::{L2Host, SweepTarget};

/// Canonicalize a MAC into `aa:bb:cc:dd:ee:ff`. Incomplete entries, the
/// broadcast address, and the all-zero address are rejected.
pub(crate) fn normalize_mac(raw: &str) -> Option<String> {
    let mut mac = raw.trim().to_lowercase();
    if mac.is_empty() || mac.contains("incomplete") {
        return None;
    }
    mac = mac.replace('-', ":").replace('.', "");
    mac = mac.trim_matches(|c| c == '(' || c == ')').to_string();
    if !mac.contains(':') && mac.len() == 12 {
        mac = mac
            .as_bytes()
            .chunks(2)
            .map(|pair| std::str::from_utf8(pair).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(":");
    }
    if !mac.contains(':') {
        return None;
    }
    if mac.contains("ff:ff:ff:ff:ff:ff") || mac.contains("00:00:00:00:00:00") {
        return None;
    }
    Some(mac)
}

/// Parse one `arp -a` transcript against the sweep targets.
pub(crate) fn parse_arp(output: &str, targets: &[SweepTarget]) -> Vec<L2Host> {
    if output.is_empty() {
        return Vec::new();
    }

    let mut current: Vec<usize> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut hosts: Vec<L2Host> = Vec::new();

    for raw_line in output.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("Interface:") {
            current.clear();
            if let Some(header_ip) = rest.trim().split_whitespace().next() {
                for (idx, t) in targets.iter().enumerate() {
                    if t.local_ip.to_string() == header_ip {
                        current.push(idx);
                    }
                }
            }
            continue;
        }

        if let Some((ip, mac, ifname)) = parse_unix_line(line) {
            let candidates: Vec<usize> = {
                let by_name: Vec<usize> = targets
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.if_name.eq_ignore_ascii_case(&ifname))
                    .map(|(i, _)| i)
                    .collect();
                if by_name.is_empty() {
                    (0..targets.len()).collect()
                } else {
                    by_name
                }
            };
            add_host(&mut hosts, &mut seen, targets, &candidates, ip, Some(&ifname), &mac);
            continue;
        }

        // Windows table row: "ip mac type"
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }
        let Ok(ip) = fields[0].parse::<Ipv4Addr>() else {
            continue;
        };
        let Some(mac) = normalize_mac(fields[1]) else {
            continue;
        };
        if current.is_empty() {
            continue;
        }
        add_host(&mut hosts, &mut seen, targets, &current, ip, None, &mac);
    }

    hosts
}

/// `? (ip) at mac on ifname ...`
fn parse_unix_line(line: &str) -> Option<(Ipv4Addr, String, String)> {
    let at_idx = line.find(" at ")?;
    let on_rel = line[at_idx + 4..].find(" on ")?;

    let ip_text = between(line, '(', ')')?;
    let ip: Ipv4Addr = ip_text.parse().ok()?;

    let mac_part = line[at_idx + 4..at_idx + 4 + on_rel].trim();
    let mac = normalize_mac(mac_part)?;

    let after_on = &line[at_idx + 4 + on_rel + 4..];
    let ifname = after_on.split_whitespace().next()?.to_string();

    Some((ip, mac, ifname))
}

fn between(s: &str, start: char, end: char) -> Option<&str> {
    let i = s.find(start)? + 1;
    let j = s[i..].find(end)?;
    Some(&s[i..i + j])
}

/// Attach the entry to the first candidate target whose network contains
/// it, preferring an interface-name match when a hint exists.
fn add_host(
    hosts: &mut Vec<L2Host>,
    seen: &mut HashSet<String>,
    targets: &[SweepTarget],
    candidates: &[usize],
    ip: Ipv4Addr,
    iface_hint: Option<&str>,
    mac: &str,
) {
    let strict = candidates.iter().copied().find(|&i| {
        let t = &targets[i];
        t.network.contains(ip)
            && iface_hint.map_or(true, |hint| t.if_name.eq_ignore_ascii_case(hint))
    });
    let relaxed = strict.or_else(|| {
        candidates
            .iter()
            .copied()
            .find(|&i| targets[i].network.contains(ip))
    });

    let Some(idx) = relaxed else {
        return;
    };
    let t = &targets[idx];
    let key = format!("{}|{}|{}", t.if_name, ip, mac);
    if !seen.insert(key) {
        return;
    }
    hosts.push(L2Host {
        if_name: t.if_name.clone(),
        ip: ip.to_string(),
        mac: mac.to_string(),
        vendor: String::new(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipnetwork::Ipv4Network;

    fn target(name: &str, local: &str, net: &str) -> SweepTarget {
        SweepTarget {
            if_name: name.to_string(),
            local_ip: local.parse().unwrap(),
            network: net.parse::<Ipv4Network>().unwrap(),
            hosts: Vec::new(),
        }
    }

    #[test]
    fn normalizes_every_common_mac_spelling() {
        for spelling in [
            "AA-BB-CC-DD-EE-FF",
            "aabb.ccdd.eeff",
            "AA:BB:CC:DD:EE:FF",
            "aabbccddeeff",
        ] {
            assert_eq!(
                normalize_mac(spelling).as_deref(),
                Some("aa:bb:cc:dd:ee:ff"),
                "spelling {spelling:?}"
            );
        }
    }

    #[test]
    fn rejects_broadcast_zero_and_incomplete() {
        assert_eq!(normalize_mac("ff:ff:ff:ff:ff:ff"), None);
        assert_eq!(normalize_mac("00:00:00:00:00:00"), None);
        assert_eq!(normalize_mac("(incomplete)"), None);
        assert_eq!(normalize_mac(""), None);
        assert_eq!(normalize_mac("zz:zz"), None);
    }

    #[test]
    fn parses_unix_format_lines() {
        let targets = vec![target("eth0", "192.168.1.50", "192.168.1.0/24")];
        let out = "? (192.168.1.1) at aa:bb:cc:dd:ee:ff on eth0 ifscope [ethernet]\n\
                   ? (192.168.1.7) at 11:22:33:44:55:66 on eth0 [ethernet]\n";
        let hosts = parse_arp(out, &targets);
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].ip, "192.168.1.1");
        assert_eq!(hosts[0].mac, "aa:bb:cc:dd:ee:ff");
        assert_eq!(hosts[0].if_name, "eth0");
    }

    #[test]
    fn parses_windows_format_and_attributes_to_header_interface() {
        let targets = vec![target("Ethernet", "192.168.1.50", "192.168.1.0/24")];
        let out = "\
Interface: 192.168.1.50 --- 0x5
  Internet Address      Physical Address      Type
  192.168.1.1           aa-bb-cc-dd-ee-ff     dynamic
  192.168.1.255         ff-ff-ff-ff-ff-ff     static
";
        let hosts = parse_arp(out, &targets);
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].if_name, "Ethernet");
        assert_eq!(hosts[0].mac, "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn windows_rows_without_matching_header_are_dropped() {
        let targets = vec![target("Ethernet", "192.168.1.50", "192.168.1.0/24")];
        let out = "\
Interface: 10.9.9.9 --- 0x7
  10.9.9.1              aa-bb-cc-dd-ee-01     dynamic
";
        assert!(parse_arp(out, &targets).is_empty());
    }

    #[test]
    fn entries_outside_every_sweep_network_are_dropped() {
        let targets = vec![target("eth0", "192.168.1.50", "192.168.1.0/24")];
        let out = "? (10.0.0.1) at aa:bb:cc:dd:ee:ff on eth0 [ethernet]\n";
        assert!(parse_arp(out, &targets).is_empty());
    }

    #[test]
    fn unknown_interface_hint_falls_back_to_containing_network() {
        let targets = vec![target("eth0", "192.168.1.50", "192.168.1.0/24")];
        let out = "? (192.168.1.9) at aa:bb:cc:dd:ee:ff on br-lan [ethernet]\n";
        let hosts = parse_arp(out, &targets);
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].if_name, "eth0");
    }

    #[test]
    fn parsing_the_same_output_twice_is_deterministic_and_deduped() {
        let targets = vec![
            target("eth0", "192.168.1.50", "192.168.1.0/24"),
            target("eth1", "10.0.0.5", "10.0.0.0/24"),
        ];
        let out = "\
? (192.168.1.1) at aa:bb:cc:dd:ee:ff on eth0 [ethernet]
? (192.168.1.1) at aa:bb:cc:dd:ee:ff on eth0 [ethernet]
? (10.0.0.1) at 11:22:33:44:55:66 on eth1 [ethernet]
";
        let first = parse_arp(out, &targets);
        let second = parse_arp(out, &targets);
        assert_eq!(first.len(), 2);
        assert_eq!(
            first
                .iter()
                .map(|h| (h.if_name.clone(), h.ip.clone(), h.mac.clone()))
                .collect::<Vec<_>>(),
            second
                .iter()
                .map(|h| (h.if_name.clone(), h.ip.clone(), h.mac.clone()))
                .collect::<Vec<_>>()
        );
        let mut keys: Vec<String> = first
            .iter()
            .map(|h| format!("{}|{}|{}", h.if_name, h.ip, h.mac))
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), first.len());
    }
}
