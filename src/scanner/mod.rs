//! Layer-2 neighbor discovery.
//!
//! Best-effort sweep: enumerate the private subnets of every up interface
//! (clamped so a wide mask never triggers a huge sweep), fire one-shot
//! pings through a bounded worker pool to warm the ARP cache, then parse
//! `arp -a` and attribute vendors from the OUI database. Individual ping
//! failures are irrelevant; only the ARP cache state matters.

mod arp;
mod oui;

pub use oui::vendor_for_mac;

use std::collections::HashSet;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use ipnetwork::Ipv4Network;
use pnet::datalink;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::config::{DEFAULT_SCAN_CIDR_LIMIT, DEFAULT_SCAN_MAX_HOSTS, MAX_CONCURRENT_SWEEP_PINGS};

/// A neighbor found in the ARP cache after the sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2Host {
    pub if_name: String,
    pub ip: String,
    pub mac: String,
    #[serde(default)]
    pub vendor: String,
}

/// One interface subnet selected for sweeping.
#[derive(Debug, Clone)]
pub(crate) struct SweepTarget {
    pub if_name: String,
    pub local_ip: Ipv4Addr,
    pub network: Ipv4Network,
    pub hosts: Vec<Ipv4Addr>,
}

/// Sweep the local subnets and harvest the ARP cache.
///
/// `timeout` bounds each one-shot ping, `max_hosts` caps the enumeration
/// per interface, and `cidr_limit` is the smallest mask that will be swept
/// (a /16 interface is swept as the /`cidr_limit` anchored on its
/// address). A missing `ping` or `arp` binary fails the phase.
pub async fn l2_scan(timeout: Duration, max_hosts: usize, cidr_limit: u8) -> Result<Vec<L2Host>> {
    let timeout = if timeout.is_zero() {
        Duration::from_secs(2)
    } else {
        timeout
    };
    let max_hosts = if max_hosts == 0 {
        DEFAULT_SCAN_MAX_HOSTS
    } else {
        max_hosts
    };
    let cidr_limit = if cidr_limit == 0 {
        DEFAULT_SCAN_CIDR_LIMIT
    } else {
        cidr_limit
    };

    preflight_binary("ping").await?;
    preflight_binary("arp").await?;

    let targets = select_targets(max_hosts, cidr_limit);
    if targets.is_empty() {
        return Ok(Vec::new());
    }

    let to_ping = dedup_ping_targets(&targets);
    sweep(&to_ping, timeout).await;

    let arp_out = Command::new("arp")
        .arg("-a")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| anyhow!("execute arp -a: {e}"))?;
    let mut text = String::from_utf8_lossy(&arp_out.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&arp_out.stderr));

    let mut hosts = arp::parse_arp(&text, &targets);
    for host in &mut hosts {
        host.vendor = vendor_for_mac(&host.mac).unwrap_or_default();
    }
    Ok(hosts)
}

/// Running the binary with no useful arguments is enough to prove it is
/// on PATH; its exit status is irrelevant here.
async fn preflight_binary(name: &str) -> Result<()> {
    match Command::new(name)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
    {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(anyhow!("{name} command not found: {e}"))
        }
        Err(e) => Err(anyhow!("unable to execute {name}: {e}")),
    }
}

fn select_targets(max_hosts: usize, cidr_limit: u8) -> Vec<SweepTarget> {
    let mut targets = Vec::new();
    for iface in datalink::interfaces() {
        if !iface.is_up() || iface.is_loopback() {
            continue;
        }
        for net in &iface.ips {
            let IpAddr::V4(ip) = net.ip() else { continue };
            if !ip.is_private() {
                continue;
            }
            let Some(sweep_net) = sweep_network(ip, net.prefix(), cidr_limit) else {
                continue;
            };
            let hosts = enumerate_hosts(ip, &sweep_net, max_hosts);
            if hosts.is_empty() {
                continue;
            }
            targets.push(SweepTarget {
                if_name: iface.name.clone(),
                local_ip: ip,
                network: sweep_net,
                hosts,
            });
        }
    }
    targets
}

/// The sweep mask is the interface mask, widened no further than
/// `/limit` and clamped to /32.
pub(crate) fn sweep_network(ip: Ipv4Addr, prefix: u8, limit: u8) -> Option<Ipv4Network> {
    let target = prefix.max(limit).min(32);
    let anchored = Ipv4Network::new(ip, target).ok()?;
    Ipv4Network::new(anchored.network(), target).ok()
}

/// Ordered addresses of the sweep network, skipping the network and
/// broadcast addresses for masks of /30 and wider, capped at `limit`.
/// A /31 or /32 keeps the interface address itself.
pub(crate) fn enumerate_hosts(
    local_ip: Ipv4Addr,
    network: &Ipv4Network,
    limit: usize,
) -> Vec<Ipv4Addr> {
    let prefix = network.prefix();
    let base: u32 = network.network().into();
    let total: u64 = 1u64 << (32 - prefix);
    let cap = if limit > 0 {
        limit.min(total as usize)
    } else {
        total as usize
    };
    let skip_edges = prefix <= 30;

    let mut hosts = Vec::with_capacity(cap);
    for i in 0..total {
        if hosts.len() >= cap {
            break;
        }
        if skip_edges && (i == 0 || i == total - 1) {
            continue;
        }
        hosts.push(Ipv4Addr::from(base.wrapping_add(i as u32)));
    }
    if hosts.is_empty() && total > 0 {
        hosts.push(local_ip);
    }
    hosts
}

/// Flatten the per-interface host lists, dropping local addresses and
/// duplicates across interfaces while preserving order.
fn dedup_ping_targets(targets: &[SweepTarget]) -> Vec<Ipv4Addr> {
    let locals: HashSet<Ipv4Addr> = targets.iter().map(|t| t.local_ip).collect();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for t in targets {
        for &ip in &t.hosts {
            if locals.contains(&ip) || !seen.insert(ip) {
                continue;
            }
            out.push(ip);
        }
    }
    out
}

/// One-shot pings through a pool of at most
/// [`MAX_CONCURRENT_SWEEP_PINGS`] workers. Exit codes are ignored.
async fn sweep(targets: &[Ipv4Addr], timeout: Duration) {
    if targets.is_empty() {
        return;
    }
    let concurrency = targets.len().min(MAX_CONCURRENT_SWEEP_PINGS).max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles = Vec::with_capacity(targets.len());

    for &ip in targets {
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            one_shot_ping(ip, timeout).await;
        }));
    }
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!("sweep ping task failed: {e}");
        }
    }
}

async fn one_shot_ping(ip: Ipv4Addr, timeout: Duration) {
    let mut cmd = Command::new("ping");
    if cfg!(windows) {
        let ms = (timeout.as_millis() as u64).max(1000);
        cmd.args(["-n", "1", "-w", &ms.to_string(), &ip.to_string()]);
    } else {
        let sec = timeout.as_secs().max(1);
        cmd.args(["-c", "1", "-W", &sec.to_string(), &ip.to_string()]);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    // One second of grace on the wall deadline so the utility's own
    // timeout fires first.
    let _ = tokio::time::timeout(timeout + Duration::from_secs(1), cmd.status()).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_masks_are_clamped_to_the_limit() {
        let net = sweep_network("10.1.2.3".parse().unwrap(), 16, 24).unwrap();
        assert_eq!(net.to_string(), "10.1.2.0/24");
    }

    #[test]
    fn narrow_masks_are_kept() {
        let net = sweep_network("192.168.1.10".parse().unwrap(), 28, 24).unwrap();
        assert_eq!(net.to_string(), "192.168.1.0/28");
    }

    #[test]
    fn slash_sixteen_with_cap_stays_inside_the_clamped_network() {
        let local: Ipv4Addr = "10.1.2.3".parse().unwrap();
        let net = sweep_network(local, 16, 24).unwrap();
        let hosts = enumerate_hosts(local, &net, 50);
        assert_eq!(hosts.len(), 50);
        let unique: HashSet<_> = hosts.iter().collect();
        assert_eq!(unique.len(), 50);
        for ip in &hosts {
            assert!(net.contains(*ip), "{ip} escaped {net}");
            assert_ne!(*ip, "10.1.2.0".parse::<Ipv4Addr>().unwrap());
            assert_ne!(*ip, "10.1.2.255".parse::<Ipv4Addr>().unwrap());
        }
    }

    #[test]
    fn slash_24_enumeration_skips_network_and_broadcast() {
        let local: Ipv4Addr = "192.168.1.10".parse().unwrap();
        let net = sweep_network(local, 24, 24).unwrap();
        let hosts = enumerate_hosts(local, &net, 0);
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts[0], "192.168.1.1".parse::<Ipv4Addr>().unwrap());
        assert_eq!(hosts[253], "192.168.1.254".parse::<Ipv4Addr>().unwrap());
    }

    #[test]
    fn slash_31_and_32_keep_the_interface_address() {
        let local: Ipv4Addr = "10.0.0.1".parse().unwrap();
        let net32 = sweep_network(local, 32, 24).unwrap();
        assert_eq!(enumerate_hosts(local, &net32, 10), vec![local]);

        let net31 = sweep_network(local, 31, 24).unwrap();
        let hosts = enumerate_hosts(local, &net31, 10);
        assert!(hosts.contains(&local));
        assert_eq!(hosts.len(), 2);
    }

    #[test]
    fn ping_targets_are_deduped_and_exclude_locals() {
        let shared: Vec<Ipv4Addr> = vec![
            "192.168.1.1".parse().unwrap(),
            "192.168.1.2".parse().unwrap(),
            "192.168.1.3".parse().unwrap(),
        ];
        let targets = vec![
            SweepTarget {
                if_name: "eth0".to_string(),
                local_ip: "192.168.1.2".parse().unwrap(),
                network: "192.168.1.0/24".parse().unwrap(),
                hosts: shared.clone(),
            },
            SweepTarget {
                if_name: "wlan0".to_string(),
                local_ip: "192.168.1.9".parse().unwrap(),
                network: "192.168.1.0/24".parse().unwrap(),
                hosts: shared,
            },
        ];
        let to_ping = dedup_ping_targets(&targets);
        assert_eq!(
            to_ping,
            vec![
                "192.168.1.1".parse::<Ipv4Addr>().unwrap(),
                "192.168.1.3".parse::<Ipv4Addr>().unwrap(),
            ]
        );
    }
}
