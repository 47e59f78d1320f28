//! Health classification and finding rules.
//!
//! The verdict is derived from a fixed, severity-ranked issue list; the
//! findings are an independent accumulation of threshold rules. Keeping
//! both in one module keeps the thresholds coupled to the messages that
//! cite them.

use crate::models::Finding;
use crate::probes::{DnsResult, MtuResult, NetInfo, PingResult};
use crate::snmp::InterfaceHealth;

const GW_LOSS_THRESHOLD: f64 = 0.1;
const GW_JITTER_THRESHOLD: f64 = 20.0;
const WAN_LOSS_THRESHOLD: f64 = 0.05;
const WAN_JITTER_THRESHOLD: f64 = 30.0;
const DNS_SLOW_THRESHOLD: f64 = 150.0;
const DNS_CLEAN_LOSS_THRESHOLD: f64 = 0.02;
const MTU_MIN_HEALTHY: u32 = 1500;

const GW_LOSS_FINDING_THRESHOLD: f64 = 0.3;
const LOCAL_DNS_SLOW_MS: f64 = 100.0;
const PUBLIC_DNS_FAST_MS: f64 = 50.0;

struct Issue {
    label: &'static str,
    reason: String,
    severity: u8,
}

/// Derive the verdict and its reasons. `Healthy` when no issue fires;
/// otherwise the label of the highest-severity issue, first-listed
/// winning ties.
pub fn classify(
    net_info: &NetInfo,
    gw_ping: &PingResult,
    wan_ping: &PingResult,
    dns_local: &DnsResult,
    mtu: &MtuResult,
) -> (String, Vec<String>) {
    let has_gateway = !net_info.default_gateway.is_empty() || !net_info.gateways.is_empty();
    let gateway_bad = has_gateway
        && (gw_ping.loss >= GW_LOSS_THRESHOLD || gw_ping.jitter_ms >= GW_JITTER_THRESHOLD);
    let wan_bad =
        wan_ping.loss >= WAN_LOSS_THRESHOLD || wan_ping.jitter_ms >= WAN_JITTER_THRESHOLD;

    let mut issues: Vec<Issue> = Vec::new();
    if gateway_bad {
        issues.push(Issue {
            label: "LAN problem likely",
            reason: format!(
                "Gateway ping unstable (loss {:.1}%, jitter {:.1} ms)",
                gw_ping.loss * 100.0,
                gw_ping.jitter_ms
            ),
            severity: 3,
        });
    }
    if !gateway_bad && wan_bad {
        issues.push(Issue {
            label: "WAN/ISP issue likely",
            reason: format!(
                "WAN target showing impairment (loss {:.1}%, jitter {:.1} ms)",
                wan_ping.loss * 100.0,
                wan_ping.jitter_ms
            ),
            severity: 2,
        });
    }
    if !gateway_bad
        && !wan_bad
        && dns_local.avg_ms >= DNS_SLOW_THRESHOLD
        && gw_ping.loss < DNS_CLEAN_LOSS_THRESHOLD
        && wan_ping.loss < DNS_CLEAN_LOSS_THRESHOLD
    {
        issues.push(Issue {
            label: "DNS slow",
            reason: format!("System DNS lookups averaging {:.0} ms", dns_local.avg_ms),
            severity: 1,
        });
    }
    let vpn_adapters = net_info.vpn_adapter_names();
    if mtu.path_mtu > 0 && mtu.path_mtu < MTU_MIN_HEALTHY && !vpn_adapters.is_empty() {
        issues.push(Issue {
            label: "MTU/MSS issue",
            reason: format!(
                "Path MTU {} bytes with VPN/tunnel adapter(s) {}",
                mtu.path_mtu,
                vpn_adapters.join(", ")
            ),
            severity: 2,
        });
    }

    let reasons: Vec<String> = issues.iter().map(|i| i.reason.clone()).collect();

    // Ties resolve to the earliest issue in list order.
    let mut classification = "Healthy".to_string();
    let mut highest = 0u8;
    for issue in &issues {
        if issue.severity > highest {
            classification = issue.label.to_string();
            highest = issue.severity;
        }
    }

    (classification, reasons)
}

/// Threshold findings derived from the probe results alone.
pub fn base_findings(
    net_info: &NetInfo,
    gateway: &str,
    gw_ping: &PingResult,
    wan_ping: &PingResult,
    dns_local: &DnsResult,
    dns_public: &DnsResult,
    mtu: &MtuResult,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    if !gateway.is_empty() && gw_ping.loss > GW_LOSS_FINDING_THRESHOLD {
        findings.push(Finding::high(format!(
            "High loss to default gateway ({:.0}%). Suspect local wiring/switch port; \
             check cable/port; look for error counters.",
            gw_ping.loss * 100.0
        )));
    }
    if dns_local.avg_ms > LOCAL_DNS_SLOW_MS
        && dns_public.avg_ms > 0.0
        && dns_public.avg_ms < PUBLIC_DNS_FAST_MS
    {
        findings.push(Finding::medium(format!(
            "Local DNS slow (~{:.0} ms). Consider using a public resolver (1.1.1.1) or \
             fixing router DNS forwarder.",
            dns_local.avg_ms
        )));
    }
    if wan_ping.loss > WAN_LOSS_THRESHOLD {
        findings.push(Finding::medium(format!(
            "Packet loss to internet target (~{:.0}%). Likely ISP/modem or upstream \
             congestion.",
            wan_ping.loss * 100.0
        )));
    }
    if mtu.path_mtu > 0 && mtu.path_mtu < MTU_MIN_HEALTHY {
        findings.push(Finding::info(format!(
            "Path MTU appears to be {}. If VPN/tunnel is in path, lower MTU or enable \
             TCP MSS clamping.",
            mtu.path_mtu
        )));
    }
    let vpn_adapters = net_info.vpn_adapter_names();
    if !vpn_adapters.is_empty() && (mtu.path_mtu == 0 || mtu.path_mtu < MTU_MIN_HEALTHY) {
        let mtu_phrase = if mtu.path_mtu > 0 {
            format!("Path MTU reported as {}", mtu.path_mtu)
        } else {
            "Path MTU probe was inconclusive".to_string()
        };
        findings.push(Finding::info(format!(
            "{} with active VPN/tunnel adapter ({}). Recommend setting tunnel MTU to \
             1420-1412 and enabling a TCP MSS clamp to avoid fragmentation.",
            mtu_phrase,
            vpn_adapters.join(", ")
        )));
    }

    findings
}

/// Findings derived from SNMP interface counters.
pub fn snmp_findings(health: &InterfaceHealth) -> Vec<Finding> {
    let mut findings = Vec::new();
    if !health.oper_status.is_empty() && !health.oper_status.eq_ignore_ascii_case("up") {
        findings.push(Finding::high(format!(
            "Interface {} reports operational status {} via SNMP.",
            health.name, health.oper_status
        )));
    }
    if health.in_errors > 0 || health.out_errors > 0 {
        findings.push(Finding::medium(format!(
            "Interface {} shows {} input and {} output errors via SNMP.",
            health.name, health.in_errors, health.out_errors
        )));
    }
    if health.in_discards > 0 || health.out_discards > 0 {
        findings.push(Finding::medium(format!(
            "Interface {} shows {} input and {} output discards via SNMP.",
            health.name, health.in_discards, health.out_discards
        )));
    }
    findings
}
