//! End-to-end classification scenarios: synthetic probe outputs through
//! the classifier and finding rules.

use vne_agent::classify::{base_findings, classify};
use vne_agent::probes::Interface;
use vne_agent::{DnsResult, MtuResult, NetInfo, PingResult};

fn net_info_with_gateway() -> NetInfo {
    NetInfo {
        hostname: "workstation".to_string(),
        default_gateway: "192.168.1.1".to_string(),
        gateways: vec!["192.168.1.1".to_string()],
        dns_servers: vec!["192.168.1.1".to_string()],
        interfaces: vec![Interface {
            name: "eth0".to_string(),
            ips: vec!["192.168.1.50/24".to_string()],
            mac: "aa:bb:cc:dd:ee:ff".to_string(),
            up: true,
        }],
    }
}

fn ping(loss: f64, jitter_ms: f64, avg_ms: f64) -> PingResult {
    PingResult {
        avg_ms,
        p95_ms: avg_ms,
        jitter_ms,
        loss,
        raw: String::new(),
    }
}

fn dns(avg_ms: f64) -> DnsResult {
    DnsResult {
        avg_ms,
        answers: vec!["104.16.132.229".to_string()],
    }
}

fn mtu(path_mtu: u32) -> MtuResult {
    MtuResult {
        path_mtu,
        raw: String::new(),
    }
}

#[test]
fn healthy_run_has_no_reasons_and_no_findings() {
    let net = net_info_with_gateway();
    let gw = ping(0.0, 3.0, 1.2);
    let wan = ping(0.0, 6.0, 14.0);
    let dns_local = dns(18.0);
    let dns_cf = dns(12.0);
    let mtu_res = mtu(1500);

    let (classification, reasons) = classify(&net, &gw, &wan, &dns_local, &mtu_res);
    assert_eq!(classification, "Healthy");
    assert!(reasons.is_empty());

    let findings = base_findings(&net, "192.168.1.1", &gw, &wan, &dns_local, &dns_cf, &mtu_res);
    assert!(findings.is_empty(), "unexpected findings: {findings:?}");
}

#[test]
fn lan_trouble_dominates_and_cites_gateway_loss() {
    let net = net_info_with_gateway();
    let gw = ping(0.35, 40.0, 2.0);
    let wan = ping(0.0, 2.0, 15.0);

    let (classification, reasons) = classify(&net, &gw, &wan, &dns(20.0), &mtu(1500));
    assert_eq!(classification, "LAN problem likely");
    assert!(reasons[0].contains("Gateway ping unstable"));

    let findings = base_findings(
        &net,
        "192.168.1.1",
        &gw,
        &wan,
        &dns(20.0),
        &dns(15.0),
        &mtu(1500),
    );
    assert!(
        findings
            .iter()
            .any(|f| f.message.contains("High loss to default gateway (35%)")),
        "missing gateway loss finding: {findings:?}"
    );
}

#[test]
fn isp_impairment_is_wan_issue() {
    let net = net_info_with_gateway();
    let gw = ping(0.0, 5.0, 1.5);
    let wan = ping(0.08, 45.0, 60.0);

    let (classification, reasons) = classify(&net, &gw, &wan, &dns(20.0), &mtu(1500));
    assert_eq!(classification, "WAN/ISP issue likely");
    assert!(reasons[0].contains("WAN target showing impairment"));
}

#[test]
fn slow_but_clean_dns_is_dns_slow() {
    let net = net_info_with_gateway();
    let gw = ping(0.001, 2.0, 1.0);
    let wan = ping(0.001, 2.0, 12.0);

    let (classification, reasons) = classify(&net, &gw, &wan, &dns(220.0), &mtu(1500));
    assert_eq!(classification, "DNS slow");
    assert!(reasons[0].contains("220 ms"));
}

#[test]
fn vpn_with_reduced_mtu_is_mtu_issue_and_names_the_adapter() {
    let mut net = net_info_with_gateway();
    net.interfaces.push(Interface {
        name: "wg0".to_string(),
        ips: vec!["10.8.0.2/24".to_string()],
        mac: String::new(),
        up: true,
    });
    let gw = ping(0.0, 2.0, 1.0);
    let wan = ping(0.0, 3.0, 20.0);
    let mtu_res = mtu(1412);

    let (classification, reasons) = classify(&net, &gw, &wan, &dns(20.0), &mtu_res);
    assert_eq!(classification, "MTU/MSS issue");
    assert!(reasons[0].contains("wg0"));

    let findings = base_findings(
        &net,
        "192.168.1.1",
        &gw,
        &wan,
        &dns(20.0),
        &dns(15.0),
        &mtu_res,
    );
    assert!(
        findings
            .iter()
            .any(|f| f.severity == "info" && f.message.contains("wg0")),
        "missing VPN MTU finding: {findings:?}"
    );
}

#[test]
fn gateway_loss_threshold_is_monotonic() {
    // Raising gateway loss across the 10% threshold is the only change;
    // the verdict must move to the LAN label and nothing weaker.
    let net = net_info_with_gateway();
    let wan = ping(0.0, 2.0, 12.0);
    let dns_local = dns(200.0);

    let (below, _) = classify(&net, &ping(0.05, 1.0, 1.0), &wan, &dns_local, &mtu(1500));
    let (above, _) = classify(&net, &ping(0.15, 1.0, 1.0), &wan, &dns_local, &mtu(1500));
    assert_ne!(above, "Healthy");
    assert_ne!(above, "DNS slow");
    assert_eq!(above, "LAN problem likely");
    // Below the threshold the slow DNS rule may fire instead; it must
    // never be the LAN label.
    assert_ne!(below, "LAN problem likely");
}
