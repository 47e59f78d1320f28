//! The ordered diagnostics pipeline.
//!
//! Phases run strictly in sequence on one task; a cancellation flag is
//! checked between phases. Probe failures are absorbed into best-effort
//! results and surfaced as step lines; only cancellation and unexpected
//! orchestration failures propagate as errors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::Utc;

use crate::classify;
use crate::config::{
    DEFAULT_DNS_TARGET, DEFAULT_PING_COUNT, DEFAULT_PROBE_TIMEOUT, DEFAULT_SCAN_CIDR_LIMIT,
    DEFAULT_SCAN_MAX_HOSTS, DEFAULT_SCAN_TIMEOUT, DEFAULT_TARGET, SNMP_FETCH_TIMEOUT,
    TRACE_MAX_HOPS,
};
use crate::models::{CiscoPackResults, Finding, Results, VendorCreds};
use crate::packs;
use crate::probes;
use crate::snmp::{self, InterfaceQuery};

/// Structured progress emitted while a run executes.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Phase { name: String },
    Step { msg: String },
}

/// Callback receiving progress events; the control plane broadcasts them
/// over SSE and the CLI prints the step lines.
pub type ProgressHook = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Tunables for one pipeline run. Zero values fall back to defaults.
#[derive(Clone, Default)]
pub struct Params {
    pub count: u32,
    pub timeout: Duration,
    pub scan: bool,
    pub scan_timeout: Duration,
    pub scan_max_hosts: usize,
    pub scan_cidr_limit: u8,
    pub target_host: String,
    pub dns_target: String,
    pub progress: Option<ProgressHook>,
    /// Set to request cancellation; checked between phases.
    pub cancel: Arc<AtomicBool>,
}

/// Everything `run_full` needs on top of the probe phases.
#[derive(Clone, Default)]
pub struct RunOptions {
    pub params: Params,
    pub user_note: String,
    pub skip_python: bool,
    pub auto_packs: bool,
    pub python_path: String,
    pub creds: VendorCreds,
    pub snmp: Option<InterfaceQuery>,
}

struct Progress {
    hook: Option<ProgressHook>,
}

impl Progress {
    fn phase(&self, name: &str) {
        if let Some(hook) = &self.hook {
            hook(ProgressEvent::Phase {
                name: name.to_string(),
            });
        }
    }

    fn step(&self, msg: &str) {
        if let Some(hook) = &self.hook {
            hook(ProgressEvent::Step {
                msg: msg.to_string(),
            });
        }
    }
}

fn check_cancel(cancel: &AtomicBool) -> Result<()> {
    if cancel.load(Ordering::SeqCst) {
        bail!("diagnostics run cancelled");
    }
    Ok(())
}

/// Run the probe phases in order and aggregate a classified `Results`.
pub async fn run(params: Params) -> Result<Results> {
    let count = if params.count == 0 {
        DEFAULT_PING_COUNT
    } else {
        params.count
    };
    let timeout = if params.timeout.is_zero() {
        DEFAULT_PROBE_TIMEOUT
    } else {
        params.timeout
    };
    let scan_timeout = if params.scan_timeout.is_zero() {
        DEFAULT_SCAN_TIMEOUT
    } else {
        params.scan_timeout
    };
    let max_hosts = if params.scan_max_hosts == 0 {
        DEFAULT_SCAN_MAX_HOSTS
    } else {
        params.scan_max_hosts
    };
    let cidr_limit = if params.scan_cidr_limit == 0 {
        DEFAULT_SCAN_CIDR_LIMIT
    } else {
        params.scan_cidr_limit
    };
    let target = {
        let t = params.target_host.trim();
        if t.is_empty() { DEFAULT_TARGET } else { t }.to_string()
    };
    let dns_target = {
        let t = params.dns_target.trim();
        if t.is_empty() { DEFAULT_DNS_TARGET } else { t }.to_string()
    };

    let progress = Progress {
        hook: params.progress.clone(),
    };
    let cancel = params.cancel;

    progress.phase("netinfo");
    progress.step("→ Collecting local network info…");
    tracing::info!("collecting local network info");
    check_cancel(&cancel)?;
    let net_info = tokio::task::spawn_blocking(probes::get_basics)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!("netinfo task failed: {e}");
            probes::NetInfo::default()
        });

    let gateway = if !net_info.default_gateway.is_empty() {
        net_info.default_gateway.clone()
    } else {
        net_info.gateways.first().cloned().unwrap_or_default()
    };

    progress.phase("l2-scan");
    let mut discovered = Vec::new();
    if params.scan {
        progress.step("→ Discovering local layer-2 neighbors (ping sweep)…");
        tracing::info!("running layer-2 discovery");
        check_cancel(&cancel)?;
        match crate::scanner::l2_scan(scan_timeout, max_hosts, cidr_limit).await {
            Ok(hosts) => {
                if hosts.is_empty() {
                    progress.step("  No L2 hosts discovered (ARP cache empty).");
                }
                discovered = hosts;
            }
            Err(e) => {
                progress.step(&format!("  Unable to complete L2 discovery: {e}"));
                tracing::warn!("L2 discovery error: {e}");
            }
        }
    } else {
        progress.step("→ Skipping local layer-2 discovery (enable with --scan).");
        tracing::info!("skipping layer-2 discovery (flag not set)");
    }

    progress.phase("gateway");
    check_cancel(&cancel)?;
    let mut gw_ping = probes::PingResult::default();
    if !gateway.is_empty() {
        progress.step(&format!("→ Pinging default gateway: {gateway}"));
        let (result, err) = probes::ping_host(&gateway, count, timeout).await;
        gw_ping = result;
        if let Some(e) = err {
            progress.step(&format!("  Gateway ping error: {e}"));
            tracing::warn!("gateway ping error: {e}");
        }
    } else {
        progress.step("→ No default gateway detected; skipping gateway ping.");
        tracing::info!("no default gateway detected; skipping gateway ping");
    }

    progress.phase("dns");
    progress.step("→ Testing DNS lookups…");
    tracing::info!("testing DNS lookups");
    check_cancel(&cancel)?;
    let dns_local = probes::dns_lookup_timed(&dns_target, &net_info.dns_servers, timeout).await;
    let dns_cf =
        probes::dns_lookup_timed(&dns_target, &["1.1.1.1".to_string()], timeout).await;

    progress.phase("wan");
    progress.step(&format!("→ Pinging internet target: {target}"));
    tracing::info!("pinging internet target {target}");
    check_cancel(&cancel)?;
    let (wan_ping, wan_err) = probes::ping_host(&target, count, timeout).await;
    if let Some(e) = wan_err {
        progress.step(&format!("  WAN ping error: {e}"));
        tracing::warn!("WAN ping error: {e}");
    }

    progress.phase("traceroute");
    progress.step("→ Traceroute (this may take ~10–20 seconds)…");
    tracing::info!("running traceroute");
    check_cancel(&cancel)?;
    let trace = probes::trace(&target, TRACE_MAX_HOPS, timeout).await;

    progress.phase("mtu");
    progress.step("→ MTU / Path MTU probe…");
    tracing::info!("running MTU / Path MTU probe");
    check_cancel(&cancel)?;
    let mtu = probes::mtu_check(&target).await;

    let findings = classify::base_findings(
        &net_info, &gateway, &gw_ping, &wan_ping, &dns_local, &dns_cf, &mtu,
    );
    let (classification, reasons) =
        classify::classify(&net_info, &gw_ping, &wan_ping, &dns_local, &mtu);

    let mut res = Results {
        when: Utc::now(),
        net_info,
        discovered,
        gw_jitter_ms: gw_ping.jitter_ms,
        wan_jitter_ms: wan_ping.jitter_ms,
        gw_ping,
        wan_ping,
        dns_local,
        dns_cf,
        trace,
        mtu,
        findings,
        target_host: target,
        has_gateway: !gateway.is_empty(),
        gateway_used: gateway,
        classification,
        reasons,
        ..Default::default()
    };
    res.format_loss_strings();
    Ok(res)
}

/// Run the probe phases plus the optional vendor-pack and SNMP phases,
/// producing the final `Results` the CLI and control plane persist.
pub async fn run_full(opts: RunOptions) -> Result<Results> {
    let progress = Progress {
        hook: opts.params.progress.clone(),
    };

    let mut res = run(opts.params.clone()).await?;

    let suggestions = packs::packs_for(&res.discovered);
    if !suggestions.is_empty() {
        tracing::info!("vendor packs suggested: {suggestions:?}");
    }

    let mut auto_pack_findings: Vec<Finding> = Vec::new();
    let mut forti_raw = None;
    let mut cisco: Option<CiscoPackResults> = None;

    if !opts.skip_python {
        progress.phase("python-packs");
        if opts.auto_packs && !suggestions.is_empty() {
            let python = if opts.python_path.is_empty() {
                packs::default_python_path().to_string()
            } else {
                opts.python_path.clone()
            };
            let mut run_keys: Vec<&str> = Vec::new();
            for key in &suggestions {
                match key.as_str() {
                    packs::PACK_FORTIGATE => {
                        if opts.creds.has_forti() {
                            run_keys.push(packs::PACK_FORTIGATE);
                        } else {
                            auto_pack_findings.push(Finding::info(
                                "Detected Fortinet device(s): supply --forti-host, \
                                 --forti-user, and --forti-pass to run vendor pack.",
                            ));
                            tracing::info!(
                                "detected Fortinet device(s) but missing credentials; \
                                 skipping auto pack run"
                            );
                        }
                    }
                    packs::PACK_CISCO_IOS => {
                        if opts.creds.has_cisco() {
                            run_keys.push(packs::PACK_CISCO_IOS);
                        } else {
                            auto_pack_findings.push(Finding::info(
                                "Detected Cisco device(s): supply --cisco-host, \
                                 --cisco-user, and --cisco-pass to run vendor pack.",
                            ));
                            tracing::info!(
                                "detected Cisco device(s) but missing credentials; \
                                 skipping auto pack run"
                            );
                        }
                    }
                    _ => {}
                }
            }
            if !run_keys.is_empty() {
                let outcome = run_vendor_packs(&python, &opts.creds, &run_keys, &|msg| {
                    progress.step(msg)
                })
                .await;
                forti_raw = outcome.forti_raw;
                cisco = outcome.cisco;
            }
        }
    }

    let mut iface_health = None;
    if let Some(query) = &opts.snmp {
        progress.phase("snmp");
        progress.step("→ Fetching SNMP interface health…");
        tracing::info!(
            "fetching SNMP interface health from {} ({})",
            query.host,
            query.iface
        );
        match tokio::time::timeout(
            SNMP_FETCH_TIMEOUT,
            snmp::get_interface_health(&query.host, &query.community, &query.iface),
        )
        .await
        {
            Ok(Ok(health)) => {
                progress.step(&format!(
                    "  Interface {} status: {}",
                    health.name, health.oper_status
                ));
                progress.step(&format!("  Speed: {} bps", health.speed_bps));
                progress.step(&format!(
                    "  InErrors={} OutErrors={} InDiscards={} OutDiscards={}",
                    health.in_errors, health.out_errors, health.in_discards, health.out_discards
                ));
                iface_health = Some(health);
            }
            Ok(Err(e)) => {
                progress.step(&format!("  Unable to fetch interface health: {e}"));
                tracing::warn!("SNMP interface health error: {e}");
            }
            Err(_) => {
                progress.step("  Unable to fetch interface health: timed out");
                tracing::warn!("SNMP interface health fetch timed out");
            }
        }
    }

    progress.phase("finalizing");
    let mut findings = std::mem::take(&mut res.findings);
    findings.extend(auto_pack_findings);
    if let Some(health) = &iface_health {
        findings.extend(classify::snmp_findings(health));
    }
    if let Some(cisco) = &cisco {
        findings.extend(cisco.findings.iter().cloned());
    }

    res.when = Utc::now();
    res.user_note = opts.user_note;
    res.findings = findings;
    res.forti_raw = forti_raw;
    res.cisco_ios = cisco;
    res.iface_health = iface_health;
    res.vendor_suggestions = suggestions;
    res.format_loss_strings();

    Ok(res)
}

/// Outcome of one vendor-pack execution round.
#[derive(Debug, Default)]
pub struct VendorRunOutcome {
    pub forti_raw: Option<serde_json::Map<String, serde_json::Value>>,
    pub cisco: Option<CiscoPackResults>,
    pub summaries: Vec<Finding>,
    pub findings: Vec<Finding>,
}

/// Run the credentialed packs named in `keys` through the bridge and parse
/// their replies. Failures become info-severity summaries; they never
/// propagate.
pub async fn run_vendor_packs(
    python: &str,
    creds: &VendorCreds,
    keys: &[&str],
    step: &(dyn Fn(&str) + Sync),
) -> VendorRunOutcome {
    let mut outcome = VendorRunOutcome::default();

    if keys.contains(&packs::PACK_FORTIGATE) {
        step("→ Running FortiGate vendor pack…");
        tracing::info!("running FortiGate vendor pack");
        let payload = serde_json::json!({
            "host": creds.forti_host,
            "username": creds.forti_user,
            "password": creds.forti_pass,
            "commands": {
                "interfaces": "get hardware nic",
                "routes": "get router info routing-table all",
            },
        });
        match packs::run_pack(python, &packs::pack_script(packs::PACK_FORTIGATE), &payload).await
        {
            Ok(out) => match serde_json::from_slice::<serde_json::Map<_, _>>(&out) {
                Ok(parsed) => {
                    outcome.forti_raw = Some(parsed);
                    outcome
                        .summaries
                        .push(Finding::info("FortiGate vendor pack completed."));
                }
                Err(e) => {
                    let msg = format!("FortiGate vendor pack parse error: {e}");
                    step(&msg);
                    outcome.summaries.push(Finding::info(msg));
                }
            },
            Err(e) => {
                let msg = format!("FortiGate vendor pack error: {e}");
                step(&msg);
                outcome.summaries.push(Finding::info(msg));
            }
        }
    }

    if keys.contains(&packs::PACK_CISCO_IOS) {
        step("→ Running Cisco IOS vendor pack…");
        tracing::info!("running Cisco IOS vendor pack");
        let mut payload = serde_json::json!({
            "host": creds.cisco_host,
            "username": creds.cisco_user,
            "password": creds.cisco_pass,
        });
        if !creds.cisco_secret.is_empty() {
            payload["secret"] = serde_json::Value::String(creds.cisco_secret.clone());
        }
        if creds.cisco_port != 0 && creds.cisco_port != 22 {
            payload["port"] = serde_json::Value::from(creds.cisco_port);
        }
        match packs::run_pack(python, &packs::pack_script(packs::PACK_CISCO_IOS), &payload).await
        {
            Ok(out) => match serde_json::from_slice::<CiscoPackResults>(&out) {
                Ok(parsed) => {
                    outcome.summaries.push(Finding::info(format!(
                        "Cisco IOS vendor pack completed with {} finding(s).",
                        parsed.findings.len()
                    )));
                    outcome.findings.extend(parsed.findings.iter().cloned());
                    outcome.cisco = Some(parsed);
                }
                Err(e) => {
                    let msg = format!("Cisco IOS vendor pack parse error: {e}");
                    step(&msg);
                    outcome.summaries.push(Finding::info(msg));
                }
            },
            Err(e) => {
                let msg = format!("Cisco IOS vendor pack error: {e}");
                step(&msg);
                outcome.summaries.push(Finding::info(msg));
            }
        }
    }

    outcome
}
