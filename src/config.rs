//! Configuration constants for the diagnostics agent.

use std::time::Duration;

/// Default number of ping attempts per host.
pub const DEFAULT_PING_COUNT: u32 = 4;

/// Default wall-clock deadline for each network probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default WAN target when none is supplied.
pub const DEFAULT_TARGET: &str = "1.1.1.1";

/// Hostname used for DNS latency measurements.
pub const DEFAULT_DNS_TARGET: &str = "cloudflare.com";

/// Maximum hop count passed to the traceroute utility.
pub const TRACE_MAX_HOPS: u32 = 20;

// ====== Layer-2 discovery ======

/// Default per-host timeout during the sweep.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on hosts probed per interface.
pub const DEFAULT_SCAN_MAX_HOSTS: usize = 256;

/// Smallest CIDR mask the sweep will expand to. A /16 interface is swept
/// as the /24 anchored on the interface address.
pub const DEFAULT_SCAN_CIDR_LIMIT: u8 = 24;

/// Upper bound on concurrent sweep pings.
pub const MAX_CONCURRENT_SWEEP_PINGS: usize = 32;

// ====== SNMP ======

/// Per-operation SNMP timeout (v2c, UDP/161).
pub const SNMP_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Overall deadline for one SNMP interface-health fetch.
pub const SNMP_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// SNMP agent port.
pub const SNMP_PORT: u16 = 161;

// ====== Control plane ======

/// Address the HTTP control plane binds to.
pub const WEB_BIND_ADDR: &str = "127.0.0.1:8080";

/// Ambient deadline for a control-plane run or vendor follow-up task.
pub const RUN_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// Most recent stream events kept for SSE replay.
pub const MAX_STREAM_LOG: usize = 500;

/// Per-subscriber SSE channel capacity; events are dropped for a
/// subscriber whose channel is full.
pub const SSE_CHANNEL_CAPACITY: usize = 32;

// ====== Run history ======

/// Directory run files are written to.
pub const HISTORY_DIR: &str = "runs";

/// Maximum run files retained.
pub const HISTORY_MAX_RUNS: usize = 20;
