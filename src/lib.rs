//! VNE (Virtual Network Engineer)
//!
//! On-host network diagnostics: an ordered probe pipeline (interface
//! facts, layer-2 sweep, gateway/WAN ping, DNS timing, traceroute,
//! Path-MTU discovery, SNMP counters, vendor packs), a classifier that
//! turns the observations into findings and a single health verdict, a
//! capped JSON run history, and a local HTTP control plane that streams
//! live progress to a browser.

pub mod classify;
pub mod cli;
pub mod config;
pub mod history;
pub mod logging;
pub mod models;
pub mod packs;
pub mod pipeline;
pub mod probes;
pub mod report;
pub mod scanner;
pub mod server;
pub mod snmp;

pub use cli::{parse_cli_args, CliOptions};
pub use models::{CiscoPackResults, Finding, Results, VendorCreds};
pub use pipeline::{run, run_full, Params, ProgressEvent, ProgressHook, RunOptions};
pub use probes::{DnsResult, MtuResult, NetInfo, PingResult, TraceResult};
pub use scanner::{l2_scan, L2Host};
pub use snmp::{get_interface_health, InterfaceHealth, InterfaceQuery};
