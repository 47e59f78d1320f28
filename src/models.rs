//! Data models shared across the diagnostics pipeline, history store, and
//! control plane.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::probes::{DnsResult, MtuResult, NetInfo, PingResult, TraceResult};
use crate::scanner::L2Host;
use crate::snmp::InterfaceHealth;

/// A severity-tagged observation attached to a run. Severity is one of
/// `info`, `medium`, or `high`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: String,
    pub message: String,
}

impl Finding {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            severity: "info".to_string(),
            message: message.into(),
        }
    }

    pub fn medium(message: impl Into<String>) -> Self {
        Self {
            severity: "medium".to_string(),
            message: message.into(),
        }
    }

    pub fn high(message: impl Into<String>) -> Self {
        Self {
            severity: "high".to_string(),
            message: message.into(),
        }
    }
}

/// Structured reply from the Cisco IOS vendor pack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CiscoPackResults {
    #[serde(default)]
    pub interfaces: Vec<serde_json::Value>,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub raw: String,
}

/// Credentials for the optional vendor packs, supplied by flag, env, or
/// the control plane's vendor endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorCreds {
    #[serde(default)]
    pub forti_host: String,
    #[serde(default)]
    pub forti_user: String,
    #[serde(default)]
    pub forti_pass: String,
    #[serde(default)]
    pub cisco_host: String,
    #[serde(default)]
    pub cisco_user: String,
    #[serde(default)]
    pub cisco_pass: String,
    #[serde(default)]
    pub cisco_secret: String,
    #[serde(default)]
    pub cisco_port: u16,
}

impl VendorCreds {
    pub fn normalize(&mut self) {
        self.forti_host = self.forti_host.trim().to_string();
        self.forti_user = self.forti_user.trim().to_string();
        self.forti_pass = self.forti_pass.trim().to_string();
        self.cisco_host = self.cisco_host.trim().to_string();
        self.cisco_user = self.cisco_user.trim().to_string();
        self.cisco_pass = self.cisco_pass.trim().to_string();
        self.cisco_secret = self.cisco_secret.trim().to_string();
    }

    pub fn has_forti(&self) -> bool {
        !self.forti_host.is_empty() && !self.forti_user.is_empty() && !self.forti_pass.is_empty()
    }

    pub fn has_cisco(&self) -> bool {
        !self.cisco_host.is_empty() && !self.cisco_user.is_empty() && !self.cisco_pass.is_empty()
    }
}

/// The aggregated outcome of one diagnostics run. Owned by the pipeline
/// until returned, then by the control-plane run state; the history store
/// persists an immutable copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Results {
    pub when: DateTime<Utc>,
    #[serde(default)]
    pub user_note: String,
    pub net_info: NetInfo,
    #[serde(default)]
    pub discovered: Vec<L2Host>,
    pub gw_ping: PingResult,
    pub wan_ping: PingResult,
    pub dns_local: DnsResult,
    pub dns_cf: DnsResult,
    pub trace: TraceResult,
    pub mtu: MtuResult,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forti_raw: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cisco_ios: Option<CiscoPackResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iface_health: Option<InterfaceHealth>,
    pub gw_loss_pct: String,
    pub wan_loss_pct: String,
    pub target_host: String,
    pub has_gateway: bool,
    pub gateway_used: String,
    #[serde(default)]
    pub gw_jitter_ms: f64,
    #[serde(default)]
    pub wan_jitter_ms: f64,
    pub classification: String,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vendor_suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vendor_summaries: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vendor_findings: Vec<Finding>,
}

impl Results {
    /// Preformat the loss percentages used by the report and web client.
    pub fn format_loss_strings(&mut self) {
        self.gw_loss_pct = format!("{:.0}%", self.gw_ping.loss * 100.0);
        self.wan_loss_pct = format!("{:.0}%", self.wan_ping.loss * 100.0);
    }
}
