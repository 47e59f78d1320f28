//! Path-MTU discovery with Don't-Fragment pings.
//!
//! Probes a fixed descending ladder of ICMP payload sizes with the DF flag
//! set. The first size whose transcript carries no fragmentation-required
//! marker wins; the path MTU is that payload plus 28 bytes of IPv4 + ICMP
//! headers. An all-failing ladder or an unsupported platform reports 0.

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Payload sizes probed, largest first. 1472 + 28 = a clean 1500 path.
const PROBE_SIZES: [u32; 6] = [1472, 1460, 1452, 1400, 1300, 1200];

/// IPv4 header (20) plus ICMP echo header (8).
const HEADER_OVERHEAD: u32 = 28;

const FRAG_MARKERS: [&str; 4] = [
    "needs to be fragmented",
    "packet needs to be fragmented",
    "message too long",
    "frag needed",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MtuResult {
    pub path_mtu: u32,
    pub raw: String,
}

fn fragmentation_required(output: &str) -> bool {
    let lower = output.to_lowercase();
    FRAG_MARKERS.iter().any(|m| lower.contains(m))
}

async fn df_ping(target: &str, size: u32) -> String {
    let mut cmd = Command::new("ping");
    if cfg!(windows) {
        cmd.args(["-f", "-l", &size.to_string(), "-n", "2", target]);
    } else {
        cmd.args(["-M", "do", "-s", &size.to_string(), "-c", "2", target]);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match cmd.output().await {
        Ok(output) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            text
        }
        Err(e) => {
            tracing::debug!("DF ping of {target} with payload {size} failed to run: {e}");
            String::new()
        }
    }
}

/// Walk the DF ladder against `target`.
pub async fn mtu_check(target: &str) -> MtuResult {
    if !cfg!(windows) && !cfg!(target_os = "linux") {
        // No portable DF flag elsewhere; report inconclusive with whatever
        // a plain ping shows.
        let raw = df_ping_plain(target).await;
        return MtuResult { path_mtu: 0, raw };
    }

    for size in PROBE_SIZES {
        let out = df_ping(target, size).await;
        if !fragmentation_required(&out) {
            return MtuResult {
                path_mtu: size + HEADER_OVERHEAD,
                raw: out,
            };
        }
    }
    MtuResult {
        path_mtu: 0,
        raw: "DF tests failed".to_string(),
    }
}

async fn df_ping_plain(target: &str) -> String {
    let mut cmd = Command::new("ping");
    cmd.args(["-c", "2", target])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    match cmd.output().await {
        Ok(output) => String::from_utf8_lossy(&output.stdout).into_owned(),
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_values_map_to_expected_mtus() {
        let mtus: Vec<u32> = PROBE_SIZES.iter().map(|s| s + HEADER_OVERHEAD).collect();
        assert_eq!(mtus, vec![1500, 1488, 1480, 1428, 1328, 1228]);
    }

    #[test]
    fn fragmentation_markers_are_detected_case_insensitively() {
        assert!(fragmentation_required("ping: local error: Message too long, mtu=1400"));
        assert!(fragmentation_required("Packet needs to be fragmented but DF set."));
        assert!(fragmentation_required("From 10.0.0.1 icmp_seq=1 Frag needed and DF set"));
        assert!(!fragmentation_required("64 bytes from 1.1.1.1: time=12 ms"));
    }
}
