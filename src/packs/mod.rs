//! Vendor pack selection and the subprocess bridge.
//!
//! Packs are external programs (Python scripts in the stock layout) that
//! collect vendor-specific data over SSH. The bridge hands them a JSON
//! payload on stdin and returns their combined stdout+stderr; it imposes
//! no timeout and does not interpret the reply, both of which are the
//! caller's responsibility.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::scanner::L2Host;

/// Pack key for FortiGate devices.
pub const PACK_FORTIGATE: &str = "fortigate";

/// Pack key for Cisco IOS devices.
pub const PACK_CISCO_IOS: &str = "cisco_ios";

struct PackCandidate {
    key: &'static str,
    matchers: &'static [&'static str],
}

const CANDIDATES: [PackCandidate; 2] = [
    PackCandidate {
        key: PACK_FORTIGATE,
        matchers: &["fortinet"],
    },
    PackCandidate {
        key: PACK_CISCO_IOS,
        matchers: &["cisco"],
    },
];

/// Vendor packs worth suggesting given the discovered layer-2 neighbors.
/// Matching is a case-insensitive substring test on the vendor name, and
/// each pack is suggested at most once.
pub fn packs_for(discovered: &[L2Host]) -> Vec<String> {
    let mut suggested: Vec<String> = Vec::new();
    for host in discovered {
        let vendor = host.vendor.trim().to_lowercase();
        if vendor.is_empty() {
            continue;
        }
        for cand in &CANDIDATES {
            if suggested.iter().any(|s| s == cand.key) {
                continue;
            }
            if cand.matchers.iter().any(|m| vendor.contains(m)) {
                suggested.push(cand.key.to_string());
            }
        }
    }
    suggested
}

/// Script path for a pack key, relative to the working directory.
pub fn pack_script(key: &str) -> std::path::PathBuf {
    Path::new("packs").join("python").join(key).join("parser.py")
}

/// The interpreter used when the operator does not name one.
pub fn default_python_path() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Run one pack: spawn `program script`, write `payload` as JSON to its
/// stdin, and return the combined stdout+stderr bytes.
pub async fn run_pack(
    program: &str,
    script: &Path,
    payload: &serde_json::Value,
) -> Result<Vec<u8>> {
    let input = serde_json::to_vec(payload).context("encode pack payload")?;

    let mut child = Command::new(program)
        .arg(script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawn {program} {}", script.display()))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(&input)
            .await
            .context("write pack payload")?;
        drop(stdin);
    }

    let output = child.wait_with_output().await.context("wait for pack")?;
    let mut combined = output.stdout;
    combined.extend_from_slice(&output.stderr);

    if !output.status.success() {
        anyhow::bail!(
            "pack exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&combined).trim()
        );
    }
    Ok(combined)
}
