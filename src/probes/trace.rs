//! Route tracing via the platform traceroute utility.
//!
//! The raw field is always human-readable: when the utility is missing,
//! exits non-zero, or times out, an explanatory message takes the place of
//! the hop listing.

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceResult {
    pub raw: String,
}

enum RunOutcome {
    Output(String),
    NotFound,
    Failed(String),
    TimedOut,
}

async fn run_trace_command(program: &str, args: &[String], timeout: Duration) -> RunOutcome {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => {
            let mut text = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if text.is_empty() {
                text = String::from_utf8_lossy(&output.stderr).trim().to_string();
            }
            if output.status.success() || !text.is_empty() {
                RunOutcome::Output(text)
            } else {
                RunOutcome::Failed(format!(
                    "{program} exited with {} and produced no output.",
                    output.status
                ))
            }
        }
        Ok(Err(e)) if e.kind() == ErrorKind::NotFound => RunOutcome::NotFound,
        Ok(Err(e)) => RunOutcome::Failed(format!("failed to run {program}: {e}")),
        Err(_) => RunOutcome::TimedOut,
    }
}

/// Trace the route to `target`, preferring the platform's native tool and
/// falling back where one exists (`traceroute` then `tracepath` on Linux).
pub async fn trace(target: &str, max_hops: u32, timeout: Duration) -> TraceResult {
    let max_hops = if max_hops == 0 { 30 } else { max_hops };
    let timeout = if timeout.is_zero() {
        crate::config::DEFAULT_PROBE_TIMEOUT
    } else {
        timeout
    };

    if cfg!(windows) {
        let args = vec![
            "-d".to_string(),
            "-h".to_string(),
            max_hops.to_string(),
            target.to_string(),
        ];
        return match run_trace_command("tracert", &args, timeout).await {
            RunOutcome::Output(raw) => TraceResult { raw },
            RunOutcome::NotFound => TraceResult {
                raw: "tracert command not found on Windows; install the tracert utility to \
                      enable traceroute."
                    .to_string(),
            },
            RunOutcome::Failed(msg) => TraceResult { raw: msg },
            RunOutcome::TimedOut => TraceResult {
                raw: format!("traceroute timed out after {timeout:?}"),
            },
        };
    }

    let traceroute_args = vec![
        "-n".to_string(),
        "-m".to_string(),
        max_hops.to_string(),
        target.to_string(),
    ];
    match run_trace_command("traceroute", &traceroute_args, timeout).await {
        RunOutcome::Output(raw) => TraceResult { raw },
        RunOutcome::Failed(msg) => TraceResult { raw: msg },
        RunOutcome::TimedOut => TraceResult {
            raw: format!("traceroute timed out after {timeout:?}"),
        },
        RunOutcome::NotFound => {
            let tracepath_args = vec!["-n".to_string(), target.to_string()];
            match run_trace_command("tracepath", &tracepath_args, timeout).await {
                RunOutcome::Output(raw) => TraceResult { raw },
                RunOutcome::Failed(msg) => TraceResult { raw: msg },
                RunOutcome::TimedOut => TraceResult {
                    raw: format!("tracepath timed out after {timeout:?}"),
                },
                RunOutcome::NotFound => TraceResult {
                    raw: "Neither traceroute nor tracepath commands were found on this \
                          system. Install traceroute (or tracepath) to enable network \
                          path tracing."
                        .to_string(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_produces_explanatory_text() {
        let args = vec!["-n".to_string(), "192.0.2.1".to_string()];
        match run_trace_command("definitely-not-a-trace-tool", &args, Duration::from_secs(1)).await
        {
            RunOutcome::NotFound => {}
            other => panic!(
                "expected NotFound for a missing binary, got {}",
                match other {
                    RunOutcome::Output(_) => "Output",
                    RunOutcome::Failed(_) => "Failed",
                    RunOutcome::TimedOut => "TimedOut",
                    RunOutcome::NotFound => unreachable!(),
                }
            ),
        }
    }
}
