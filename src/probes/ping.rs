//! ICMP reachability probe built on the platform ping utility.
//!
//! The probe shells out to `ping`, applies a wall-clock deadline, and
//! parses the transcript into loss, average, p95, and jitter. Parsing is
//! deliberately tolerant: transcripts differ across Windows, Linux, and
//! BSD ping implementations, so every value is best-effort and a probe
//! failure still yields a usable (possibly zeroed) result.

use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::anyhow;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Parsed statistics for one ping run. `loss` is scaled to [0,1].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingResult {
    pub avg_ms: f64,
    pub p95_ms: f64,
    pub jitter_ms: f64,
    pub loss: f64,
    pub raw: String,
}

fn loss_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)%\s*loss").unwrap())
}

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)%").unwrap())
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)time[=<]?\s*([0-9]+(?:\.[0-9]+)?)\s*ms").unwrap())
}

/// Ping `target` `count` times with a hard deadline. The parsed result is
/// always returned; a failure (non-zero exit, missing binary, timeout) is
/// reported alongside so callers can log it without losing the transcript.
pub async fn ping_host(
    target: &str,
    count: u32,
    timeout: Duration,
) -> (PingResult, Option<anyhow::Error>) {
    let count = if count == 0 { crate::config::DEFAULT_PING_COUNT } else { count };
    let timeout = if timeout.is_zero() {
        crate::config::DEFAULT_PROBE_TIMEOUT
    } else {
        timeout
    };

    let mut cmd = Command::new("ping");
    if cfg!(windows) {
        cmd.args(["-n", &count.to_string(), target]);
    } else {
        cmd.args(["-c", &count.to_string(), "-n", target]);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let (raw, err) = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            if text.is_empty() {
                text = String::from_utf8_lossy(&output.stderr).into_owned();
            }
            if output.status.success() {
                (text, None)
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                (
                    text,
                    Some(anyhow!(
                        "ping exited with {}: {}",
                        output.status,
                        stderr.trim()
                    )),
                )
            }
        }
        Ok(Err(e)) => (String::new(), Some(anyhow!("failed to run ping: {e}"))),
        Err(_) => (
            String::new(),
            Some(anyhow!("ping timed out after {timeout:?}")),
        ),
    };

    (parse_ping(&raw), err)
}

/// Parse a ping transcript into statistics. Public to the crate so the
/// sweep and tests can feed captured transcripts through it.
pub(crate) fn parse_ping(out: &str) -> PingResult {
    let mut result = PingResult {
        raw: out.to_string(),
        ..Default::default()
    };
    let samples = extract_samples(out);
    let mut parsed_loss = false;

    for line in out.lines() {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();

        if !parsed_loss {
            if let Some(caps) = loss_re().captures(&lower) {
                if let Ok(v) = caps[1].parse::<f64>() {
                    result.loss = v / 100.0;
                    parsed_loss = true;
                }
            } else if lower.contains("loss") {
                if let Some(caps) = percent_re().captures(&lower) {
                    if let Ok(v) = caps[1].parse::<f64>() {
                        result.loss = v / 100.0;
                        parsed_loss = true;
                    }
                }
            }
        }

        if lower.contains("min/avg") || lower.contains("min =") || lower.contains("round-trip") {
            result.avg_ms = extract_summary_avg(trimmed);
        } else if lower.starts_with("average =") {
            if let Some(avg) = number_between(trimmed, "=", "ms") {
                result.avg_ms = avg;
            }
        }
    }

    if result.avg_ms == 0.0 && !samples.is_empty() {
        result.avg_ms = mean(&samples);
    }
    result.p95_ms = percentile95(&samples);
    result.jitter_ms = jitter(&samples);

    result
}

/// Pull the avg out of a `min/avg/max` style summary line.
fn extract_summary_avg(line: &str) -> f64 {
    let Some(stats) = line.rsplit('=').next() else {
        return 0.0;
    };
    let stats = stats
        .trim()
        .trim_end_matches("milliseconds")
        .trim_end_matches("ms")
        .trim();
    let pieces: Vec<&str> = stats.split('/').collect();
    if pieces.len() >= 2 {
        if let Ok(avg) = pieces[1].trim().parse::<f64>() {
            return avg;
        }
    }
    0.0
}

fn number_between(line: &str, left: &str, right: &str) -> Option<f64> {
    let start = line.find(left)? + left.len();
    let rest = &line[start..];
    let end = rest.find(right).unwrap_or(rest.len());
    rest[..end].trim().parse::<f64>().ok()
}

fn extract_samples(raw: &str) -> Vec<f64> {
    time_re()
        .captures_iter(raw)
        .filter_map(|c| c[1].parse::<f64>().ok())
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// ceil(0.95*n)-1 index into the sorted samples, clamped to the ends.
fn percentile95(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let idx = ((0.95 * sorted.len() as f64).ceil() as usize)
        .saturating_sub(1)
        .min(sorted.len() - 1);
    sorted[idx]
}

/// Standard deviation of successive RTT deltas; 0 with fewer than two
/// samples.
fn jitter(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let deltas: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
    let variance = deltas.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / deltas.len() as f64;
    variance.max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX_TRANSCRIPT: &str = "\
PING 1.1.1.1 (1.1.1.1) 56(84) bytes of data.
64 bytes from 1.1.1.1: icmp_seq=1 ttl=58 time=12.3 ms
64 bytes from 1.1.1.1: icmp_seq=2 ttl=58 time=14.1 ms
64 bytes from 1.1.1.1: icmp_seq=3 ttl=58 time=11.8 ms
64 bytes from 1.1.1.1: icmp_seq=4 ttl=58 time=20.5 ms

--- 1.1.1.1 ping statistics ---
4 packets transmitted, 4 received, 0% packet loss, time 3004ms
rtt min/avg/max/mdev = 11.800/14.675/20.500/3.471 ms";

    const WINDOWS_TRANSCRIPT: &str = "\
Pinging 1.1.1.1 with 32 bytes of data:
Reply from 1.1.1.1: bytes=32 time=9ms TTL=58
Reply from 1.1.1.1: bytes=32 time=11ms TTL=58
Reply from 1.1.1.1: bytes=32 time=10ms TTL=58
Request timed out.

Ping statistics for 1.1.1.1:
    Packets: Sent = 4, Received = 3, Lost = 1 (25% loss),
Approximate round trip times in milli-seconds:
    Minimum = 9ms, Maximum = 11ms, Average = 10ms";

    #[test]
    fn parses_linux_summary_avg_and_loss() {
        let res = parse_ping(LINUX_TRANSCRIPT);
        assert_eq!(res.loss, 0.0);
        assert!((res.avg_ms - 14.675).abs() < 1e-9);
        assert!((res.p95_ms - 20.5).abs() < 1e-9);
    }

    #[test]
    fn parses_windows_average_and_loss() {
        let res = parse_ping(WINDOWS_TRANSCRIPT);
        assert!((res.loss - 0.25).abs() < 1e-9);
        assert!((res.avg_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn loss_is_scaled_to_unit_interval() {
        let res = parse_ping("4 packets transmitted, 2 received, 50% packet loss");
        assert!((res.loss - 0.5).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_sample_mean_without_summary_line() {
        let res = parse_ping("time=10.0 ms\ntime=20.0 ms\n");
        assert!((res.avg_ms - 15.0).abs() < 1e-9);
        assert!((res.p95_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn p95_is_at_least_avg_for_sample_derived_stats() {
        let res = parse_ping("time=1 ms\ntime=2 ms\ntime=3 ms\ntime=4 ms\ntime=5 ms\n");
        assert!(res.p95_ms >= res.avg_ms);
    }

    #[test]
    fn jitter_is_stddev_of_successive_deltas() {
        // Deltas are 10 and -10; mean 0, variance 100, stddev 10.
        let res = parse_ping("time=10 ms\ntime=20 ms\ntime=10 ms\n");
        assert!((res.jitter_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn jitter_is_zero_with_fewer_than_two_samples() {
        assert_eq!(parse_ping("time=10 ms\n").jitter_ms, 0.0);
        assert_eq!(parse_ping("no samples here").jitter_ms, 0.0);
    }

    #[test]
    fn empty_transcript_yields_zeroed_result() {
        let res = parse_ping("");
        assert_eq!(res.avg_ms, 0.0);
        assert_eq!(res.p95_ms, 0.0);
        assert_eq!(res.jitter_ms, 0.0);
        assert_eq!(res.loss, 0.0);
    }

    #[test]
    fn time_less_than_marker_is_counted_as_sample() {
        let res = parse_ping("Reply from 10.0.0.1: bytes=32 time<1ms TTL=128");
        assert!((res.avg_ms - 1.0).abs() < 1e-9);
    }
}
