//! Timed DNS lookups against explicit resolvers.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use serde::{Deserialize, Serialize};

/// Mean lookup latency across the resolvers that answered, plus the union
/// of addresses they returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsResult {
    pub avg_ms: f64,
    #[serde(default)]
    pub answers: Vec<String>,
}

/// Resolve `host` once per resolver and average the elapsed time of the
/// successful lookups. An empty resolver string means the system default
/// configuration; an empty list behaves as a single system-default lookup.
/// One shared deadline bounds the whole set; resolvers reached after the
/// deadline expires are skipped.
pub async fn dns_lookup_timed(host: &str, resolvers: &[String], timeout: Duration) -> DnsResult {
    let timeout = if timeout.is_zero() {
        crate::config::DEFAULT_PROBE_TIMEOUT
    } else {
        timeout
    };
    let deadline = Instant::now() + timeout;

    let default_set = [String::new()];
    let resolvers: &[String] = if resolvers.is_empty() {
        &default_set
    } else {
        resolvers
    };

    let mut total_ms = 0.0;
    let mut answered = 0usize;
    let mut answers: Vec<String> = Vec::new();

    for resolver in resolvers {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }

        let Some(r) = build_resolver(resolver.trim()) else {
            tracing::debug!("skipping unparseable resolver address {resolver:?}");
            continue;
        };

        let start = Instant::now();
        match tokio::time::timeout(remaining, r.lookup_ip(host)).await {
            Ok(Ok(lookup)) => {
                total_ms += start.elapsed().as_secs_f64() * 1000.0;
                answered += 1;
                for ip in lookup.iter() {
                    let rendered = ip.to_string();
                    if !answers.contains(&rendered) {
                        answers.push(rendered);
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::debug!("lookup of {host} via {resolver:?} failed: {e}");
            }
            Err(_) => {
                tracing::debug!("lookup of {host} via {resolver:?} hit the shared deadline");
            }
        }
    }

    let avg_ms = if answered > 0 {
        total_ms / answered as f64
    } else {
        0.0
    };

    DnsResult { avg_ms, answers }
}

/// A resolver dialing port 53 on the given address, or the system default
/// for an empty address. Returns None when the address cannot be parsed.
fn build_resolver(addr: &str) -> Option<TokioAsyncResolver> {
    if addr.is_empty() {
        return match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(r) => Some(r),
            Err(e) => {
                tracing::debug!("system resolver configuration unavailable: {e}");
                None
            }
        };
    }
    let ip: IpAddr = addr.parse().ok()?;
    let group = NameServerConfigGroup::from_ips_clear(&[ip], 53, true);
    let config = ResolverConfig::from_parts(None, vec![], group);
    Some(TokioAsyncResolver::tokio(config, ResolverOpts::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_reports_zero_latency() {
        let res = DnsResult::default();
        assert_eq!(res.avg_ms, 0.0);
        assert!(res.answers.is_empty());
    }

    #[test]
    fn resolver_builder_rejects_garbage_addresses() {
        assert!(build_resolver("not-an-ip").is_none());
        assert!(build_resolver("10.0.0.1").is_some());
    }

    #[tokio::test]
    async fn expired_deadline_skips_all_resolvers() {
        let resolvers = vec!["192.0.2.1".to_string()];
        let res = dns_lookup_timed("example.com", &resolvers, Duration::from_nanos(1)).await;
        assert_eq!(res.avg_ms, 0.0);
        assert!(res.answers.is_empty());
    }
}
