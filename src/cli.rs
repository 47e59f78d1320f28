//! Command-line parsing.
//!
//! Flags are parsed by hand: the `--snmp` flag accepts a series of bare
//! `k=v` tokens that have to be stitched back together before normal flag
//! handling, and vendor credentials fall back to environment variables
//! when their flags are absent.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};

use crate::models::VendorCreds;
use crate::snmp::InterfaceQuery;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    pub target: String,
    pub out: String,
    pub skip_python: bool,
    pub serve: bool,
    pub web: bool,
    pub open: bool,
    pub python: String,
    pub auto_packs: bool,
    pub scan: bool,
    pub scan_timeout: Duration,
    pub scan_max_hosts: usize,
    pub scan_cidr_limit: u8,
    pub creds: VendorCreds,
    pub verbose: bool,
    pub bundle: bool,
    pub json: String,
    pub count: u32,
    pub timeout: Duration,
    pub snmp: Option<InterfaceQuery>,
    pub help: bool,
    pub version: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            target: String::new(),
            out: "vne-report.html".to_string(),
            skip_python: false,
            serve: false,
            web: false,
            open: false,
            python: String::new(),
            auto_packs: false,
            scan: false,
            scan_timeout: Duration::from_secs(2),
            scan_max_hosts: 256,
            scan_cidr_limit: 24,
            creds: VendorCreds {
                cisco_port: 22,
                ..Default::default()
            },
            verbose: false,
            bundle: false,
            json: String::new(),
            count: 20,
            timeout: Duration::from_secs(10),
            snmp: None,
            help: false,
            version: false,
        }
    }
}

pub fn version_text() -> String {
    format!("vne-agent {}", env!("CARGO_PKG_VERSION"))
}

pub fn usage_text() -> String {
    format!(
        "{version}
Virtual Network Engineer: on-host network diagnostics

Usage:
  vne-agent [options]

Options:
      --target <HOST>          Target for WAN checks (default 1.1.1.1)
      --out <PATH>             Output HTML report path (default vne-report.html)
      --json <PATH>            Write results as indented JSON to the given path
      --bundle                 Write zipped evidence bundle (vne-evidence-YYYYMMDD-HHMM.zip)
      --count <N>              Ping attempts per host (default 20)
      --timeout <DUR>          Timeout for network probes, e.g. 10s or 500ms (default 10s)
      --scan                   Enable layer-2 discovery ping sweep
      --scan-timeout <DUR>     Timeout per host for layer-2 discovery (default 2s)
      --scan-max-hosts <N>     Maximum layer-2 hosts to probe (default 256)
      --scan-cidr-limit <N>    Smallest CIDR mask to sweep (default 24)
      --snmp \"host=H community=C if=NAME\"
                               Fetch SNMP interface health counters
      --web                    Serve the control plane UI on 127.0.0.1:8080
      --serve                  Serve the generated report over HTTP on :8080
      --open                   Open the report in a browser (requires --serve or --web)
      --skip-python            Skip optional vendor packs
      --auto-packs             Run vendor packs automatically when devices are detected
      --python <PATH>          Python executable for vendor packs
      --forti-host/-user/-pass Credentials for the FortiGate pack
      --cisco-host/-user/-pass/-secret/-port
                               Credentials for the Cisco IOS pack
      --verbose                Enable verbose logging to vne.log
  -h, --help                   Show this help text
  -V, --version                Show version",
        version = version_text()
    )
}

/// Stitch `--snmp host=… community=… if=…` token runs back into a single
/// `--snmp=<joined>` argument so the main loop sees one value.
fn normalize_snmp_args(args: Vec<String>) -> Vec<String> {
    let mut normalized = Vec::with_capacity(args.len());
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--snmp" {
            let mut tokens = Vec::new();
            let mut j = i + 1;
            while j < args.len() && !args[j].starts_with('-') {
                tokens.push(args[j].clone());
                j += 1;
            }
            if !tokens.is_empty() {
                normalized.push(format!("--snmp={}", tokens.join(" ")));
                i = j;
                continue;
            }
        }
        normalized.push(args[i].clone());
        i += 1;
    }
    normalized
}

/// Parse the composite `--snmp` value. All of host, community, and the
/// interface are required; unknown keys are a parse error.
pub fn parse_snmp_query(raw: &str) -> Result<Option<InterfaceQuery>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let mut query = InterfaceQuery::default();
    for field in raw.split_whitespace() {
        let Some((key, value)) = field.split_once('=') else {
            bail!("expected key=value pair, got {field:?}");
        };
        match key.to_lowercase().as_str() {
            "host" => query.host = value.to_string(),
            "community" => query.community = value.to_string(),
            "if" | "iface" | "interface" => query.iface = value.to_string(),
            other => bail!("unknown parameter {other:?}"),
        }
    }
    if query.host.is_empty() || query.community.is_empty() || query.iface.is_empty() {
        bail!("host, community, and if parameters are required");
    }
    Ok(Some(query))
}

fn parse_duration_arg(flag: &str, raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let parsed = if let Some(ms) = raw.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(m) = raw.strip_suffix('m') {
        m.trim().parse::<u64>().ok().map(|v| Duration::from_secs(v * 60))
    } else if let Some(s) = raw.strip_suffix('s') {
        s.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else {
        raw.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.filter(|d| !d.is_zero()).ok_or_else(|| {
        anyhow!("Invalid value for {flag}: {raw:?}. Expected a duration like 10s or 500ms.")
    })
}

fn parse_u32_arg(flag: &str, raw: &str) -> Result<u32> {
    raw.parse::<u32>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| anyhow!("Invalid value for {flag}: {raw:?}. Expected a positive integer."))
}

fn parse_usize_arg(flag: &str, raw: &str) -> Result<usize> {
    raw.parse::<usize>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| anyhow!("Invalid value for {flag}: {raw:?}. Expected a positive integer."))
}

fn parse_u8_arg(flag: &str, raw: &str) -> Result<u8> {
    raw.parse::<u8>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| anyhow!("Invalid value for {flag}: {raw:?}. Expected a positive integer."))
}

fn parse_u16_arg(flag: &str, raw: &str) -> Result<u16> {
    raw.parse::<u16>()
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| anyhow!("Invalid value for {flag}: {raw:?}. Expected a positive integer."))
}

/// Parse CLI arguments (the first item is the program name) with vendor
/// credential fallbacks read from the process environment.
pub fn parse_cli_args<I, S>(args: I) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parse_cli_args_with_env(args, |key| std::env::var(key).ok())
}

/// Like [`parse_cli_args`] but with an injectable environment lookup.
pub fn parse_cli_args_with_env<I, S, E>(args: I, env: E) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    E: Fn(&str) -> Option<String>,
{
    let raw: Vec<String> = args
        .into_iter()
        .skip(1)
        .map(|a| a.as_ref().to_string())
        .collect();

    // Split --flag=value into two tokens after --snmp runs are joined, so
    // the match below only handles the spaced form.
    let mut tokens: Vec<String> = Vec::new();
    for arg in normalize_snmp_args(raw) {
        if let Some(rest) = arg.strip_prefix("--") {
            if let Some((flag, value)) = rest.split_once('=') {
                tokens.push(format!("--{flag}"));
                tokens.push(value.to_string());
                continue;
            }
        }
        tokens.push(arg);
    }

    let mut opts = CliOptions::default();
    let mut flags_set: HashSet<String> = HashSet::new();
    let mut iter = tokens.into_iter().peekable();

    let next_value = |iter: &mut std::iter::Peekable<std::vec::IntoIter<String>>,
                      flag: &str|
     -> Result<String> {
        iter.next()
            .ok_or_else(|| anyhow!("Missing value for {flag}.\n\n{}", usage_text()))
    };

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => opts.help = true,
            "-V" | "--version" => opts.version = true,
            "--target" => opts.target = next_value(&mut iter, "--target")?,
            "--out" => opts.out = next_value(&mut iter, "--out")?,
            "--json" => opts.json = next_value(&mut iter, "--json")?,
            "--python" => opts.python = next_value(&mut iter, "--python")?,
            "--skip-python" => opts.skip_python = true,
            "--auto-packs" => opts.auto_packs = true,
            "--serve" => opts.serve = true,
            "--web" => opts.web = true,
            "--open" => opts.open = true,
            "--scan" => opts.scan = true,
            "--verbose" => opts.verbose = true,
            "--bundle" => opts.bundle = true,
            "--count" => {
                let value = next_value(&mut iter, "--count")?;
                opts.count = parse_u32_arg("--count", &value)?;
            }
            "--timeout" => {
                let value = next_value(&mut iter, "--timeout")?;
                opts.timeout = parse_duration_arg("--timeout", &value)?;
            }
            "--scan-timeout" => {
                let value = next_value(&mut iter, "--scan-timeout")?;
                opts.scan_timeout = parse_duration_arg("--scan-timeout", &value)?;
            }
            "--scan-max-hosts" => {
                let value = next_value(&mut iter, "--scan-max-hosts")?;
                opts.scan_max_hosts = parse_usize_arg("--scan-max-hosts", &value)?;
            }
            "--scan-cidr-limit" => {
                let value = next_value(&mut iter, "--scan-cidr-limit")?;
                opts.scan_cidr_limit = parse_u8_arg("--scan-cidr-limit", &value)?;
            }
            "--snmp" => {
                let value = next_value(&mut iter, "--snmp")?;
                opts.snmp = parse_snmp_query(&value)?;
            }
            "--forti-host" => {
                opts.creds.forti_host = next_value(&mut iter, "--forti-host")?;
                flags_set.insert("forti-host".to_string());
            }
            "--forti-user" => {
                opts.creds.forti_user = next_value(&mut iter, "--forti-user")?;
                flags_set.insert("forti-user".to_string());
            }
            "--forti-pass" => {
                opts.creds.forti_pass = next_value(&mut iter, "--forti-pass")?;
                flags_set.insert("forti-pass".to_string());
            }
            "--cisco-host" => {
                opts.creds.cisco_host = next_value(&mut iter, "--cisco-host")?;
                flags_set.insert("cisco-host".to_string());
            }
            "--cisco-user" => {
                opts.creds.cisco_user = next_value(&mut iter, "--cisco-user")?;
                flags_set.insert("cisco-user".to_string());
            }
            "--cisco-pass" => {
                opts.creds.cisco_pass = next_value(&mut iter, "--cisco-pass")?;
                flags_set.insert("cisco-pass".to_string());
            }
            "--cisco-secret" => {
                opts.creds.cisco_secret = next_value(&mut iter, "--cisco-secret")?;
                flags_set.insert("cisco-secret".to_string());
            }
            "--cisco-port" => {
                let value = next_value(&mut iter, "--cisco-port")?;
                opts.creds.cisco_port = parse_u16_arg("--cisco-port", &value)?;
                flags_set.insert("cisco-port".to_string());
            }
            _ => {
                bail!("Unknown argument: {arg}\n\n{}", usage_text());
            }
        }
    }

    apply_env_fallbacks(&mut opts, &flags_set, env);
    opts.creds.normalize();
    Ok(opts)
}

fn string_flag_or_env<E: Fn(&str) -> Option<String>>(
    current: &str,
    flag_set: bool,
    env: &E,
    keys: &[&str],
) -> String {
    let trimmed = current.trim();
    if flag_set || !trimmed.is_empty() {
        return trimmed.to_string();
    }
    for key in keys {
        if let Some(value) = env(key) {
            let value = value.trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }
    String::new()
}

fn apply_env_fallbacks<E: Fn(&str) -> Option<String>>(
    opts: &mut CliOptions,
    flags_set: &HashSet<String>,
    env: E,
) {
    let creds = &mut opts.creds;
    creds.forti_host = string_flag_or_env(
        &creds.forti_host,
        flags_set.contains("forti-host"),
        &env,
        &["FORTI_HOST", "FORTIGATE_HOST"],
    );
    creds.forti_user = string_flag_or_env(
        &creds.forti_user,
        flags_set.contains("forti-user"),
        &env,
        &["FORTI_USER", "FORTIGATE_USER"],
    );
    creds.forti_pass = string_flag_or_env(
        &creds.forti_pass,
        flags_set.contains("forti-pass"),
        &env,
        &[
            "FORTI_PASS",
            "FORTI_PASSWORD",
            "FORTIGATE_PASS",
            "FORTIGATE_PASSWORD",
        ],
    );
    creds.cisco_host = string_flag_or_env(
        &creds.cisco_host,
        flags_set.contains("cisco-host"),
        &env,
        &["CISCO_HOST"],
    );
    creds.cisco_user = string_flag_or_env(
        &creds.cisco_user,
        flags_set.contains("cisco-user"),
        &env,
        &["CISCO_USER"],
    );
    creds.cisco_pass = string_flag_or_env(
        &creds.cisco_pass,
        flags_set.contains("cisco-pass"),
        &env,
        &["CISCO_PASS", "CISCO_PASSWORD"],
    );
    creds.cisco_secret = string_flag_or_env(
        &creds.cisco_secret,
        flags_set.contains("cisco-secret"),
        &env,
        &["CISCO_SECRET"],
    );
    if !flags_set.contains("cisco-port") {
        if let Some(value) = env("CISCO_PORT") {
            if let Ok(port) = value.trim().parse::<u16>() {
                if port > 0 {
                    opts.creds.cisco_port = port;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn parse(args: &[&str]) -> Result<CliOptions> {
        let mut full = vec!["vne-agent"];
        full.extend_from_slice(args);
        parse_cli_args_with_env(full, no_env)
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let opts = parse(&[]).expect("empty args should parse");
        assert_eq!(opts.count, 20);
        assert_eq!(opts.timeout, Duration::from_secs(10));
        assert_eq!(opts.scan_timeout, Duration::from_secs(2));
        assert_eq!(opts.scan_max_hosts, 256);
        assert_eq!(opts.scan_cidr_limit, 24);
        assert_eq!(opts.creds.cisco_port, 22);
        assert_eq!(opts.out, "vne-report.html");
        assert!(!opts.scan);
        assert!(opts.snmp.is_none());
    }

    #[test]
    fn parses_equals_and_spaced_flag_forms() {
        let a = parse(&["--target", "8.8.8.8", "--count", "5"]).unwrap();
        let b = parse(&["--target=8.8.8.8", "--count=5"]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.target, "8.8.8.8");
        assert_eq!(a.count, 5);
    }

    #[test]
    fn snmp_tokens_are_stitched_into_one_query() {
        let opts = parse(&[
            "--snmp",
            "host=10.0.0.1",
            "community=public",
            "if=Gig0/1",
            "--scan",
        ])
        .unwrap();
        assert_eq!(
            opts.snmp,
            Some(InterfaceQuery {
                host: "10.0.0.1".to_string(),
                community: "public".to_string(),
                iface: "Gig0/1".to_string(),
            })
        );
        assert!(opts.scan);
    }

    #[test]
    fn snmp_quoted_form_parses_identically() {
        let opts = parse(&["--snmp=host=10.0.0.1 community=public iface=eth0"]).unwrap();
        assert_eq!(opts.snmp.unwrap().iface, "eth0");
    }

    #[test]
    fn snmp_missing_keys_is_a_parse_error() {
        let err = parse(&["--snmp", "host=10.0.0.1", "community=public"])
            .expect_err("missing if key should fail");
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn snmp_unknown_key_is_a_parse_error() {
        let err = parse(&["--snmp", "host=1.2.3.4", "community=c", "port=161"])
            .expect_err("unknown key should fail");
        assert!(err.to_string().contains("unknown parameter"));
    }

    #[test]
    fn snmp_bare_word_is_a_parse_error() {
        let err =
            parse(&["--snmp", "banana"]).expect_err("non key=value token should fail");
        assert!(err.to_string().contains("key=value"));
    }

    #[test]
    fn durations_accept_seconds_and_milliseconds() {
        let opts = parse(&["--timeout", "500ms", "--scan-timeout", "3s"]).unwrap();
        assert_eq!(opts.timeout, Duration::from_millis(500));
        assert_eq!(opts.scan_timeout, Duration::from_secs(3));
        let bare = parse(&["--timeout", "7"]).unwrap();
        assert_eq!(bare.timeout, Duration::from_secs(7));
    }

    #[test]
    fn invalid_duration_is_rejected() {
        assert!(parse(&["--timeout", "soon"]).is_err());
        assert!(parse(&["--timeout", "0s"]).is_err());
    }

    #[test]
    fn unknown_argument_is_rejected_with_usage() {
        let err = parse(&["--frobnicate"]).expect_err("unknown flag should fail");
        assert!(err.to_string().contains("Unknown argument"));
        assert!(err.to_string().contains("Usage:"));
    }

    #[test]
    fn vendor_credentials_fall_back_to_environment() {
        let env = |key: &str| match key {
            "FORTIGATE_HOST" => Some("fw.example".to_string()),
            "FORTI_USER" => Some("admin".to_string()),
            "FORTI_PASSWORD" => Some("hunter2".to_string()),
            "CISCO_PORT" => Some("2222".to_string()),
            _ => None,
        };
        let opts = parse_cli_args_with_env(["vne-agent"], env).unwrap();
        assert_eq!(opts.creds.forti_host, "fw.example");
        assert_eq!(opts.creds.forti_user, "admin");
        assert_eq!(opts.creds.forti_pass, "hunter2");
        assert_eq!(opts.creds.cisco_port, 2222);
        assert!(opts.creds.has_forti());
    }

    #[test]
    fn explicit_flags_beat_environment_values() {
        let env = |key: &str| match key {
            "FORTI_HOST" => Some("env-host".to_string()),
            _ => None,
        };
        let opts =
            parse_cli_args_with_env(["vne-agent", "--forti-host", "flag-host"], env).unwrap();
        assert_eq!(opts.creds.forti_host, "flag-host");
    }

    #[test]
    fn help_and_version_flags_are_recognized() {
        assert!(parse(&["--help"]).unwrap().help);
        assert!(parse(&["-V"]).unwrap().version);
    }
}
