//! Summary rendering and the evidence bundle.
//!
//! The HTML here is a deliberately small self-contained summary; the rich
//! templated report is produced by an external tool. The bundle is a zip
//! of the summary, the full JSON record, and the raw probe transcripts.

use std::io::{Cursor, Write};

use anyhow::{Context, Result};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::models::Results;

/// Bundle filename for a run, stamped to the minute.
pub fn bundle_filename(res: &Results) -> String {
    format!("vne-evidence-{}.zip", res.when.format("%Y%m%d-%H%M"))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// A single-page HTML summary of the run.
pub fn render_html(res: &Results) -> String {
    let mut findings_html = String::new();
    for f in &res.findings {
        findings_html.push_str(&format!(
            "<li class=\"{}\">[{}] {}</li>\n",
            escape(&f.severity),
            escape(&f.severity),
            escape(&f.message)
        ));
    }
    if findings_html.is_empty() {
        findings_html.push_str("<li>No findings.</li>\n");
    }

    let mut reasons_html = String::new();
    for r in &res.reasons {
        reasons_html.push_str(&format!("<li>{}</li>\n", escape(r)));
    }

    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>VNE diagnostics report</title>
<style>
body {{ font-family: sans-serif; margin: 2rem; }}
h1 {{ font-size: 1.3rem; }}
table {{ border-collapse: collapse; }}
td, th {{ border: 1px solid #ccc; padding: 4px 10px; text-align: left; }}
li.high {{ color: #b00020; }}
li.medium {{ color: #9a6700; }}
pre {{ background: #f6f6f6; padding: 8px; overflow-x: auto; }}
</style>
</head>
<body>
<h1>VNE diagnostics - {when}</h1>
<p><strong>Classification:</strong> {classification}</p>
<ul>{reasons}</ul>
<table>
<tr><th>Check</th><th>Value</th></tr>
<tr><td>Target</td><td>{target}</td></tr>
<tr><td>Gateway</td><td>{gateway}</td></tr>
<tr><td>Gateway loss / jitter</td><td>{gw_loss} / {gw_jitter:.1} ms</td></tr>
<tr><td>WAN loss / jitter</td><td>{wan_loss} / {wan_jitter:.1} ms</td></tr>
<tr><td>Local DNS avg</td><td>{dns_local:.1} ms</td></tr>
<tr><td>1.1.1.1 DNS avg</td><td>{dns_cf:.1} ms</td></tr>
<tr><td>Path MTU</td><td>{mtu}</td></tr>
<tr><td>L2 neighbors</td><td>{neighbors}</td></tr>
</table>
<h2>Findings</h2>
<ul>{findings}</ul>
<h2>Traceroute</h2>
<pre>{trace}</pre>
</body>
</html>
"#,
        when = res.when.format("%Y-%m-%d %H:%M:%S UTC"),
        classification = escape(&res.classification),
        reasons = reasons_html,
        target = escape(&res.target_host),
        gateway = escape(&res.gateway_used),
        gw_loss = escape(&res.gw_loss_pct),
        gw_jitter = res.gw_jitter_ms,
        wan_loss = escape(&res.wan_loss_pct),
        wan_jitter = res.wan_jitter_ms,
        dns_local = res.dns_local.avg_ms,
        dns_cf = res.dns_cf.avg_ms,
        mtu = res.mtu.path_mtu,
        neighbors = res.discovered.len(),
        findings = findings_html,
        trace = escape(&res.trace.raw),
    )
}

/// Build the evidence zip in memory: the HTML summary, the full pretty
/// JSON record, and the raw probe transcripts.
pub fn bundle_bytes(res: &Results) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let entries: [(&str, Vec<u8>); 5] = [
        ("report.html", render_html(res).into_bytes()),
        (
            "summary.json",
            serde_json::to_vec_pretty(res).context("encode summary.json")?,
        ),
        ("gateway-ping.txt", res.gw_ping.raw.clone().into_bytes()),
        ("wan-ping.txt", res.wan_ping.raw.clone().into_bytes()),
        ("traceroute.txt", res.trace.raw.clone().into_bytes()),
    ];

    for (name, data) in entries {
        zip.start_file(name, options)
            .with_context(|| format!("start bundle entry {name}"))?;
        zip.write_all(&data)
            .with_context(|| format!("write bundle entry {name}"))?;
    }

    let cursor = zip.finish().context("finish bundle")?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn bundle_filename_is_stamped_to_the_minute() {
        let mut res = Results::default();
        res.when = chrono::Utc.with_ymd_and_hms(2025, 3, 9, 14, 30, 59).unwrap();
        assert_eq!(bundle_filename(&res), "vne-evidence-20250309-1430.zip");
    }

    #[test]
    fn html_escapes_probe_output() {
        let mut res = Results::default();
        res.trace.raw = "<script>alert(1)</script>".to_string();
        let html = render_html(&res);
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
    }

    #[test]
    fn bundle_is_a_zip_with_all_entries() {
        let res = Results::default();
        let bytes = bundle_bytes(&res).unwrap();
        // Zip local file header magic.
        assert_eq!(&bytes[..4], b"PK\x03\x04");
        let reader = Cursor::new(bytes);
        let mut archive = zip::ZipArchive::new(reader).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "report.html",
                "summary.json",
                "gateway-ping.txt",
                "wan-ping.txt",
                "traceroute.txt"
            ]
        );
    }
}
