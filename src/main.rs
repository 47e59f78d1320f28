use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use vne_agent::cli::{self, CliOptions};
use vne_agent::pipeline::{Params, ProgressEvent, ProgressHook, RunOptions};
use vne_agent::{history, logging, pipeline, report, server};

#[tokio::main]
async fn main() {
    if let Err(e) = run_main().await {
        eprintln!("vne-agent: {e:#}");
        std::process::exit(1);
    }
}

async fn run_main() -> Result<()> {
    let opts = cli::parse_cli_args(std::env::args())?;
    if opts.help {
        println!("{}", cli::usage_text());
        return Ok(());
    }
    if opts.version {
        println!("{}", cli::version_text());
        return Ok(());
    }

    let _log_guard = logging::init(opts.verbose)?;

    if opts.web {
        return run_web(opts).await;
    }
    run_once(opts).await
}

fn run_template(opts: &CliOptions) -> RunOptions {
    RunOptions {
        params: Params {
            count: opts.count,
            timeout: opts.timeout,
            scan: opts.scan,
            scan_timeout: opts.scan_timeout,
            scan_max_hosts: opts.scan_max_hosts,
            scan_cidr_limit: opts.scan_cidr_limit,
            target_host: opts.target.clone(),
            ..Default::default()
        },
        user_note: String::new(),
        skip_python: opts.skip_python,
        auto_packs: opts.auto_packs,
        python_path: opts.python.clone(),
        creds: opts.creds.clone(),
        snmp: opts.snmp.clone(),
    }
}

async fn run_web(opts: CliOptions) -> Result<()> {
    let template = run_template(&opts);
    if opts.open {
        let url = format!("http://{}/", vne_agent::config::WEB_BIND_ADDR);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            if let Err(e) = open_in_browser(&url) {
                eprintln!("Unable to open browser: {e}");
            }
        });
    }
    server::serve(template, history::Store::default()).await
}

async fn run_once(opts: CliOptions) -> Result<()> {
    println!("== Virtual Network Engineer ==");

    let progress: ProgressHook = Arc::new(|event| {
        if let ProgressEvent::Step { msg } = event {
            println!("{msg}");
        }
    });

    let mut run_opts = run_template(&opts);
    run_opts.params.progress = Some(progress);

    let res = pipeline::run_full(run_opts).await?;

    std::fs::write(&opts.out, report::render_html(&res))
        .with_context(|| format!("write report to {}", opts.out))?;
    println!("\n✅ Done. Report written to: {}", opts.out);
    tracing::info!("report written to {}", opts.out);

    if !opts.json.is_empty() {
        if let Some(dir) = Path::new(&opts.json).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("create directory {}", dir.display()))?;
            }
        }
        let data = serde_json::to_vec_pretty(&res).context("encode JSON results")?;
        std::fs::write(&opts.json, data)
            .with_context(|| format!("write JSON results to {}", opts.json))?;
        println!("→ JSON results written to: {}", opts.json);
    }

    if opts.bundle {
        let name = report::bundle_filename(&res);
        let bytes = report::bundle_bytes(&res)?;
        std::fs::write(&name, bytes).with_context(|| format!("write bundle {name}"))?;
        println!("→ Evidence bundle written to: {name}");
    }

    if opts.serve {
        let url = format!(
            "http://{}/{}",
            vne_agent::config::WEB_BIND_ADDR,
            opts.out.trim_start_matches("./")
        );
        println!("Serving report at {url}");
        if opts.open {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                if let Err(e) = open_in_browser(&url) {
                    eprintln!("Unable to open report: {e}");
                }
            });
        }
        return server::serve_report_dir().await;
    } else if opts.open {
        println!("→ --open requires --serve; ignoring.");
    }

    Ok(())
}

fn open_in_browser(target: &str) -> std::io::Result<()> {
    let mut cmd = if cfg!(windows) {
        let mut c = std::process::Command::new("cmd");
        c.args(["/c", "start", "", target]);
        c
    } else if cfg!(target_os = "macos") {
        let mut c = std::process::Command::new("open");
        c.arg(target);
        c
    } else {
        let mut c = std::process::Command::new("xdg-open");
        c.arg(target);
        c
    };
    cmd.spawn().map(|_| ())
}
