//! HTTP control plane.
//!
//! One process-wide router, no auth, bound to localhost. A single run may
//! be in flight at a time (`running` under the state mutex); progress is
//! broadcast to SSE subscribers through per-subscriber channels that drop
//! events rather than stall the pipeline, with a bounded replay log for
//! late joiners. A finished run can be extended once credentials arrive
//! by the vendor follow-up, which rebuilds the findings from the snapshot
//! taken at first completion and re-persists the run.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use crate::config::{MAX_STREAM_LOG, RUN_DEADLINE, SSE_CHANNEL_CAPACITY, WEB_BIND_ADDR};
use crate::history;
use crate::models::{Finding, Results, VendorCreds};
use crate::packs;
use crate::pipeline::{self, ProgressEvent, ProgressHook, RunOptions};
use crate::report;

const INDEX_HTML: &str = include_str!("static/index.html");
const APP_JS: &str = include_str!("static/app.js");

/// Progress percentage per phase. The phase name is the source of truth;
/// this table is only its projection, kept in one place so percentages
/// stay monotonic when phases change.
pub(crate) fn phase_percent(name: &str) -> Option<f64> {
    Some(match name {
        "idle" => 0.0,
        "starting" => 5.0,
        "netinfo" => 12.0,
        "l2-scan" => 25.0,
        "gateway" => 38.0,
        "dns" => 52.0,
        "wan" => 68.0,
        "traceroute" => 80.0,
        "mtu" => 88.0,
        "python-packs" => 94.0,
        "snmp" => 97.0,
        "finalizing" => 99.0,
        "finished" => 100.0,
        "error" => 100.0,
        _ => return None,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub scan: bool,
    #[serde(default)]
    pub target: String,
}

#[derive(Debug, Clone, Serialize)]
struct StatusBody {
    phase: String,
    percent: f64,
    message: String,
}

#[derive(Debug, Clone)]
pub(crate) struct StreamEvent {
    event: &'static str,
    data: String,
}

#[derive(Default)]
pub(crate) struct RunState {
    pub phase: String,
    pub percent: f64,
    pub message: String,
    pub running: bool,
    pub results: Option<Results>,
    pub log: Vec<StreamEvent>,
    pub base_findings: Vec<Finding>,
    pub history_id: String,
}

/// Shared state behind the control plane.
pub struct AppState {
    pub(crate) state: Mutex<RunState>,
    subs: Mutex<HashMap<u64, mpsc::Sender<StreamEvent>>>,
    next_sub_id: AtomicU64,
    hist: history::Store,
    /// Template for runs launched over HTTP; scan/target come from the
    /// request, progress and cancellation are attached per run.
    run_template: RunOptions,
}

impl AppState {
    pub fn new(run_template: RunOptions, hist: history::Store) -> Arc<Self> {
        let state = Arc::new(Self {
            state: Mutex::new(RunState {
                phase: "idle".to_string(),
                percent: 0.0,
                message: "Ready".to_string(),
                ..Default::default()
            }),
            subs: Mutex::new(HashMap::new()),
            next_sub_id: AtomicU64::new(1),
            hist,
            run_template,
        });
        state.record_phase("idle", "Ready", false);
        state
    }

    fn add_subscriber(&self, tx: mpsc::Sender<StreamEvent>) -> u64 {
        let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);
        self.subs.lock().unwrap().insert(id, tx);
        id
    }

    pub(crate) fn record_phase(&self, name: &str, message: &str, reset: bool) {
        let (percent, current_message) = {
            let mut st = self.state.lock().unwrap();
            if reset {
                st.log.clear();
            }
            st.phase = name.to_string();
            if let Some(pct) = phase_percent(name) {
                st.percent = pct;
            }
            if !message.is_empty() {
                st.message = message.to_string();
            }
            (st.percent, st.message.clone())
        };

        let mut payload = serde_json::json!({
            "name": name,
            "percent": percent,
        });
        if !current_message.is_empty() {
            payload["message"] = serde_json::Value::String(current_message);
        }
        if reset {
            payload["reset"] = serde_json::Value::Bool(true);
        }
        self.broadcast("phase", &payload, reset);
    }

    pub(crate) fn record_step(&self, msg: &str) {
        if msg.is_empty() {
            return;
        }
        self.state.lock().unwrap().message = msg.to_string();
        self.broadcast("step", &serde_json::json!({ "msg": msg }), false);
    }

    pub(crate) fn record_done(&self, status: &str, message: &str) {
        let mut payload = serde_json::json!({ "status": status });
        if !message.is_empty() {
            payload["message"] = serde_json::Value::String(message.to_string());
        }
        self.broadcast("done", &payload, false);
    }

    /// Append to the bounded replay log, then fan out. A subscriber whose
    /// channel is full loses the event; a disconnected subscriber is
    /// dropped from the registry.
    fn broadcast(&self, event: &'static str, payload: &serde_json::Value, reset: bool) {
        let Ok(data) = serde_json::to_string(payload) else {
            return;
        };
        let evt = StreamEvent { event, data };

        {
            let mut st = self.state.lock().unwrap();
            if reset {
                st.log.clear();
            }
            st.log.push(evt.clone());
            if st.log.len() > MAX_STREAM_LOG {
                let excess = st.log.len() - MAX_STREAM_LOG;
                st.log.drain(..excess);
            }
        }

        let mut subs = self.subs.lock().unwrap();
        subs.retain(|_, tx| match tx.try_send(evt.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    fn progress_hook(self: &Arc<Self>) -> ProgressHook {
        let state = Arc::clone(self);
        Arc::new(move |event| match event {
            ProgressEvent::Phase { name } => state.record_phase(&name, "", false),
            ProgressEvent::Step { msg } => state.record_step(&msg),
        })
    }
}

/// Build the control-plane router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/static/app.js", get(handle_app_js))
        .route("/api/start", post(handle_start))
        .route("/api/status", get(handle_status))
        .route("/api/results", get(handle_results))
        .route("/api/bundle", get(handle_bundle))
        .route("/api/vendor", post(handle_vendor))
        .route("/api/stream", get(handle_stream))
        .route("/api/history", get(handle_history))
        .route("/api/run/:id", get(handle_run))
        .with_state(state)
}

/// Serve the control plane on localhost until the process exits.
pub async fn serve(run_template: RunOptions, hist: history::Store) -> Result<()> {
    let state = AppState::new(run_template, hist);
    let addr: SocketAddr = WEB_BIND_ADDR.parse().context("parse bind address")?;
    tracing::info!("control plane listening on http://{addr}");
    axum::Server::bind(&addr)
        .serve(router(state).into_make_service())
        .await
        .context("serve control plane")
}

/// Serve the working directory read-only on the control-plane port. Used
/// by one-shot runs that want the written report browsable.
pub async fn serve_report_dir() -> Result<()> {
    let app = Router::new().fallback(get(handle_report_file));
    let addr: SocketAddr = WEB_BIND_ADDR.parse().context("parse bind address")?;
    tracing::info!("serving report directory on http://{addr}");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .context("serve report directory")
}

fn content_type_for(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("html") => "text/html; charset=utf-8",
        Some("json") => "application/json",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("zip") => "application/zip",
        Some("txt") | Some("log") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

async fn handle_report_file(uri: axum::http::Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    if path.is_empty()
        || path.split('/').any(|part| part.is_empty() || part == "." || part == "..")
    {
        return StatusCode::NOT_FOUND.into_response();
    }
    match tokio::fs::read(path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, content_type_for(path))],
            bytes,
        )
            .into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn handle_app_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], APP_JS)
}

async fn handle_start(
    State(app): State<Arc<AppState>>,
    Json(mut req): Json<RunRequest>,
) -> Response {
    req.target = req.target.trim().to_string();
    if req.target.is_empty() {
        req.target = crate::config::DEFAULT_TARGET.to_string();
    }

    {
        let mut st = app.state.lock().unwrap();
        if st.running {
            return (StatusCode::CONFLICT, "run already in progress").into_response();
        }
        st.running = true;
        st.phase = "starting".to_string();
        st.percent = phase_percent("starting").unwrap_or(5.0);
        st.message = "Starting diagnostics…".to_string();
        st.results = None;
        st.log.clear();
        st.history_id.clear();
    }

    app.record_phase("starting", "Starting diagnostics…", true);
    app.record_step("Starting diagnostics…");

    let state = Arc::clone(&app);
    tokio::spawn(async move { execute(state, req).await });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "started" })),
    )
        .into_response()
}

async fn handle_status(State(app): State<Arc<AppState>>) -> Json<StatusBody> {
    let st = app.state.lock().unwrap();
    Json(StatusBody {
        phase: st.phase.clone(),
        percent: st.percent,
        message: st.message.clone(),
    })
}

async fn handle_results(State(app): State<Arc<AppState>>) -> Response {
    let (results, phase, history_id) = {
        let st = app.state.lock().unwrap();
        (st.results.clone(), st.phase.clone(), st.history_id.clone())
    };
    let Some(results) = results else {
        return StatusCode::NO_CONTENT.into_response();
    };
    if phase != "finished" {
        return StatusCode::NO_CONTENT.into_response();
    }

    let mut body = match serde_json::to_value(&results) {
        Ok(v) => v,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    if !history_id.is_empty() {
        body["history_id"] = serde_json::Value::String(history_id);
    }
    Json(body).into_response()
}

async fn handle_history(State(app): State<Arc<AppState>>) -> Response {
    match app.hist.list() {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => {
            tracing::warn!("unable to load run history: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "unable to load run history").into_response()
        }
    }
}

async fn handle_run(State(app): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    if id.is_empty() {
        return (StatusCode::BAD_REQUEST, "run id required").into_response();
    }
    if id.contains('/') {
        return StatusCode::NOT_FOUND.into_response();
    }
    match app.hist.load(&id) {
        Ok(results) => Json(results).into_response(),
        Err(e) if history::Store::is_missing(&e) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::warn!("unable to load run {id}: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "unable to load run").into_response()
        }
    }
}

async fn handle_bundle(State(app): State<Arc<AppState>>) -> Response {
    let (results, phase) = {
        let st = app.state.lock().unwrap();
        (st.results.clone(), st.phase.clone())
    };
    let Some(results) = results else {
        return StatusCode::NO_CONTENT.into_response();
    };
    if phase != "finished" {
        return StatusCode::NO_CONTENT.into_response();
    }

    match report::bundle_bytes(&results) {
        Ok(bytes) => {
            let filename = report::bundle_filename(&results);
            (
                [
                    (header::CONTENT_TYPE, "application/zip".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{filename}\""),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!("unable to build bundle: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "unable to build bundle").into_response()
        }
    }
}

async fn handle_vendor(
    State(app): State<Arc<AppState>>,
    Json(mut creds): Json<VendorCreds>,
) -> Response {
    creds.normalize();

    let suggestions = {
        let mut st = app.state.lock().unwrap();
        if st.running {
            return (StatusCode::CONFLICT, "run already in progress").into_response();
        }
        let Some(results) = &st.results else {
            return (StatusCode::BAD_REQUEST, "no completed run available").into_response();
        };
        let suggestions = results.vendor_suggestions.clone();
        if suggestions.is_empty() {
            return (StatusCode::BAD_REQUEST, "no vendor packs suggested").into_response();
        }
        let run_forti =
            suggestions.iter().any(|s| s == packs::PACK_FORTIGATE) && creds.has_forti();
        let run_cisco =
            suggestions.iter().any(|s| s == packs::PACK_CISCO_IOS) && creds.has_cisco();
        if !run_forti && !run_cisco {
            return (StatusCode::BAD_REQUEST, "no vendor credentials provided").into_response();
        }
        st.running = true;
        st.phase = "python-packs".to_string();
        if let Some(pct) = phase_percent("python-packs") {
            st.percent = pct;
        }
        st.message = "Running vendor checks…".to_string();
        suggestions
    };

    app.record_phase("python-packs", "Running vendor checks…", false);
    app.record_step("Running vendor checks…");

    let state = Arc::clone(&app);
    tokio::spawn(async move { execute_vendor(state, creds, suggestions).await });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "vendor-running" })),
    )
        .into_response()
}

async fn handle_stream(
    State(app): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(SSE_CHANNEL_CAPACITY);
    app.add_subscriber(tx);

    // Register before snapshotting so nothing falls between replay and
    // the live feed.
    let replay: Vec<StreamEvent> = app.state.lock().unwrap().log.clone();

    let replay_stream = tokio_stream::iter(replay);
    let live_stream = ReceiverStream::new(rx);
    let stream = replay_stream
        .chain(live_stream)
        .map(|evt| Ok(Event::default().event(evt.event).data(evt.data)));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Run the pipeline for a control-plane request and settle the run state.
async fn execute(app: Arc<AppState>, req: RunRequest) {
    let mut opts = app.run_template.clone();
    opts.params.scan = req.scan;
    opts.params.target_host = req.target;
    opts.params.progress = Some(app.progress_hook());
    opts.params.cancel = Arc::default();

    let outcome = match tokio::time::timeout(RUN_DEADLINE, pipeline::run_full(opts)).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("diagnostics run exceeded the 30 minute deadline")),
    };

    match outcome {
        Ok(results) => {
            let history_id = match app.hist.save(&results) {
                Ok(id) => id,
                Err(e) => {
                    app.record_step(&format!("⚠️ Unable to store run history: {e}"));
                    String::new()
                }
            };
            {
                let mut st = app.state.lock().unwrap();
                st.phase = "finished".to_string();
                st.percent = 100.0;
                st.message = "Diagnostics complete".to_string();
                st.running = false;
                st.base_findings = results.findings.clone();
                st.history_id = history_id;
                st.results = Some(results);
            }
            app.record_phase("finished", "Diagnostics complete", false);
            app.record_step("Diagnostics complete.");
            app.record_done("finished", "Diagnostics complete");
        }
        Err(e) => {
            let msg = e.to_string();
            {
                let mut st = app.state.lock().unwrap();
                st.phase = "error".to_string();
                st.percent = 100.0;
                st.message = msg.clone();
                st.running = false;
                st.results = None;
                st.history_id.clear();
            }
            app.record_phase("error", &msg, false);
            app.record_step(&format!("Run failed: {msg}"));
            app.record_done("error", &msg);
        }
    }
}

/// Vendor follow-up for a finished run. Re-enters `running`, executes the
/// credentialed packs, and replaces the stored results with a copy whose
/// findings are the base snapshot plus the fresh vendor findings, so a
/// repeat follow-up never accumulates.
async fn execute_vendor(app: Arc<AppState>, creds: VendorCreds, suggestions: Vec<String>) {
    let python = if app.run_template.python_path.is_empty() {
        packs::default_python_path().to_string()
    } else {
        app.run_template.python_path.clone()
    };

    let run_forti = suggestions.iter().any(|s| s == packs::PACK_FORTIGATE) && creds.has_forti();
    let run_cisco = suggestions.iter().any(|s| s == packs::PACK_CISCO_IOS) && creds.has_cisco();
    let mut keys: Vec<&str> = Vec::new();
    if run_forti {
        keys.push(packs::PACK_FORTIGATE);
    }
    if run_cisco {
        keys.push(packs::PACK_CISCO_IOS);
    }

    let step_app = Arc::clone(&app);
    let step = move |msg: &str| step_app.record_step(msg);
    let outcome = match tokio::time::timeout(
        RUN_DEADLINE,
        pipeline::run_vendor_packs(&python, &creds, &keys, &step),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            app.record_step("Vendor pack run exceeded the 30 minute deadline");
            pipeline::VendorRunOutcome::default()
        }
    };

    let (updated, history_id) = {
        let mut st = app.state.lock().unwrap();
        let updated = st.results.as_ref().map(|results| {
            apply_vendor_outcome(results, &st.base_findings, &outcome, run_forti, run_cisco)
        });
        if let Some(copy) = &updated {
            st.results = Some(copy.clone());
        }
        st.running = false;
        st.phase = "finished".to_string();
        st.percent = 100.0;
        st.message = "Vendor checks complete".to_string();
        (updated, st.history_id.clone())
    };

    if let Some(updated) = &updated {
        if !history_id.is_empty() {
            if let Err(e) = app.hist.update(&history_id, updated) {
                app.record_step(&format!("⚠️ Unable to update run history: {e}"));
            }
        }
    }

    app.record_phase("finished", "Vendor checks complete", false);
    app.record_step("Vendor checks complete.");
    app.record_done("finished", "Vendor checks complete");
}

/// Build the replacement `Results` after a vendor round. The findings are
/// always `base_findings ++ vendor findings`, never the previous results'
/// findings, so repeated rounds with identical pack output are
/// byte-identical.
pub(crate) fn apply_vendor_outcome(
    results: &Results,
    base_findings: &[Finding],
    outcome: &pipeline::VendorRunOutcome,
    run_forti: bool,
    run_cisco: bool,
) -> Results {
    let mut copy = results.clone();
    if run_forti {
        copy.forti_raw = outcome.forti_raw.clone();
    }
    if run_cisco {
        copy.cisco_ios = outcome.cisco.clone();
    }
    copy.vendor_summaries = outcome.summaries.clone();
    copy.vendor_findings = outcome.findings.clone();
    let mut findings = base_findings.to_vec();
    findings.extend(outcome.findings.iter().cloned());
    copy.findings = findings;
    copy
}
