//! Prometheus metrics.
//!
//! Command level: `polyrag_command_duration_seconds`, `polyrag_command_total`,
//! `polyrag_command_inflight`. Retrieval: `polyrag_retrieval_total` and
//! `polyrag_retrieval_duration_seconds` per strategy. Ingestion:
//! `polyrag_ingested_total` per item kind. Process metrics come from the
//! `process` collector.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{header, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, exponential_buckets, register_histogram_vec, register_int_counter_vec,
    register_int_gauge_vec, Encoder, HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

static PROCESS: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Process collector not registered: {}", err);
    }
});

static COMMAND_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    // 50ms .. ~7 minutes
    register_histogram_vec!(
        "polyrag_command_duration_seconds",
        "Wall time of CLI commands",
        &["command"],
        exponential_buckets(0.05, 2.0, 14).expect("valid command buckets")
    )
    .expect("register polyrag_command_duration_seconds")
});

static COMMANDS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "polyrag_command_total",
        "Finished CLI commands",
        &["command", "status"]
    )
    .expect("register polyrag_command_total")
});

static COMMANDS_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "polyrag_command_inflight",
        "CLI commands currently running",
        &["command"]
    )
    .expect("register polyrag_command_inflight")
});

static RETRIEVALS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "polyrag_retrieval_total",
        "Strategy retrievals inside fused queries",
        &["strategy", "status"]
    )
    .expect("register polyrag_retrieval_total")
});

static RETRIEVAL_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    // 5ms .. ~40s
    register_histogram_vec!(
        "polyrag_retrieval_duration_seconds",
        "Latency of one strategy inside a fused query",
        &["strategy"],
        exponential_buckets(0.005, 2.0, 14).expect("valid retrieval buckets")
    )
    .expect("register polyrag_retrieval_duration_seconds")
});

static INGESTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "polyrag_ingested_total",
        "Documents, chunks and skipped files seen by ingestion",
        &["kind"]
    )
    .expect("register polyrag_ingested_total")
});

fn register_all() {
    Lazy::force(&PROCESS);
    Lazy::force(&COMMAND_SECONDS);
    Lazy::force(&COMMANDS);
    Lazy::force(&COMMANDS_INFLIGHT);
    Lazy::force(&RETRIEVALS);
    Lazy::force(&RETRIEVAL_SECONDS);
    Lazy::force(&INGESTED);
}

fn status(success: bool) -> &'static str {
    if success {
        "ok"
    } else {
        "error"
    }
}

/// Tracks one CLI command from start to [`CommandTimer::finish`].
///
/// The in-flight gauge is raised on start and lowered on finish.
pub struct CommandTimer {
    command: &'static str,
    started: Instant,
}

impl CommandTimer {
    pub fn start(command: &'static str) -> Self {
        register_all();
        COMMANDS_INFLIGHT.with_label_values(&[command]).inc();
        Self {
            command,
            started: Instant::now(),
        }
    }

    pub fn finish(self, success: bool) -> Duration {
        let elapsed = self.started.elapsed();
        COMMANDS_INFLIGHT.with_label_values(&[self.command]).dec();
        COMMAND_SECONDS
            .with_label_values(&[self.command])
            .observe(elapsed.as_secs_f64());
        COMMANDS
            .with_label_values(&[self.command, status(success)])
            .inc();
        elapsed
    }
}

/// One strategy's contribution to a fused query.
pub fn record_strategy_result(strategy: &str, duration: Duration, success: bool) {
    register_all();
    RETRIEVAL_SECONDS
        .with_label_values(&[strategy])
        .observe(duration.as_secs_f64());
    RETRIEVALS
        .with_label_values(&[strategy, status(success)])
        .inc();
}

/// Totals from one ingestion run.
pub fn record_ingestion(documents: usize, chunks: usize, skipped: usize) {
    register_all();
    for (kind, count) in [("document", documents), ("chunk", chunks), ("skipped", skipped)] {
        INGESTED.with_label_values(&[kind]).inc_by(count as u64);
    }
}

/// Current registry contents in the Prometheus text format.
fn render() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    encoder.encode(&prometheus::gather(), &mut body)?;
    Ok((encoder.format_type().to_string(), body))
}

fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

async fn route(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    Ok(scrape(req.uri().path()))
}

fn scrape(path: &str) -> Response<Full<Bytes>> {
    match path {
        "/metrics" => match render() {
            Ok((content_type, body)) => {
                let mut response = respond(StatusCode::OK, body);
                if let Ok(value) = header::HeaderValue::from_str(&content_type) {
                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                }
                response
            }
            Err(err) => {
                error!("Metrics encoding failed: {}", err);
                respond(StatusCode::INTERNAL_SERVER_ERROR, "encode error")
            }
        },
        "/healthz" => respond(StatusCode::OK, "ok"),
        _ => respond(StatusCode::NOT_FOUND, Bytes::new()),
    }
}

async fn serve(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Serving /metrics");

    loop {
        let (stream, peer) = listener.accept().await?;
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            if let Err(err) = http1::Builder::new()
                .serve_connection(io, service_fn(route))
                .await
            {
                warn!(?peer, "Metrics connection closed with error: {}", err);
            }
        });
    }
}

/// Start the `/metrics` endpoint in the background.
pub fn spawn_metrics_server(addr: SocketAddr) {
    register_all();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server stopped: {}", err);
        }
    });
}
