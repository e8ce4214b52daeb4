// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use tracing::{error, info};

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Protocol traffic --------
pub static FRAMES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("frames_sent_total", "frames sent to the decision process"), &["kind"])
        .unwrap()
});

pub static FRAMES_RECEIVED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("frames_received_total", "frames received from the decision process"),
        &["kind"],
    )
    .unwrap()
});

// Send -> reply decoded (milliseconds)
pub static ROUND_TRIP_MS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("round_trip_ms", "send to reply latency (ms)")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]),
    )
    .unwrap()
});

// -------- Command execution --------
pub static COMMANDS_APPLIED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("commands_applied_total", "commands that reached the host or armed a target, by kind"),
        &["kind"],
    )
    .unwrap()
});

pub static HOST_REJECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(Opts::new("host_rejections_total", "host refused an action"), &["action"])
        .unwrap()
});

pub static MODIFICATIONS_SUPPRESSED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("modifications_suppressed_total", "position modified events with no tracked change")
        .unwrap()
});

pub static TICKS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("ticks_total", "ticks seen from the host").unwrap());

// 0 uninitialized, 1 listening, 2 connected, 3 disconnected
pub static SESSION_STATE: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("session_state", "channel lifecycle state").unwrap());

pub fn init() {
    for m in [
        REGISTRY.register(Box::new(FRAMES_SENT.clone())),
        REGISTRY.register(Box::new(FRAMES_RECEIVED.clone())),
        REGISTRY.register(Box::new(ROUND_TRIP_MS.clone())),
        REGISTRY.register(Box::new(COMMANDS_APPLIED.clone())),
        REGISTRY.register(Box::new(HOST_REJECTIONS.clone())),
        REGISTRY.register(Box::new(MODIFICATIONS_SUPPRESSED.clone())),
        REGISTRY.register(Box::new(TICKS.clone())),
        REGISTRY.register(Box::new(SESSION_STATE.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics), tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Run the metrics server in a dedicated OS thread (keeps Tokio runtime clean)
pub async fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = match TcpListener::bind(&addr) {
            Ok(l) => l,
            Err(e) => {
                error!(?e, %addr, "metrics bind failed");
                return;
            }
        };
        info!(%addr, "metrics listening");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => error!(?e, "metrics accept error"),
            }
        }
    });
}
