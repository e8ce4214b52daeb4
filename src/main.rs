// ===============================
// src/main.rs
// ===============================
/*
 # decision process must connect to ENDPOINT, then:
 curl -s localhost:9898/metrics | egrep '^(frames_sent_total|frames_received_total|session_state)'
 curl -s localhost:9898/metrics | grep '^commands_applied_total'
*/
/*
=============================================================================
Project : algo_bridge - host-side bridge to an external decision process
Module  : main.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Serialises host events into fixed-layout binary frames, streams
          them over a per-(symbol, timeframe) socket to a decision process,
          and applies its replies (signals, position edits, price targets)
          against the trading host. Exposes Prometheus metrics and records
          JSONL traffic.
=============================================================================
*/
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use algo_bridge::channel::PipeChannel;
use algo_bridge::config::{self, Args, Cli};
use algo_bridge::feed::MockFeed;
use algo_bridge::host::TradingHost;
use algo_bridge::metrics;
use algo_bridge::paper::{PaperConfig, PaperHost};
use algo_bridge::recorder::{self, FrameLog};
use algo_bridge::strategy::{BridgeError, Strategy, StrategyConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ---- Load config ----
    let (args, strategy_cfg) = config::load(&cli)?;

    // ---- Logging ----
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!(
        session = %args.key(),
        endpoint = ?args.endpoint,
        read_timeout = ?args.read_policy.timeout,
        on_timeout = ?args.read_policy.on_timeout,
        label = %strategy_cfg.label,
        scope = ?strategy_cfg.scope,
        forward_all_ticks = strategy_cfg.forward_all_ticks,
        "startup config"
    );

    // ---- Metrics ----
    metrics::init();
    tokio::spawn(metrics::serve_metrics(args.metrics_port));

    // ---- Recorder (optional) ----
    let (frames, recorder_task) = match args.record_file.clone() {
        Some(path) => {
            let (log, task) = recorder::spawn(path);
            (Some(log), Some(task))
        }
        None => (None, None),
    };

    // ---- Stop flag (Ctrl-C) ----
    let stop = Arc::new(AtomicBool::new(false));
    tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("ctrl-c received, stopping");
                stop.store(true, Ordering::SeqCst);
            }
        }
    });

    // ---- Session (blocking I/O on its own thread) ----
    let session = tokio::task::spawn_blocking(move || run_session(args, strategy_cfg, frames, stop));
    session.await.context("session thread panicked")?;

    // the session dropped its FrameLog; wait for the last flush
    if let Some(task) = recorder_task {
        if let Err(e) = task.await {
            warn!(?e, "recorder task ended abnormally");
        }
    }
    info!("bye");
    Ok(())
}

fn run_session(args: Args, cfg: StrategyConfig, frames: Option<FrameLog>, stop: Arc<AtomicBool>) {
    let channel = PipeChannel::new(args.key(), args.endpoint.clone(), args.read_policy);

    let paper = PaperConfig::fx(&args.symbol, args.timeframe, args.balance);
    let now_ms = chrono::Utc::now().timestamp_millis();
    let mut feed = MockFeed::new(
        now_ms as u64,
        args.start_price,
        paper.info.pip_size * 1.5,
        paper.info.tick_size,
        now_ms,
        args.tick_interval_ms as i64,
    );
    let history = feed.history(args.timeframe, args.history_bars, 20);
    let host = PaperHost::new(paper).with_history(history);

    let mut strategy = Strategy::new(channel, host, cfg);
    if let Some(f) = frames {
        strategy = strategy.with_recorder(f);
    }

    if let Err(e) = drive(&mut strategy, &mut feed, &args, &stop) {
        strategy.halt(&e);
    }
    strategy.shutdown();
    info!(balance = strategy.host().account().balance, "session finished");
}

fn drive(
    strategy: &mut Strategy<PipeChannel, PaperHost>,
    feed: &mut MockFeed,
    args: &Args,
    stop: &AtomicBool,
) -> Result<(), BridgeError> {
    info!(session = %args.key(), "waiting for decision process");
    strategy.open()?;
    strategy.start()?;
    info!("history replayed, streaming ticks");

    let pause = Duration::from_millis(args.tick_interval_ms);
    while !stop.load(Ordering::SeqCst) {
        let tick = feed.next_tick();
        strategy.host_mut().apply_tick(tick);
        strategy.pump()?;
        std::thread::sleep(pause);
    }
    Ok(())
}
