// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : algo_bridge - host-side bridge to an external decision process
Module  : config.rs
Version : 0.5.0
License : MIT (see LICENSE)

Summary : Serialises host events into fixed-layout binary frames, streams
          them over a per-(symbol, timeframe) socket to a decision process,
          and applies its replies (signals, position edits, price targets)
          against the trading host. Exposes Prometheus metrics and records
          JSONL traffic.
=============================================================================
*/
use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use dotenvy::dotenv;

use crate::channel::{ChannelKey, Endpoint, ReadPolicy, TimeoutPolicy};
use crate::domain::Timeframe;
use crate::strategy::{PositionScope, StrategyConfig};

/// Command-line overrides; everything else comes from env / .env.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "algo_bridge", version, about = "Bridge between a trading host and a decision process")]
pub struct Cli {
    /// Session symbol (overrides SYMBOL)
    #[arg(long)]
    pub symbol: Option<String>,
    /// Session timeframe, e.g. m1, h4, Daily (overrides TIMEFRAME)
    #[arg(long)]
    pub timeframe: Option<String>,
    /// tcp://host:port or unix:///dir (overrides ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,
    /// Read this env file instead of ./.env
    #[arg(long)]
    pub env_file: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Args {
    // session
    pub symbol: String,
    pub timeframe_name: String,
    pub timeframe: Timeframe,
    pub endpoint: Endpoint,
    pub read_policy: ReadPolicy,

    // files/metrics
    pub record_file: Option<String>,
    pub metrics_port: u16,
    pub log_filter: String,

    // paper host
    pub balance: f64,
    pub history_bars: usize,
    pub tick_interval_ms: u64,
    pub start_price: f64,
}

impl Args {
    pub fn key(&self) -> ChannelKey {
        ChannelKey { symbol: self.symbol.clone(), timeframe: self.timeframe_name.clone() }
    }
}

fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn flag(key: &str, default: bool) -> bool {
    match env::var(key).unwrap_or_default().trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// `fail` | `retry` (with TIMEOUT_RETRIES, default 3).
pub fn parse_timeout_policy(s: &str, retries: u32) -> Option<TimeoutPolicy> {
    match s.trim().to_ascii_lowercase().as_str() {
        "" | "fail" => Some(TimeoutPolicy::Fail),
        "retry" => Some(TimeoutPolicy::Retry { retries }),
        _ => None,
    }
}

pub fn load(cli: &Cli) -> Result<(Args, StrategyConfig)> {
    // .env opsional; file eksplisit dari --env-file wajib ada
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_filename(path).with_context(|| format!("cannot read env file {path}"))?;
        }
        None => {
            let _ = dotenv();
        }
    }

    // ===== Session =====
    let symbol = cli
        .symbol
        .clone()
        .or_else(|| env::var("SYMBOL").ok())
        .unwrap_or_else(|| "EURUSD".to_string())
        .trim()
        .to_ascii_uppercase();
    let timeframe_name = cli
        .timeframe
        .clone()
        .or_else(|| env::var("TIMEFRAME").ok())
        .unwrap_or_else(|| "m1".to_string());
    let timeframe =
        Timeframe::parse(&timeframe_name).ok_or_else(|| anyhow!("unknown timeframe {timeframe_name:?}"))?;

    let endpoint_s = cli
        .endpoint
        .clone()
        .or_else(|| env::var("ENDPOINT").ok())
        .unwrap_or_else(|| "tcp://127.0.0.1:7878".to_string());
    let endpoint = Endpoint::parse(&endpoint_s).ok_or_else(|| anyhow!("bad endpoint {endpoint_s:?}"))?;

    // ===== Read timeout =====
    // READ_TIMEOUT_MS kosong / 0 => tunggu selamanya
    let timeout_ms: u64 = var_or("READ_TIMEOUT_MS", 0);
    let retries: u32 = var_or("TIMEOUT_RETRIES", 3);
    let policy_s = env::var("TIMEOUT_POLICY").unwrap_or_default();
    let on_timeout =
        parse_timeout_policy(&policy_s, retries).ok_or_else(|| anyhow!("bad TIMEOUT_POLICY {policy_s:?}"))?;
    let read_policy = ReadPolicy {
        timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        on_timeout,
    };

    let args = Args {
        symbol,
        timeframe_name,
        timeframe,
        endpoint,
        read_policy,
        record_file: env::var("RECORD_FILE").ok().filter(|s| !s.trim().is_empty()),
        metrics_port: var_or("METRICS_PORT", 9898),
        log_filter: env::var("LOG_FILTER").unwrap_or_else(|_| "info".to_string()),
        balance: var_or("BALANCE", 10_000.0),
        history_bars: var_or("HISTORY_BARS", 100),
        tick_interval_ms: var_or("TICK_INTERVAL_MS", 250),
        start_price: var_or("START_PRICE", 1.10000),
    };

    // ===== Dispatcher =====
    let defaults = StrategyConfig::default();
    let scope_s = env::var("POSITION_SCOPE").unwrap_or_default();
    let scope = if scope_s.trim().is_empty() {
        defaults.scope
    } else {
        PositionScope::parse(&scope_s).ok_or_else(|| anyhow!("bad POSITION_SCOPE {scope_s:?}"))?
    };
    let strategy = StrategyConfig {
        label: env::var("INSTANCE_LABEL").ok().filter(|s| !s.trim().is_empty()).unwrap_or(defaults.label),
        scope,
        epsilon: var_or("CHANGE_EPSILON", defaults.epsilon),
        forward_all_ticks: flag("FORWARD_ALL_TICKS", defaults.forward_all_ticks),
    };

    Ok((args, strategy))
}
