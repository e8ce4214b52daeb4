// ===============================
// src/strategy.rs
// ===============================
//
// The dispatcher. Every host event becomes one frame to the decision
// process, followed by exactly one blocking read of its reply, which is then
// applied against the host:
//
//   host event -> encode -> write -> (AwaitingReply) read -> decode -> apply
//
// Startup replays account, symbol, every closed bar and a Complete marker,
// each as its own round trip. Nothing is ever written while a reply is
// pending; `Phase` makes that explicit.
//
use std::time::Instant;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::channel::{Channel, ChannelError, SessionState};
use crate::codec::{Inbound, Outbound, ProtocolError, Sizing, TargetKind};
use crate::domain::{Bar, Direction, Position, Tick};
use crate::host::{EventSource, HostEvents, HostRejection, OrderRequest, TradingHost};
use crate::metrics::{
    COMMANDS_APPLIED, FRAMES_RECEIVED, FRAMES_SENT, HOST_REJECTIONS, MODIFICATIONS_SUPPRESSED,
    ROUND_TRIP_MS, SESSION_STATE, TICKS,
};
use crate::recorder::{Event, FrameLog};
use crate::risk;
use crate::tracker::ChangeTracker;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("transport: {0}")]
    Transport(#[from] ChannelError),
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("send attempted while a reply is still pending")]
    ReplyPending,
}

/// Which host positions belong to this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionScope {
    /// Only positions carrying the instance label.
    Label,
    /// Every position on the session symbol.
    All,
}

impl PositionScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "label" | "labeled" | "labelled" | "own" => Some(PositionScope::Label),
            "all" | "any" => Some(PositionScope::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub label: String,
    pub scope: PositionScope,
    pub epsilon: f64,
    pub forward_all_ticks: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self { label: "algo_bridge".into(), scope: PositionScope::Label, epsilon: 1e-9, forward_all_ticks: false }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase { Idle, AwaitingReply }

/// Price levels armed by the decision process. A tick that crosses one is
/// forwarded and the level disarms.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PriceTargets {
    pub ask_above: Option<f64>,
    pub ask_below: Option<f64>,
    pub bid_above: Option<f64>,
    pub bid_below: Option<f64>,
}

impl PriceTargets {
    pub fn set(&mut self, kind: TargetKind, price: Option<f64>) {
        match kind {
            TargetKind::AskAbove => self.ask_above = price,
            TargetKind::AskBelow => self.ask_below = price,
            TargetKind::BidAbove => self.bid_above = price,
            TargetKind::BidBelow => self.bid_below = price,
        }
    }

    pub fn crossed(&mut self, ask: f64, bid: f64) -> bool {
        fn hit(slot: &mut Option<f64>, cond: impl Fn(f64) -> bool) -> bool {
            match *slot {
                Some(level) if cond(level) => {
                    *slot = None;
                    true
                }
                _ => false,
            }
        }
        let mut any = false;
        any |= hit(&mut self.ask_above, |l| ask >= l);
        any |= hit(&mut self.ask_below, |l| ask <= l);
        any |= hit(&mut self.bid_above, |l| bid >= l);
        any |= hit(&mut self.bid_below, |l| bid <= l);
        any
    }
}

pub struct Strategy<C: Channel, H: TradingHost> {
    channel: C,
    host: H,
    cfg: StrategyConfig,
    tracker: ChangeTracker,
    targets: PriceTargets,
    phase: Phase,
    frames: Option<FrameLog>,
    shut_down: bool,
}

impl<C: Channel, H: TradingHost> Strategy<C, H> {
    pub fn new(channel: C, host: H, cfg: StrategyConfig) -> Self {
        let tracker = ChangeTracker::new(cfg.epsilon);
        Self {
            channel,
            host,
            cfg,
            tracker,
            targets: PriceTargets::default(),
            phase: Phase::Idle,
            frames: None,
            shut_down: false,
        }
    }

    pub fn with_recorder(mut self, frames: FrameLog) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn host(&self) -> &H { &self.host }
    pub fn host_mut(&mut self) -> &mut H { &mut self.host }
    pub fn channel(&self) -> &C { &self.channel }
    pub fn phase(&self) -> Phase { self.phase }
    pub fn targets(&self) -> &PriceTargets { &self.targets }
    pub fn config(&self) -> &StrategyConfig { &self.cfg }

    /// Bind the transport and block until the decision process attaches.
    pub fn open(&mut self) -> Result<(), BridgeError> {
        self.channel.initialize()?;
        SESSION_STATE.set(self.channel.state().as_gauge());
        self.channel.connect()?;
        SESSION_STATE.set(self.channel.state().as_gauge());
        Ok(())
    }

    /// Account, symbol, closed-bar history, then Complete.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        let account = self.host.account();
        self.call(Outbound::Account(account))?;
        let symbol = self.host.symbol();
        self.call(Outbound::Symbol(symbol))?;

        let mut bars = self.host.bars();
        // last bar is still forming
        bars.pop();
        bars.sort_by_key(|b| b.open_time_ms);
        info!(bars = bars.len(), "replaying history");
        if let Some(f) = &self.frames {
            f.record(Event::Note(format!("replaying {} closed bars", bars.len())));
        }
        for bar in bars {
            self.call(Outbound::BarClosed(bar))?;
        }
        self.call(Outbound::Complete)
    }

    /// One round trip: send, block for exactly one reply, apply it.
    pub fn call(&mut self, msg: Outbound) -> Result<(), BridgeError> {
        let kind = msg.kind();
        let started = Instant::now();
        if let Err(e) = self.send(&msg) {
            return Err(self.failed(kind, e));
        }
        self.phase = Phase::AwaitingReply;
        let reply = match self.receive() {
            Ok(r) => r,
            Err(e) => return Err(self.failed(kind, e)),
        };
        self.phase = Phase::Idle;
        ROUND_TRIP_MS.observe(started.elapsed().as_secs_f64() * 1_000.0);
        self.apply(reply);
        Ok(())
    }

    fn send(&mut self, msg: &Outbound) -> Result<(), BridgeError> {
        if self.phase == Phase::AwaitingReply {
            return Err(BridgeError::ReplyPending);
        }
        self.channel.write(&msg.encode())?;
        FRAMES_SENT.with_label_values(&[msg.kind()]).inc();
        debug!(kind = msg.kind(), "frame sent");
        if let Some(f) = &self.frames {
            f.record(Event::Sent(msg.clone()));
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Inbound, BridgeError> {
        let tag = self.channel.read(1)?[0];
        let len = Inbound::payload_len(tag)?;
        let payload = if len > 0 { self.channel.read(len)? } else { Vec::new() };
        let reply = Inbound::decode(tag, &payload)?;
        FRAMES_RECEIVED.with_label_values(&[reply.kind()]).inc();
        debug!(kind = reply.kind(), "reply received");
        if let Some(f) = &self.frames {
            f.record(Event::Received(reply.clone()));
        }
        Ok(reply)
    }

    fn failed(&self, kind: &'static str, err: BridgeError) -> BridgeError {
        let at: DateTime<Utc> = Utc::now();
        error!(kind, %at, phase = ?self.phase, error = %err, "round trip failed");
        err
    }

    // -------- command execution --------

    fn apply(&mut self, cmd: Inbound) {
        let kind = cmd.kind();
        let acted = match cmd {
            Inbound::Complete => false,
            Inbound::Signal { direction, sizing, take_profit_pips } => {
                self.apply_signal(direction, sizing, take_profit_pips)
            }
            Inbound::Sideways => self.apply_sideways(),
            Inbound::ModifyVolume { position_id, percent } => self.apply_modify_volume(position_id, percent),
            Inbound::ModifyStopLoss { position_id, price } => match self.scoped_position(position_id) {
                Some(p) => self.host.modify_stop_loss(p.id(), price).map_err(|r| self.rejected(r)).is_ok(),
                None => false,
            },
            Inbound::ModifyTakeProfit { position_id, price } => match self.scoped_position(position_id) {
                Some(p) => self.host.modify_take_profit(p.id(), price).map_err(|r| self.rejected(r)).is_ok(),
                None => false,
            },
            Inbound::Target { target, price } => {
                debug!(?target, ?price, "price target set");
                self.targets.set(target, price);
                true
            }
        };
        if acted {
            COMMANDS_APPLIED.with_label_values(&[kind]).inc();
        }
    }

    /// Returns true once at least one host call went through.
    fn apply_signal(&mut self, direction: Direction, sizing: Sizing, tp_pips: Option<f64>) -> bool {
        let (aligned, opposite): (Vec<Position>, Vec<Position>) =
            self.scoped_positions().into_iter().partition(|p| p.direction() == direction);

        for (closed, p) in opposite.iter().enumerate() {
            if let Err(r) = self.host.close_position(p.id()) {
                // never open against a position we failed to close
                self.rejected(r);
                return closed > 0;
            }
            info!(id = p.id(), ?direction, "closed opposite position");
        }
        if !aligned.is_empty() {
            debug!(?direction, open = aligned.len(), "already positioned, no-op");
            return !opposite.is_empty();
        }

        let volume = match risk::resolve(sizing, &self.host.account(), &self.host.symbol(), self.host.pip_value()) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, ?sizing, "signal skipped: cannot size order");
                return !opposite.is_empty();
            }
        };
        let req = OrderRequest {
            direction,
            volume,
            label: self.cfg.label.clone(),
            stop_loss_pips: sizing.stop_loss_pips(),
            take_profit_pips: tp_pips,
        };
        match self.host.execute_order(&req) {
            Ok(p) => {
                info!(id = p.id(), ?direction, volume, "position opened");
                true
            }
            Err(r) => {
                self.rejected(r);
                !opposite.is_empty()
            }
        }
    }

    fn apply_sideways(&mut self) -> bool {
        let open = self.scoped_positions();
        if open.is_empty() {
            debug!("sideways with nothing open, no-op");
            return false;
        }
        for (closed, p) in open.iter().enumerate() {
            if let Err(r) = self.host.close_position(p.id()) {
                self.rejected(r);
                return closed > 0;
            }
            info!(id = p.id(), "position closed on sideways signal");
        }
        true
    }

    fn apply_modify_volume(&mut self, id: i32, percent: f64) -> bool {
        let Some(p) = self.scoped_position(id) else { return false };
        let current = p.state.volume;
        let volume = match risk::scaled_volume(current, percent, &self.host.symbol()) {
            Ok(v) => v,
            Err(e) => {
                warn!(id, error = %e, "modify volume skipped");
                return false;
            }
        };
        if (volume - current).abs() <= self.cfg.epsilon {
            debug!(id, volume, "volume unchanged after normalization");
            return false;
        }
        self.host.modify_volume(id, volume).map_err(|r| self.rejected(r)).is_ok()
    }

    fn rejected(&self, r: HostRejection) {
        HOST_REJECTIONS.with_label_values(&[r.action]).inc();
        warn!(action = r.action, reason = %r.reason, "host rejected action, command abandoned");
    }

    // -------- scoping --------

    fn in_scope(&self, p: &Position) -> bool {
        p.symbol == self.host.symbol_name()
            && (self.cfg.scope == PositionScope::All || p.label == self.cfg.label)
    }

    /// Every open position on this session's symbol that the scope covers.
    fn scoped_positions(&self) -> Vec<Position> {
        self.host.positions().into_iter().filter(|p| self.in_scope(p)).collect()
    }

    fn scoped_position(&self, id: i32) -> Option<Position> {
        let found = self.host.positions().into_iter().find(|p| p.id() == id && self.in_scope(p));
        if found.is_none() {
            debug!(id, "no tracked position with that id, no-op");
        }
        found
    }

    // -------- lifecycle --------

    /// Top-level catch-all: log and end the session.
    pub fn halt(&mut self, err: &BridgeError) {
        error!(error = %err, at = %Utc::now(), "unexpected error, stopping session");
        self.shutdown();
    }

    /// Best-effort Shutdown frame (no reply expected), then close. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        warn!("shutdown strategy and safely terminate operations");
        if self.channel.state() == SessionState::Connected {
            if self.phase == Phase::AwaitingReply {
                warn!("reply still pending, shutdown frame skipped");
            } else if let Err(e) = self.send(&Outbound::Shutdown) {
                warn!(error = %e, "shutdown frame not delivered");
            }
        }
        self.channel.close();
        SESSION_STATE.set(self.channel.state().as_gauge());
    }

    pub fn is_shut_down(&self) -> bool { self.shut_down }
}

impl<C: Channel, H: TradingHost + EventSource> Strategy<C, H> {
    /// Deliver every event the host queued, each to completion.
    pub fn pump(&mut self) -> Result<usize, BridgeError> {
        let mut n = 0;
        while let Some(ev) = self.host.next_event() {
            self.dispatch(&ev)?;
            n += 1;
        }
        Ok(n)
    }
}

impl<C: Channel, H: TradingHost> HostEvents for Strategy<C, H> {
    type Error = BridgeError;

    fn on_position_opened(&mut self, p: &Position) -> Result<(), BridgeError> {
        if !self.in_scope(p) {
            return Ok(());
        }
        self.tracker.track(&p.state);
        self.call(Outbound::PositionOpened(p.state))
    }

    fn on_position_modified(&mut self, p: &Position) -> Result<(), BridgeError> {
        if !self.in_scope(p) {
            return Ok(());
        }
        if !self.tracker.observe_position(&p.state) {
            MODIFICATIONS_SUPPRESSED.inc();
            return Ok(());
        }
        self.call(Outbound::PositionModified(p.state))
    }

    fn on_position_closed(&mut self, p: &Position) -> Result<(), BridgeError> {
        if !self.in_scope(p) {
            return Ok(());
        }
        self.tracker.reset(p.id());
        self.call(Outbound::PositionClosed(p.state))
    }

    fn on_bar_opened(&mut self, bar: &Bar) -> Result<(), BridgeError> {
        self.call(Outbound::BarOpened(*bar))
    }

    fn on_bar_closed(&mut self, bar: &Bar) -> Result<(), BridgeError> {
        self.call(Outbound::BarClosed(*bar))
    }

    fn on_tick(&mut self, tick: &Tick) -> Result<(), BridgeError> {
        TICKS.inc();
        let crossed = self.targets.crossed(tick.ask, tick.bid);
        if crossed || self.cfg.forward_all_ticks {
            return self.call(Outbound::Tick { ask: tick.ask, bid: tick.bid });
        }
        Ok(())
    }
}
