// Shared doubles for the scenario tests.
#![allow(dead_code)]

use std::collections::VecDeque;

use algo_bridge::channel::{Channel, ChannelError, SessionState};
use algo_bridge::codec::{Inbound, Outbound};
use algo_bridge::domain::{AccountSnapshot, Bar, Direction, Position, PositionState, SymbolSnapshot};
use algo_bridge::host::{EventSource, HostEvent, HostRejection, OrderRequest, TradingHost};
use algo_bridge::strategy::{StrategyConfig, Strategy};

pub const SYMBOL: &str = "EURUSD";
pub const LABEL: &str = "algo_bridge";

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Write(Vec<u8>),
    Read(usize),
}

/// In-memory channel: replies are scripted up front, every call is logged.
pub struct MockChannel {
    pub state: SessionState,
    pub replies: VecDeque<u8>,
    pub ops: Vec<Op>,
}

impl MockChannel {
    pub fn new(replies: &[Inbound]) -> Self {
        let mut s = Self { state: SessionState::Connected, replies: VecDeque::new(), ops: Vec::new() };
        s.script(replies);
        s
    }

    pub fn script(&mut self, replies: &[Inbound]) {
        for r in replies {
            self.replies.extend(r.encode());
        }
    }

    /// Decoded outbound frames in write order.
    pub fn sent(&self) -> Vec<Outbound> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Write(bytes) => Some(Outbound::decode(bytes[0], &bytes[1..]).expect("well-formed frame")),
                Op::Read(_) => None,
            })
            .collect()
    }

    /// No two writes without a read in between.
    pub fn strictly_alternates(&self) -> bool {
        let mut awaiting = false;
        for op in &self.ops {
            match op {
                Op::Write(_) if awaiting => return false,
                Op::Write(_) => awaiting = true,
                Op::Read(_) => awaiting = false,
            }
        }
        true
    }
}

impl Channel for MockChannel {
    fn initialize(&mut self) -> Result<(), ChannelError> {
        self.state = SessionState::Listening;
        Ok(())
    }

    fn connect(&mut self) -> Result<(), ChannelError> {
        self.state = SessionState::Connected;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        if self.state != SessionState::Connected {
            return Err(ChannelError::NotConnected);
        }
        self.ops.push(Op::Write(bytes.to_vec()));
        Ok(())
    }

    fn read(&mut self, n: usize) -> Result<Vec<u8>, ChannelError> {
        if self.state != SessionState::Connected {
            return Err(ChannelError::NotConnected);
        }
        if self.replies.len() < n {
            self.close();
            return Err(ChannelError::PeerClosed);
        }
        self.ops.push(Op::Read(n));
        Ok(self.replies.drain(..n).collect())
    }

    fn close(&mut self) { self.state = SessionState::Disconnected; }

    fn state(&self) -> SessionState { self.state }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Execute(OrderRequest),
    Close(i32),
    ModifyVolume(i32, f64),
    ModifyStopLoss(i32, Option<f64>),
    ModifyTakeProfit(i32, Option<f64>),
}

/// Scriptable host: records every mutation, optionally rejects some.
pub struct MockHost {
    pub account: AccountSnapshot,
    pub info: SymbolSnapshot,
    pub pip_value: f64,
    pub bars: Vec<Bar>,
    pub positions: Vec<Position>,
    pub calls: Vec<Call>,
    pub reject_close: Vec<i32>,
    pub reject_orders: bool,
    pub events: VecDeque<HostEvent>,
    next_id: i32,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            account: AccountSnapshot {
                balance: 10_000.0,
                credit: 0.0,
                equity: 10_000.0,
                margin: 0.0,
                free_margin: 10_000.0,
                leverage: 30.0,
            },
            info: fx(),
            pip_value: 0.0001,
            bars: Vec::new(),
            positions: Vec::new(),
            calls: Vec::new(),
            reject_close: Vec::new(),
            reject_orders: false,
            events: VecDeque::new(),
            next_id: 100,
        }
    }

    pub fn with_position(mut self, id: i32, direction: Direction, volume: f64, label: &str) -> Self {
        self.positions.push(position(id, direction, volume, label));
        self
    }

    /// Same as `with_position`, but booked on another instrument.
    pub fn with_position_on(mut self, symbol: &str, id: i32, direction: Direction, volume: f64, label: &str) -> Self {
        let mut p = position(id, direction, volume, label);
        p.symbol = symbol.to_string();
        self.positions.push(p);
        self
    }
}

impl TradingHost for MockHost {
    fn account(&self) -> AccountSnapshot { self.account }
    fn symbol(&self) -> SymbolSnapshot { self.info }
    fn symbol_name(&self) -> &str { SYMBOL }
    fn pip_value(&self) -> f64 { self.pip_value }
    fn bars(&self) -> Vec<Bar> { self.bars.clone() }
    fn positions(&self) -> Vec<Position> { self.positions.clone() }

    fn execute_order(&mut self, req: &OrderRequest) -> Result<Position, HostRejection> {
        self.calls.push(Call::Execute(req.clone()));
        if self.reject_orders {
            return Err(HostRejection::new("execute_order", "scripted"));
        }
        let p = position(self.next_id, req.direction, req.volume, &req.label);
        self.next_id += 1;
        self.positions.push(p.clone());
        Ok(p)
    }

    fn close_position(&mut self, id: i32) -> Result<(), HostRejection> {
        self.calls.push(Call::Close(id));
        if self.reject_close.contains(&id) {
            return Err(HostRejection::new("close_position", "scripted"));
        }
        self.positions.retain(|p| p.id() != id);
        Ok(())
    }

    fn modify_volume(&mut self, id: i32, volume: f64) -> Result<(), HostRejection> {
        self.calls.push(Call::ModifyVolume(id, volume));
        Ok(())
    }

    fn modify_stop_loss(&mut self, id: i32, price: Option<f64>) -> Result<(), HostRejection> {
        self.calls.push(Call::ModifyStopLoss(id, price));
        Ok(())
    }

    fn modify_take_profit(&mut self, id: i32, price: Option<f64>) -> Result<(), HostRejection> {
        self.calls.push(Call::ModifyTakeProfit(id, price));
        Ok(())
    }
}

impl EventSource for MockHost {
    fn next_event(&mut self) -> Option<HostEvent> { self.events.pop_front() }
}

pub fn fx() -> SymbolSnapshot {
    SymbolSnapshot {
        commission: 30.0,
        digits: 5,
        lot_size: 100_000,
        pip_size: 0.0001,
        tick_size: 0.00001,
        volume_min: 1_000.0,
        volume_max: 10_000_000.0,
        volume_step: 1_000.0,
    }
}

pub fn position(id: i32, direction: Direction, volume: f64, label: &str) -> Position {
    Position {
        label: label.to_string(),
        symbol: SYMBOL.to_string(),
        state: PositionState {
            id,
            entry_time_ms: 0,
            direction,
            volume,
            quantity: volume / 100_000.0,
            entry_price: 1.1,
            current_price: 1.1,
            stop_loss: None,
            take_profit: None,
            pips: 0.0,
            gross_profit: 0.0,
            commission: 0.0,
            swap: 0.0,
            net_profit: 0.0,
            margin: 0.0,
        },
    }
}

pub fn bar(open_time_ms: i64, close: f64) -> Bar {
    Bar { open_time_ms, open: close, high: close, low: close, close, tick_volume: 10.0 }
}

pub fn strategy(replies: &[Inbound], host: MockHost) -> Strategy<MockChannel, MockHost> {
    Strategy::new(MockChannel::new(replies), host, StrategyConfig::default())
}
