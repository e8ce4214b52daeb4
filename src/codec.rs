// ===============================
// src/codec.rs
// ===============================
//
// Fixed-layout binary frames between the host and the decision process.
//
// Frame = tag (1 byte) + payload. No length prefix: the reader looks up
// `payload_len(tag)` after reading the tag. All numbers little-endian.
// Optional prices are a presence byte (0/1) followed by 8 bytes of f64
// (zeroed when absent), so every tag keeps one fixed width.
//
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AccountSnapshot, Bar, Direction, PositionState, SymbolSnapshot};

const F64: usize = 8;
const I64: usize = 8;
const I32: usize = 4;
const OPT: usize = 1 + F64;

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("unknown tag {tag}")]
    UnknownTag { tag: u8 },
    #[error("tag {tag}: payload truncated ({actual} of {expected} bytes)")]
    Truncated { tag: u8, expected: usize, actual: usize },
    #[error("tag {tag}: {extra} trailing bytes")]
    TrailingBytes { tag: u8, extra: usize },
    #[error("tag {tag}: invalid presence byte {byte}")]
    InvalidPresence { tag: u8, byte: u8 },
    #[error("tag {tag}: invalid direction byte {byte}")]
    InvalidDirection { tag: u8, byte: u8 },
}

/// Host → decision process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outbound {
    Shutdown,
    Complete,
    Account(AccountSnapshot),
    Symbol(SymbolSnapshot),
    PositionOpened(PositionState),
    PositionModified(PositionState),
    PositionClosed(PositionState),
    BarOpened(Bar),
    BarClosed(Bar),
    Tick { ask: f64, bid: f64 },
}

/// Decision process → host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Inbound {
    Complete,
    Signal { direction: Direction, sizing: Sizing, take_profit_pips: Option<f64> },
    Sideways,
    ModifyVolume { position_id: i32, percent: f64 },
    ModifyStopLoss { position_id: i32, price: Option<f64> },
    ModifyTakeProfit { position_id: i32, price: Option<f64> },
    Target { target: TargetKind, price: Option<f64> },
}

/// How the volume of a directional signal is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Sizing {
    /// Volume in units, taken as-is (then normalized).
    Fixed { volume: f64, stop_loss_pips: Option<f64> },
    /// Percentage of balance at risk over the stop distance, which is mandatory here.
    Dynamic { risk_percent: f64, stop_loss_pips: f64 },
}

impl Sizing {
    pub fn stop_loss_pips(&self) -> Option<f64> {
        match *self {
            Sizing::Fixed { stop_loss_pips, .. } => stop_loss_pips,
            Sizing::Dynamic { stop_loss_pips, .. } => Some(stop_loss_pips),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetKind { AskAbove, AskBelow, BidAbove, BidBelow }

pub mod tag {
    pub mod out {
        pub const SHUTDOWN: u8 = 0;
        pub const COMPLETE: u8 = 1;
        pub const ACCOUNT: u8 = 2;
        pub const SYMBOL: u8 = 3;
        pub const POSITION_OPENED: u8 = 4;
        pub const POSITION_MODIFIED: u8 = 5;
        pub const POSITION_CLOSED: u8 = 6;
        pub const BAR_OPENED: u8 = 7;
        pub const BAR_CLOSED: u8 = 8;
        pub const TICK: u8 = 9;
    }
    pub mod inb {
        pub const COMPLETE: u8 = 0;
        pub const BULLISH_FIXED: u8 = 1;
        pub const BULLISH_DYNAMIC: u8 = 2;
        pub const SIDEWAYS: u8 = 3;
        pub const BEARISH_FIXED: u8 = 4;
        pub const BEARISH_DYNAMIC: u8 = 5;
        pub const MODIFY_VOLUME: u8 = 6;
        pub const MODIFY_STOP_LOSS: u8 = 7;
        pub const MODIFY_TAKE_PROFIT: u8 = 8;
        pub const ASK_ABOVE_TARGET: u8 = 9;
        pub const ASK_BELOW_TARGET: u8 = 10;
        pub const BID_ABOVE_TARGET: u8 = 11;
        pub const BID_BELOW_TARGET: u8 = 12;
    }
}

const POSITION_LEN: usize = I32 + I64 + 1 + 4 * F64 + 2 * OPT + 6 * F64;
const BAR_LEN: usize = I64 + 5 * F64;

// -------- primitives --------

struct Writer { buf: Vec<u8> }
impl Writer {
    fn new(tag: u8, payload: usize) -> Self {
        let mut buf = Vec::with_capacity(1 + payload);
        buf.push(tag);
        Self { buf }
    }
    fn u8(&mut self, v: u8) { self.buf.push(v); }
    fn i32(&mut self, v: i32) { self.buf.extend_from_slice(&v.to_le_bytes()); }
    fn i64(&mut self, v: i64) { self.buf.extend_from_slice(&v.to_le_bytes()); }
    fn f64(&mut self, v: f64) { self.buf.extend_from_slice(&v.to_le_bytes()); }
    fn opt(&mut self, v: Option<f64>) {
        match v {
            Some(x) => { self.u8(1); self.f64(x); }
            None => { self.u8(0); self.f64(0.0); }
        }
    }
}

struct Reader<'a> { tag: u8, buf: &'a [u8], pos: usize }
impl<'a> Reader<'a> {
    fn new(tag: u8, buf: &'a [u8], expected: usize) -> Result<Self, ProtocolError> {
        if buf.len() < expected {
            return Err(ProtocolError::Truncated { tag, expected, actual: buf.len() });
        }
        if buf.len() > expected {
            return Err(ProtocolError::TrailingBytes { tag, extra: buf.len() - expected });
        }
        Ok(Self { tag, buf, pos: 0 })
    }
    fn take<const N: usize>(&mut self) -> [u8; N] {
        // width was checked in `new`
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }
    fn u8(&mut self) -> u8 { self.take::<1>()[0] }
    fn i32(&mut self) -> i32 { i32::from_le_bytes(self.take()) }
    fn i64(&mut self) -> i64 { i64::from_le_bytes(self.take()) }
    fn f64(&mut self) -> f64 { f64::from_le_bytes(self.take()) }
    fn opt(&mut self) -> Result<Option<f64>, ProtocolError> {
        let flag = self.u8();
        let v = self.f64();
        match flag {
            0 => Ok(None),
            1 => Ok(Some(v)),
            byte => Err(ProtocolError::InvalidPresence { tag: self.tag, byte }),
        }
    }
    fn direction(&mut self) -> Result<Direction, ProtocolError> {
        let byte = self.u8();
        Direction::from_byte(byte).ok_or(ProtocolError::InvalidDirection { tag: self.tag, byte })
    }
}

// -------- outbound --------

impl Outbound {
    pub fn tag(&self) -> u8 {
        use tag::out::*;
        match self {
            Outbound::Shutdown => SHUTDOWN,
            Outbound::Complete => COMPLETE,
            Outbound::Account(_) => ACCOUNT,
            Outbound::Symbol(_) => SYMBOL,
            Outbound::PositionOpened(_) => POSITION_OPENED,
            Outbound::PositionModified(_) => POSITION_MODIFIED,
            Outbound::PositionClosed(_) => POSITION_CLOSED,
            Outbound::BarOpened(_) => BAR_OPENED,
            Outbound::BarClosed(_) => BAR_CLOSED,
            Outbound::Tick { .. } => TICK,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::Shutdown => "shutdown",
            Outbound::Complete => "complete",
            Outbound::Account(_) => "account",
            Outbound::Symbol(_) => "symbol",
            Outbound::PositionOpened(_) => "position_opened",
            Outbound::PositionModified(_) => "position_modified",
            Outbound::PositionClosed(_) => "position_closed",
            Outbound::BarOpened(_) => "bar_opened",
            Outbound::BarClosed(_) => "bar_closed",
            Outbound::Tick { .. } => "tick",
        }
    }

    pub fn payload_len(tag: u8) -> Result<usize, ProtocolError> {
        use tag::out::*;
        Ok(match tag {
            SHUTDOWN | COMPLETE => 0,
            ACCOUNT => 6 * F64,
            SYMBOL => F64 + I32 + I64 + 5 * F64,
            POSITION_OPENED | POSITION_MODIFIED | POSITION_CLOSED => POSITION_LEN,
            BAR_OPENED | BAR_CLOSED => BAR_LEN,
            TICK => 2 * F64,
            _ => return Err(ProtocolError::UnknownTag { tag }),
        })
    }

    /// Full frame (tag + payload).
    pub fn encode(&self) -> Vec<u8> {
        let tag = self.tag();
        // every Outbound tag has a known width
        let mut w = Writer::new(tag, Self::payload_len(tag).unwrap_or(0));
        match self {
            Outbound::Shutdown | Outbound::Complete => {}
            Outbound::Account(a) => {
                w.f64(a.balance);
                w.f64(a.credit);
                w.f64(a.equity);
                w.f64(a.margin);
                w.f64(a.free_margin);
                w.f64(a.leverage);
            }
            Outbound::Symbol(s) => {
                w.f64(s.commission);
                w.i32(s.digits);
                w.i64(s.lot_size);
                w.f64(s.pip_size);
                w.f64(s.tick_size);
                w.f64(s.volume_min);
                w.f64(s.volume_max);
                w.f64(s.volume_step);
            }
            Outbound::PositionOpened(p) | Outbound::PositionModified(p) | Outbound::PositionClosed(p) => {
                w.i32(p.id);
                w.i64(p.entry_time_ms);
                w.u8(p.direction.as_byte());
                w.f64(p.volume);
                w.f64(p.quantity);
                w.f64(p.entry_price);
                w.f64(p.current_price);
                w.opt(p.stop_loss);
                w.opt(p.take_profit);
                w.f64(p.pips);
                w.f64(p.gross_profit);
                w.f64(p.commission);
                w.f64(p.swap);
                w.f64(p.net_profit);
                w.f64(p.margin);
            }
            Outbound::BarOpened(b) | Outbound::BarClosed(b) => {
                w.i64(b.open_time_ms);
                w.f64(b.open);
                w.f64(b.high);
                w.f64(b.low);
                w.f64(b.close);
                w.f64(b.tick_volume);
            }
            Outbound::Tick { ask, bid } => {
                w.f64(*ask);
                w.f64(*bid);
            }
        }
        w.buf
    }

    /// Decode a payload whose tag has already been read.
    pub fn decode(tag: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        use tag::out::*;
        let mut r = Reader::new(tag, payload, Self::payload_len(tag)?)?;
        Ok(match tag {
            SHUTDOWN => Outbound::Shutdown,
            COMPLETE => Outbound::Complete,
            ACCOUNT => Outbound::Account(AccountSnapshot {
                balance: r.f64(),
                credit: r.f64(),
                equity: r.f64(),
                margin: r.f64(),
                free_margin: r.f64(),
                leverage: r.f64(),
            }),
            SYMBOL => Outbound::Symbol(SymbolSnapshot {
                commission: r.f64(),
                digits: r.i32(),
                lot_size: r.i64(),
                pip_size: r.f64(),
                tick_size: r.f64(),
                volume_min: r.f64(),
                volume_max: r.f64(),
                volume_step: r.f64(),
            }),
            POSITION_OPENED | POSITION_MODIFIED | POSITION_CLOSED => {
                let p = PositionState {
                    id: r.i32(),
                    entry_time_ms: r.i64(),
                    direction: r.direction()?,
                    volume: r.f64(),
                    quantity: r.f64(),
                    entry_price: r.f64(),
                    current_price: r.f64(),
                    stop_loss: r.opt()?,
                    take_profit: r.opt()?,
                    pips: r.f64(),
                    gross_profit: r.f64(),
                    commission: r.f64(),
                    swap: r.f64(),
                    net_profit: r.f64(),
                    margin: r.f64(),
                };
                match tag {
                    POSITION_OPENED => Outbound::PositionOpened(p),
                    POSITION_MODIFIED => Outbound::PositionModified(p),
                    _ => Outbound::PositionClosed(p),
                }
            }
            BAR_OPENED | BAR_CLOSED => {
                let b = Bar {
                    open_time_ms: r.i64(),
                    open: r.f64(),
                    high: r.f64(),
                    low: r.f64(),
                    close: r.f64(),
                    tick_volume: r.f64(),
                };
                if tag == BAR_OPENED { Outbound::BarOpened(b) } else { Outbound::BarClosed(b) }
            }
            TICK => Outbound::Tick { ask: r.f64(), bid: r.f64() },
            _ => return Err(ProtocolError::UnknownTag { tag }),
        })
    }
}

// -------- inbound --------

impl Inbound {
    pub fn tag(&self) -> u8 {
        use tag::inb::*;
        match self {
            Inbound::Complete => COMPLETE,
            Inbound::Signal { direction, sizing, .. } => match (direction, sizing) {
                (Direction::Buy, Sizing::Fixed { .. }) => BULLISH_FIXED,
                (Direction::Buy, Sizing::Dynamic { .. }) => BULLISH_DYNAMIC,
                (Direction::Sell, Sizing::Fixed { .. }) => BEARISH_FIXED,
                (Direction::Sell, Sizing::Dynamic { .. }) => BEARISH_DYNAMIC,
            },
            Inbound::Sideways => SIDEWAYS,
            Inbound::ModifyVolume { .. } => MODIFY_VOLUME,
            Inbound::ModifyStopLoss { .. } => MODIFY_STOP_LOSS,
            Inbound::ModifyTakeProfit { .. } => MODIFY_TAKE_PROFIT,
            Inbound::Target { target, .. } => match target {
                TargetKind::AskAbove => ASK_ABOVE_TARGET,
                TargetKind::AskBelow => ASK_BELOW_TARGET,
                TargetKind::BidAbove => BID_ABOVE_TARGET,
                TargetKind::BidBelow => BID_BELOW_TARGET,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Inbound::Complete => "complete",
            Inbound::Signal { direction: Direction::Buy, .. } => "bullish",
            Inbound::Signal { direction: Direction::Sell, .. } => "bearish",
            Inbound::Sideways => "sideways",
            Inbound::ModifyVolume { .. } => "modify_volume",
            Inbound::ModifyStopLoss { .. } => "modify_stop_loss",
            Inbound::ModifyTakeProfit { .. } => "modify_take_profit",
            Inbound::Target { .. } => "target",
        }
    }

    pub fn payload_len(tag: u8) -> Result<usize, ProtocolError> {
        use tag::inb::*;
        Ok(match tag {
            COMPLETE | SIDEWAYS => 0,
            BULLISH_FIXED | BEARISH_FIXED => F64 + 2 * OPT,
            BULLISH_DYNAMIC | BEARISH_DYNAMIC => 2 * F64 + OPT,
            MODIFY_VOLUME => I32 + F64,
            MODIFY_STOP_LOSS | MODIFY_TAKE_PROFIT => I32 + OPT,
            ASK_ABOVE_TARGET | ASK_BELOW_TARGET | BID_ABOVE_TARGET | BID_BELOW_TARGET => OPT,
            _ => return Err(ProtocolError::UnknownTag { tag }),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let tag = self.tag();
        let mut w = Writer::new(tag, Self::payload_len(tag).unwrap_or(0));
        match self {
            Inbound::Complete | Inbound::Sideways => {}
            Inbound::Signal { sizing, take_profit_pips, .. } => {
                match *sizing {
                    Sizing::Fixed { volume, stop_loss_pips } => {
                        w.f64(volume);
                        w.opt(stop_loss_pips);
                    }
                    Sizing::Dynamic { risk_percent, stop_loss_pips } => {
                        w.f64(risk_percent);
                        w.f64(stop_loss_pips);
                    }
                }
                w.opt(*take_profit_pips);
            }
            Inbound::ModifyVolume { position_id, percent } => {
                w.i32(*position_id);
                w.f64(*percent);
            }
            Inbound::ModifyStopLoss { position_id, price } | Inbound::ModifyTakeProfit { position_id, price } => {
                w.i32(*position_id);
                w.opt(*price);
            }
            Inbound::Target { price, .. } => w.opt(*price),
        }
        w.buf
    }

    pub fn decode(tag: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        use tag::inb::*;
        let mut r = Reader::new(tag, payload, Self::payload_len(tag)?)?;
        Ok(match tag {
            COMPLETE => Inbound::Complete,
            SIDEWAYS => Inbound::Sideways,
            BULLISH_FIXED | BEARISH_FIXED => Inbound::Signal {
                direction: if tag == BULLISH_FIXED { Direction::Buy } else { Direction::Sell },
                sizing: Sizing::Fixed { volume: r.f64(), stop_loss_pips: r.opt()? },
                take_profit_pips: r.opt()?,
            },
            BULLISH_DYNAMIC | BEARISH_DYNAMIC => Inbound::Signal {
                direction: if tag == BULLISH_DYNAMIC { Direction::Buy } else { Direction::Sell },
                sizing: Sizing::Dynamic { risk_percent: r.f64(), stop_loss_pips: r.f64() },
                take_profit_pips: r.opt()?,
            },
            MODIFY_VOLUME => Inbound::ModifyVolume { position_id: r.i32(), percent: r.f64() },
            MODIFY_STOP_LOSS => Inbound::ModifyStopLoss { position_id: r.i32(), price: r.opt()? },
            MODIFY_TAKE_PROFIT => Inbound::ModifyTakeProfit { position_id: r.i32(), price: r.opt()? },
            ASK_ABOVE_TARGET => Inbound::Target { target: TargetKind::AskAbove, price: r.opt()? },
            ASK_BELOW_TARGET => Inbound::Target { target: TargetKind::AskBelow, price: r.opt()? },
            BID_ABOVE_TARGET => Inbound::Target { target: TargetKind::BidAbove, price: r.opt()? },
            BID_BELOW_TARGET => Inbound::Target { target: TargetKind::BidBelow, price: r.opt()? },
            _ => return Err(ProtocolError::UnknownTag { tag }),
        })
    }
}
