// ===============================
// src/host.rs
// ===============================
//
// Seams towards the trading platform that embeds the bridge:
// - TradingHost : what the bridge may ask of the platform
// - HostEvents  : what the platform tells the bridge
//
use thiserror::Error;

use crate::domain::{AccountSnapshot, Bar, Direction, Position, SymbolSnapshot, Tick};

/// The platform refused an action (broker reject, unknown position...).
/// Not fatal: the current command is abandoned, the session goes on.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{action} rejected: {reason}")]
pub struct HostRejection { pub action: &'static str, pub reason: String }

impl HostRejection {
    pub fn new(action: &'static str, reason: impl Into<String>) -> Self {
        Self { action, reason: reason.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub direction: Direction,
    pub volume: f64,
    pub label: String,
    pub stop_loss_pips: Option<f64>,
    pub take_profit_pips: Option<f64>,
}

pub trait TradingHost {
    fn account(&self) -> AccountSnapshot;
    fn symbol(&self) -> SymbolSnapshot;
    fn symbol_name(&self) -> &str;
    /// Account-currency value of one pip for one unit of volume.
    fn pip_value(&self) -> f64;
    /// Oldest first; the last element is the bar still forming.
    fn bars(&self) -> Vec<Bar>;
    fn positions(&self) -> Vec<Position>;
    fn execute_order(&mut self, req: &OrderRequest) -> Result<Position, HostRejection>;
    fn close_position(&mut self, id: i32) -> Result<(), HostRejection>;
    fn modify_volume(&mut self, id: i32, volume: f64) -> Result<(), HostRejection>;
    fn modify_stop_loss(&mut self, id: i32, price: Option<f64>) -> Result<(), HostRejection>;
    fn modify_take_profit(&mut self, id: i32, price: Option<f64>) -> Result<(), HostRejection>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    PositionOpened(Position),
    PositionModified(Position),
    PositionClosed(Position),
    BarOpened(Bar),
    BarClosed(Bar),
    Tick(Tick),
}

/// Callbacks the platform invokes, one at a time, on its own thread.
pub trait HostEvents {
    type Error;
    fn on_position_opened(&mut self, p: &Position) -> Result<(), Self::Error>;
    fn on_position_modified(&mut self, p: &Position) -> Result<(), Self::Error>;
    fn on_position_closed(&mut self, p: &Position) -> Result<(), Self::Error>;
    fn on_bar_opened(&mut self, bar: &Bar) -> Result<(), Self::Error>;
    fn on_bar_closed(&mut self, bar: &Bar) -> Result<(), Self::Error>;
    fn on_tick(&mut self, tick: &Tick) -> Result<(), Self::Error>;

    fn dispatch(&mut self, ev: &HostEvent) -> Result<(), Self::Error> {
        match ev {
            HostEvent::PositionOpened(p) => self.on_position_opened(p),
            HostEvent::PositionModified(p) => self.on_position_modified(p),
            HostEvent::PositionClosed(p) => self.on_position_closed(p),
            HostEvent::BarOpened(b) => self.on_bar_opened(b),
            HostEvent::BarClosed(b) => self.on_bar_closed(b),
            HostEvent::Tick(t) => self.on_tick(t),
        }
    }
}

/// A host that queues its events instead of calling back re-entrantly.
pub trait EventSource {
    fn next_event(&mut self) -> Option<HostEvent>;
}
