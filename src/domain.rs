// ===============================
// src/domain.rs
// ===============================
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction { Buy, Sell }
impl Direction {
    pub fn sign(&self) -> f64 { match self { Direction::Buy => 1.0, Direction::Sell => -1.0 } }
    pub fn opposite(&self) -> Direction { match self { Direction::Buy => Direction::Sell, Direction::Sell => Direction::Buy } }
    pub fn as_byte(&self) -> u8 { match self { Direction::Buy => 0, Direction::Sell => 1 } }
    pub fn from_byte(b: u8) -> Option<Direction> {
        match b { 0 => Some(Direction::Buy), 1 => Some(Direction::Sell), _ => None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: f64,
    pub credit: f64,
    pub equity: f64,
    pub margin: f64,
    pub free_margin: f64,
    pub leverage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymbolSnapshot {
    pub commission: f64,
    pub digits: i32,
    pub lot_size: i64,
    pub pip_size: f64,
    pub tick_size: f64,
    pub volume_min: f64,
    pub volume_max: f64,
    pub volume_step: f64,
}

/// Broker-side state of one position, exactly as it travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub id: i32,
    pub entry_time_ms: i64,
    pub direction: Direction,
    pub volume: f64,
    pub quantity: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub pips: f64,
    pub gross_profit: f64,
    pub commission: f64,
    pub swap: f64,
    pub net_profit: f64,
    pub margin: f64,
}

/// A host position: wire state plus the host-only label/symbol used for scoping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position { pub label: String, pub symbol: String, pub state: PositionState }
impl Position {
    pub fn id(&self) -> i32 { self.state.id }
    pub fn direction(&self) -> Direction { self.state.direction }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub open_time_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub tick_volume: f64,
}
impl Bar {
    pub fn opening(open_time_ms: i64, px: f64) -> Self {
        Self { open_time_ms, open: px, high: px, low: px, close: px, tick_volume: 1.0 }
    }
    pub fn update(&mut self, px: f64) {
        if px > self.high { self.high = px; }
        if px < self.low { self.low = px; }
        self.close = px;
        self.tick_volume += 1.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick { pub ts_ms: i64, pub ask: f64, pub bid: f64 }

/// Bar period of a session. Accepts short names (`m1`, `h4`) and the
/// platform long names (`Minute5`, `Hour`, `Daily`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeframe { pub seconds: i64 }
impl Timeframe {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        let seconds = match s.as_str() {
            "minute" => 60,
            "hour" => 3_600,
            "daily" | "day" | "d1" => 86_400,
            "weekly" | "w1" => 604_800,
            _ => {
                let (unit, n) = if let Some(n) = s.strip_prefix("minute") { (60, n) }
                    else if let Some(n) = s.strip_prefix("hour") { (3_600, n) }
                    else if let Some(n) = s.strip_prefix('m') { (60, n) }
                    else if let Some(n) = s.strip_prefix('h') { (3_600, n) }
                    else { return None };
                let n: i64 = n.parse().ok()?;
                if n <= 0 { return None; }
                unit * n
            }
        };
        Some(Self { seconds })
    }
    pub fn millis(&self) -> i64 { self.seconds * 1_000 }
    /// Start of the bar containing `ts_ms`.
    pub fn floor(&self, ts_ms: i64) -> i64 { ts_ms - ts_ms.rem_euclid(self.millis()) }
}
