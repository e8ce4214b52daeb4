// ===============================
// src/tracker.rs
// ===============================
//
// Last-known volume / stop-loss / take-profit per open position. The host
// fires "modified" far more often than these actually move (swap, PnL
// recalculation...), so only real changes are forwarded.
//
use ahash::AHashMap as HashMap;

use crate::domain::PositionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute { Volume, StopLoss, TakeProfit }

impl Attribute {
    pub const ALL: [Attribute; 3] = [Attribute::Volume, Attribute::StopLoss, Attribute::TakeProfit];

    fn slot(&self) -> usize {
        match self { Attribute::Volume => 0, Attribute::StopLoss => 1, Attribute::TakeProfit => 2 }
    }

    pub fn read(&self, p: &PositionState) -> Option<f64> {
        match self {
            Attribute::Volume => Some(p.volume),
            Attribute::StopLoss => p.stop_loss,
            Attribute::TakeProfit => p.take_profit,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Baseline { values: [Option<f64>; 3] }

#[derive(Debug)]
pub struct ChangeTracker {
    epsilon: f64,
    baselines: HashMap<i32, Baseline>,
}

impl ChangeTracker {
    pub fn new(epsilon: f64) -> Self { Self { epsilon: epsilon.abs(), baselines: HashMap::new() } }

    /// Seed baselines for a freshly opened position.
    pub fn track(&mut self, p: &PositionState) {
        let mut b = Baseline::default();
        for a in Attribute::ALL {
            b.values[a.slot()] = a.read(p);
        }
        self.baselines.insert(p.id, b);
    }

    /// True (and baseline updated) when the value moved by more than epsilon
    /// or flipped between present and absent.
    pub fn observe(&mut self, key: i32, attribute: Attribute, value: Option<f64>) -> bool {
        let eps = self.epsilon;
        let slot = &mut self.baselines.entry(key).or_default().values[attribute.slot()];
        let changed = match (*slot, value) {
            (None, None) => false,
            (Some(old), Some(new)) => (new - old).abs() > eps,
            _ => true,
        };
        if changed {
            *slot = value;
        }
        changed
    }

    /// Observe every attribute of `p`; true if any of them changed.
    pub fn observe_position(&mut self, p: &PositionState) -> bool {
        let mut changed = false;
        for a in Attribute::ALL {
            // no short-circuit: every baseline must follow
            changed |= self.observe(p.id, a, a.read(p));
        }
        changed
    }

    pub fn reset(&mut self, key: i32) { self.baselines.remove(&key); }

    pub fn is_tracked(&self, key: i32) -> bool { self.baselines.contains_key(&key) }
}
