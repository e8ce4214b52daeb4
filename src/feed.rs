// ===============================
// src/feed.rs
// ===============================
//
// Mock market data: random-walk ticks (+ a synthetic bar history so the
// startup replay has something to send). Seeded, so runs are repeatable.
//
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::{Bar, Tick, Timeframe};

pub struct MockFeed {
    rng: StdRng,
    bid: f64,
    spread: f64,
    tick_size: f64,
    ts_ms: i64,
    step_ms: i64,
}

impl MockFeed {
    pub fn new(seed: u64, start_bid: f64, spread: f64, tick_size: f64, start_ms: i64, step_ms: i64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed), bid: start_bid, spread, tick_size, ts_ms: start_ms, step_ms }
    }

    fn walk(&mut self) -> f64 {
        let step = self.rng.gen_range(-3..=3) as f64;
        let floor = self.tick_size * 10.0;
        let px = (self.bid + step * self.tick_size).max(floor);
        // snap to tick grid
        self.bid = (px / self.tick_size).round() * self.tick_size;
        self.bid
    }

    pub fn next_tick(&mut self) -> Tick {
        let bid = self.walk();
        self.ts_ms += self.step_ms;
        Tick { ts_ms: self.ts_ms, ask: bid + self.spread, bid }
    }

    /// `n` closed bars ending before the current bar, plus the forming bar last.
    pub fn history(&mut self, tf: Timeframe, n: usize, ticks_per_bar: usize) -> Vec<Bar> {
        let current = tf.floor(self.ts_ms);
        let origin = current - n as i64 * tf.millis();
        let mut bars = Vec::with_capacity(n + 1);
        for i in 0..n {
            let mut bar = Bar::opening(origin + i as i64 * tf.millis(), self.walk());
            for _ in 1..ticks_per_bar.max(1) {
                let px = self.walk();
                bar.update(px);
            }
            bars.push(bar);
        }
        bars.push(Bar::opening(current, self.bid));
        bars
    }
}
