// ===============================
// src/paper.rs (paper broker + PnL)
// ===============================
//
// In-process host for running the bridge without a trading platform:
// - market orders fill immediately at ask (buy) / bid (sell)
// - positions are marked to market on every tick, stop-loss / take-profit
//   hits close them
// - ticks are aggregated into bars of the session timeframe (bid side)
// - every state change is queued as a HostEvent; the strategy pumps them
//
use std::collections::VecDeque;

use tracing::debug;

use crate::domain::{AccountSnapshot, Bar, Direction, Position, PositionState, SymbolSnapshot, Tick, Timeframe};
use crate::host::{EventSource, HostEvent, HostRejection, OrderRequest, TradingHost};

#[derive(Debug, Clone)]
pub struct PaperConfig {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub balance: f64,
    pub leverage: f64,
    pub info: SymbolSnapshot,
    pub pip_value: f64,
}

impl PaperConfig {
    /// A 5-digit FX pair quoted in the account currency.
    pub fn fx(symbol: &str, timeframe: Timeframe, balance: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            balance,
            leverage: 30.0,
            info: SymbolSnapshot {
                commission: 30.0,
                digits: 5,
                lot_size: 100_000,
                pip_size: 0.0001,
                tick_size: 0.00001,
                volume_min: 1_000.0,
                volume_max: 10_000_000.0,
                volume_step: 1_000.0,
            },
            pip_value: 0.0001,
        }
    }
}

pub struct PaperHost {
    cfg: PaperConfig,
    balance: f64,
    positions: Vec<Position>,
    next_id: i32,
    bars: Vec<Bar>,
    last: Option<Tick>,
    events: VecDeque<HostEvent>,
}

impl PaperHost {
    pub fn new(cfg: PaperConfig) -> Self {
        let balance = cfg.balance;
        Self { cfg, balance, positions: Vec::new(), next_id: 1, bars: Vec::new(), last: None, events: VecDeque::new() }
    }

    /// Closed bars followed by the forming bar.
    pub fn with_history(mut self, bars: Vec<Bar>) -> Self {
        self.bars = bars;
        self
    }

    pub fn balance(&self) -> f64 { self.balance }

    pub fn last_tick(&self) -> Option<Tick> { self.last }

    pub fn apply_tick(&mut self, tick: Tick) {
        self.last = Some(tick);
        self.roll_bar(&tick);

        let mut hits = Vec::new();
        for i in 0..self.positions.len() {
            let st = &mut self.positions[i].state;
            mark(st, &tick, &self.cfg);
            if protection_hit(st, &tick) {
                hits.push(st.id);
            } else {
                // platform recalculation: fires even when nothing tracked moved
                self.events.push_back(HostEvent::PositionModified(self.positions[i].clone()));
            }
        }
        for id in hits {
            debug!(id, "protection hit");
            let _ = self.close_position(id);
        }
        self.events.push_back(HostEvent::Tick(tick));
    }

    fn roll_bar(&mut self, tick: &Tick) {
        let open_time = self.cfg.timeframe.floor(tick.ts_ms);
        match self.bars.last().map(|b| b.open_time_ms) {
            Some(t) if t == open_time => {
                if let Some(bar) = self.bars.last_mut() {
                    bar.update(tick.bid);
                }
            }
            // late tick, belongs to an already closed bar
            Some(t) if t > open_time => {}
            _ => {
                if let Some(done) = self.bars.last() {
                    self.events.push_back(HostEvent::BarClosed(*done));
                }
                let bar = Bar::opening(open_time, tick.bid);
                self.bars.push(bar);
                self.events.push_back(HostEvent::BarOpened(bar));
            }
        }
    }

    fn index_of(&self, id: i32) -> Option<usize> { self.positions.iter().position(|p| p.id() == id) }

    fn price_for(&self, direction: Direction, closing: bool) -> Option<f64> {
        let t = self.last?;
        // buys open at ask and close at bid, sells the other way round
        Some(match (direction, closing) {
            (Direction::Buy, false) | (Direction::Sell, true) => t.ask,
            (Direction::Buy, true) | (Direction::Sell, false) => t.bid,
        })
    }

    fn commission_for(&self, volume: f64, price: f64) -> f64 {
        // per million of notional, one side
        -(volume * price / 1_000_000.0 * self.cfg.info.commission)
    }
}

fn mark(st: &mut PositionState, tick: &Tick, cfg: &PaperConfig) {
    st.current_price = match st.direction { Direction::Buy => tick.bid, Direction::Sell => tick.ask };
    let diff = (st.current_price - st.entry_price) * st.direction.sign();
    st.pips = diff / cfg.info.pip_size;
    st.gross_profit = diff * st.volume;
    st.net_profit = st.gross_profit + st.commission * 2.0 + st.swap;
}

fn protection_hit(st: &PositionState, tick: &Tick) -> bool {
    match st.direction {
        Direction::Buy => st.stop_loss.is_some_and(|sl| tick.bid <= sl) || st.take_profit.is_some_and(|tp| tick.bid >= tp),
        Direction::Sell => st.stop_loss.is_some_and(|sl| tick.ask >= sl) || st.take_profit.is_some_and(|tp| tick.ask <= tp),
    }
}

impl TradingHost for PaperHost {
    fn account(&self) -> AccountSnapshot {
        let open: f64 = self.positions.iter().map(|p| p.state.net_profit).sum();
        let margin: f64 = self.positions.iter().map(|p| p.state.margin).sum();
        let equity = self.balance + open;
        AccountSnapshot {
            balance: self.balance,
            credit: 0.0,
            equity,
            margin,
            free_margin: equity - margin,
            leverage: self.cfg.leverage,
        }
    }

    fn symbol(&self) -> SymbolSnapshot { self.cfg.info }

    fn symbol_name(&self) -> &str { &self.cfg.symbol }

    fn pip_value(&self) -> f64 { self.cfg.pip_value }

    fn bars(&self) -> Vec<Bar> { self.bars.clone() }

    fn positions(&self) -> Vec<Position> { self.positions.clone() }

    fn execute_order(&mut self, req: &OrderRequest) -> Result<Position, HostRejection> {
        let info = self.cfg.info;
        if req.volume < info.volume_min || req.volume > info.volume_max {
            return Err(HostRejection::new("execute_order", format!("volume {} out of range", req.volume)));
        }
        let (Some(price), Some(tick)) = (self.price_for(req.direction, false), self.last) else {
            return Err(HostRejection::new("execute_order", "no market price yet"));
        };
        let sign = req.direction.sign();
        let mut state = PositionState {
            id: self.next_id,
            entry_time_ms: tick.ts_ms,
            direction: req.direction,
            volume: req.volume,
            quantity: req.volume / info.lot_size as f64,
            entry_price: price,
            current_price: price,
            stop_loss: req.stop_loss_pips.map(|p| price - sign * p * info.pip_size),
            take_profit: req.take_profit_pips.map(|p| price + sign * p * info.pip_size),
            pips: 0.0,
            gross_profit: 0.0,
            commission: self.commission_for(req.volume, price),
            swap: 0.0,
            net_profit: 0.0,
            margin: req.volume * price / self.cfg.leverage,
        };
        mark(&mut state, &tick, &self.cfg);
        self.next_id += 1;
        let p = Position { label: req.label.clone(), symbol: self.cfg.symbol.clone(), state };
        self.positions.push(p.clone());
        self.events.push_back(HostEvent::PositionOpened(p.clone()));
        Ok(p)
    }

    fn close_position(&mut self, id: i32) -> Result<(), HostRejection> {
        let i = self.index_of(id).ok_or_else(|| HostRejection::new("close_position", format!("no position {id}")))?;
        let p = self.positions.remove(i);
        self.balance += p.state.net_profit;
        self.events.push_back(HostEvent::PositionClosed(p));
        Ok(())
    }

    fn modify_volume(&mut self, id: i32, volume: f64) -> Result<(), HostRejection> {
        let info = self.cfg.info;
        if volume < info.volume_min || volume > info.volume_max {
            return Err(HostRejection::new("modify_volume", format!("volume {volume} out of range")));
        }
        let i = self.index_of(id).ok_or_else(|| HostRejection::new("modify_volume", format!("no position {id}")))?;
        let close_price = self.price_for(self.positions[i].direction(), true);
        let add_price = self.price_for(self.positions[i].direction(), false);
        let st = &mut self.positions[i].state;
        if volume < st.volume {
            // partial close realizes its share of the open result
            let share = (st.volume - volume) / st.volume;
            self.balance += st.net_profit * share;
            st.commission *= 1.0 - share;
        } else if let Some(px) = add_price {
            let added = volume - st.volume;
            st.entry_price = (st.entry_price * st.volume + px * added) / volume;
            st.commission -= added * px / 1_000_000.0 * info.commission;
        }
        st.volume = volume;
        st.quantity = volume / info.lot_size as f64;
        st.margin = volume * close_price.unwrap_or(st.entry_price) / self.cfg.leverage;
        if let Some(t) = self.last {
            mark(st, &t, &self.cfg);
        }
        self.events.push_back(HostEvent::PositionModified(self.positions[i].clone()));
        Ok(())
    }

    fn modify_stop_loss(&mut self, id: i32, price: Option<f64>) -> Result<(), HostRejection> {
        let i = self.index_of(id).ok_or_else(|| HostRejection::new("modify_stop_loss", format!("no position {id}")))?;
        self.positions[i].state.stop_loss = price;
        self.events.push_back(HostEvent::PositionModified(self.positions[i].clone()));
        Ok(())
    }

    fn modify_take_profit(&mut self, id: i32, price: Option<f64>) -> Result<(), HostRejection> {
        let i = self.index_of(id).ok_or_else(|| HostRejection::new("modify_take_profit", format!("no position {id}")))?;
        self.positions[i].state.take_profit = price;
        self.events.push_back(HostEvent::PositionModified(self.positions[i].clone()));
        Ok(())
    }
}

impl EventSource for PaperHost {
    fn next_event(&mut self) -> Option<HostEvent> { self.events.pop_front() }
}
