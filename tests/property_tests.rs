//! Property tests for bridge invariants.
//!
//! 1. Frame codec: every inbound and outbound frame decodes back to itself,
//!    and arbitrary payloads never panic the decoder
//! 2. Change tracker: observing the same state twice reports no change
//! 3. Volume normalization: never above the request, never outside limits

use proptest::prelude::*;

use algo_bridge::codec::{Inbound, Outbound, Sizing, TargetKind};
use algo_bridge::domain::{Bar, Direction, PositionState, SymbolSnapshot};
use algo_bridge::risk::normalize_volume;
use algo_bridge::tracker::ChangeTracker;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (0.5..2.0_f64).prop_map(|p| (p * 100_000.0).round() / 100_000.0)
}

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Buy), Just(Direction::Sell)]
}

fn arb_target() -> impl Strategy<Value = TargetKind> {
    prop_oneof![
        Just(TargetKind::AskAbove),
        Just(TargetKind::AskBelow),
        Just(TargetKind::BidAbove),
        Just(TargetKind::BidBelow),
    ]
}

fn arb_inbound() -> impl Strategy<Value = Inbound> {
    prop_oneof![
        Just(Inbound::Complete),
        Just(Inbound::Sideways),
        (arb_direction(), 1.0..1e6_f64, proptest::option::of(0.1..500.0_f64), proptest::option::of(0.1..500.0_f64))
            .prop_map(|(direction, v, sl, tp)| Inbound::Signal {
                direction,
                sizing: Sizing::Fixed { volume: v, stop_loss_pips: sl },
                take_profit_pips: tp,
            }),
        (arb_direction(), 0.1..10.0_f64, 0.1..500.0_f64, proptest::option::of(0.1..500.0_f64))
            .prop_map(|(direction, risk, sl, tp)| Inbound::Signal {
                direction,
                sizing: Sizing::Dynamic { risk_percent: risk, stop_loss_pips: sl },
                take_profit_pips: tp,
            }),
        (any::<i32>(), 1.0..400.0_f64).prop_map(|(position_id, percent)| Inbound::ModifyVolume { position_id, percent }),
        (any::<i32>(), proptest::option::of(arb_price()))
            .prop_map(|(position_id, price)| Inbound::ModifyStopLoss { position_id, price }),
        (any::<i32>(), proptest::option::of(arb_price()))
            .prop_map(|(position_id, price)| Inbound::ModifyTakeProfit { position_id, price }),
        (arb_target(), proptest::option::of(arb_price())).prop_map(|(target, price)| Inbound::Target { target, price }),
    ]
}

fn arb_position() -> impl Strategy<Value = PositionState> {
    (
        any::<i32>(),
        any::<i64>(),
        arb_direction(),
        (1_000.0..1e6_f64).prop_map(|v| v.round()),
        arb_price(),
        arb_price(),
        proptest::option::of(arb_price()),
        proptest::option::of(arb_price()),
        -1e4..1e4_f64,
    )
        .prop_map(|(id, entry_time_ms, direction, volume, entry_price, current_price, stop_loss, take_profit, pnl)| {
            PositionState {
                id,
                entry_time_ms,
                direction,
                volume,
                quantity: volume / 100_000.0,
                entry_price,
                current_price,
                stop_loss,
                take_profit,
                pips: (current_price - entry_price) * 10_000.0,
                gross_profit: pnl,
                commission: -1.5,
                swap: 0.0,
                net_profit: pnl - 3.0,
                margin: volume * entry_price / 30.0,
            }
        })
}

fn arb_outbound() -> impl Strategy<Value = Outbound> {
    prop_oneof![
        Just(Outbound::Shutdown),
        Just(Outbound::Complete),
        arb_position().prop_map(Outbound::PositionOpened),
        arb_position().prop_map(Outbound::PositionModified),
        arb_position().prop_map(Outbound::PositionClosed),
        (any::<i64>(), arb_price(), 0.0..1e5_f64).prop_map(|(t, px, v)| Outbound::BarClosed(Bar {
            open_time_ms: t,
            open: px,
            high: px,
            low: px,
            close: px,
            tick_volume: v,
        })),
        (arb_price(), arb_price()).prop_map(|(ask, bid)| Outbound::Tick { ask, bid }),
    ]
}

fn fx() -> SymbolSnapshot {
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

// ── 1. Codec ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn inbound_frames_round_trip(msg in arb_inbound()) {
        let frame = msg.encode();
        prop_assert_eq!(frame.len(), 1 + Inbound::payload_len(frame[0]).unwrap());
        prop_assert_eq!(Inbound::decode(frame[0], &frame[1..]).unwrap(), msg);
    }

    #[test]
    fn outbound_frames_round_trip(msg in arb_outbound()) {
        let frame = msg.encode();
        prop_assert_eq!(frame.len(), 1 + Outbound::payload_len(frame[0]).unwrap());
        prop_assert_eq!(Outbound::decode(frame[0], &frame[1..]).unwrap(), msg);
    }

    #[test]
    fn arbitrary_payload_never_panics(tag in 0u8..16, payload in proptest::collection::vec(any::<u8>(), 0..160)) {
        let _ = Inbound::decode(tag, &payload);
        let _ = Outbound::decode(tag, &payload);
    }
}

// ── 2. Change tracker ────────────────────────────────────────────────

proptest! {
    #[test]
    fn second_observation_is_never_a_change(first in arb_position(), second in arb_position()) {
        let mut t = ChangeTracker::new(1e-9);
        t.track(&first);
        let mut next = second;
        next.id = first.id;
        let _ = t.observe_position(&next);
        prop_assert!(!t.observe_position(&next));
    }
}

// ── 3. Volume normalization ──────────────────────────────────────────

proptest! {
    #[test]
    fn normalized_volume_stays_in_limits(v in 0.0..2e7_f64) {
        let sym = fx();
        let n = normalize_volume(v, &sym);
        prop_assert!(n >= sym.volume_min && n <= sym.volume_max);
        if v >= sym.volume_min && v <= sym.volume_max {
            prop_assert!(n <= v + 1e-5);
            prop_assert!(v - n < sym.volume_step);
        }
    }
}
