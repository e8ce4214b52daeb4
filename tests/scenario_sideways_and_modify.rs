mod common;

use algo_bridge::codec::{Inbound, Outbound};
use algo_bridge::domain::Direction;
use common::*;

#[test]
fn scenario_sideways_without_position_is_noop() {
    let mut s = strategy(&[Inbound::Sideways], MockHost::new());
    s.call(Outbound::Complete).unwrap();
    assert!(s.host().calls.is_empty());
}

#[test]
fn scenario_sideways_closes_own_position() {
    let host = MockHost::new()
        .with_position(1, Direction::Buy, 1_000.0, LABEL)
        .with_position(2, Direction::Sell, 1_000.0, "manual");
    let mut s = strategy(&[Inbound::Sideways], host);
    s.call(Outbound::Complete).unwrap();
    assert_eq!(s.host().calls, vec![Call::Close(1)]);
    assert_eq!(s.host().positions.len(), 1);
}

#[test]
fn scenario_sideways_skips_same_label_on_other_symbol() {
    let host = MockHost::new()
        .with_position_on("GBPUSD", 1, Direction::Sell, 1_000.0, LABEL)
        .with_position(2, Direction::Sell, 1_000.0, LABEL);
    let mut s = strategy(&[Inbound::Sideways], host);
    s.call(Outbound::Complete).unwrap();
    assert_eq!(s.host().calls, vec![Call::Close(2)]);
    assert_eq!(s.host().positions.len(), 1);
    assert_eq!(s.host().positions[0].symbol, "GBPUSD");
}

#[test]
fn scenario_modify_volume_scales_and_normalizes() {
    let host = MockHost::new().with_position(1, Direction::Buy, 10_000.0, LABEL);
    let replies = [
        Inbound::ModifyVolume { position_id: 1, percent: 50.0 },
        Inbound::ModifyVolume { position_id: 1, percent: 33.0 },
        Inbound::ModifyVolume { position_id: 1, percent: 1.0 },
    ];
    let mut s = strategy(&replies, host);
    for _ in 0..3 {
        s.call(Outbound::Complete).unwrap();
    }
    assert_eq!(
        s.host().calls,
        vec![
            Call::ModifyVolume(1, 5_000.0),
            // 3_300 rounds down
            Call::ModifyVolume(1, 3_000.0),
            // 100 clamps up to the minimum
            Call::ModifyVolume(1, 1_000.0),
        ]
    );
}

#[test]
fn scenario_modify_volume_unchanged_skips_host() {
    let host = MockHost::new().with_position(1, Direction::Buy, 10_000.0, LABEL);
    let mut s = strategy(&[Inbound::ModifyVolume { position_id: 1, percent: 100.0 }], host);
    s.call(Outbound::Complete).unwrap();
    assert!(s.host().calls.is_empty());
}

#[test]
fn scenario_modify_unknown_position_is_noop() {
    let host = MockHost::new().with_position(1, Direction::Buy, 10_000.0, LABEL);
    let replies = [
        Inbound::ModifyVolume { position_id: 9, percent: 50.0 },
        Inbound::ModifyStopLoss { position_id: 9, price: Some(1.0) },
        Inbound::ModifyTakeProfit { position_id: 9, price: Some(1.2) },
    ];
    let mut s = strategy(&replies, host);
    for _ in 0..3 {
        s.call(Outbound::Complete).unwrap();
    }
    assert!(s.host().calls.is_empty());
}

#[test]
fn scenario_modify_protection_uses_absolute_prices() {
    let host = MockHost::new()
        .with_position(1, Direction::Buy, 10_000.0, LABEL)
        .with_position(2, Direction::Buy, 10_000.0, "manual");
    let replies = [
        Inbound::ModifyStopLoss { position_id: 1, price: Some(1.095) },
        Inbound::ModifyTakeProfit { position_id: 1, price: None },
        // out of scope for a labelled session
        Inbound::ModifyStopLoss { position_id: 2, price: Some(1.0) },
    ];
    let mut s = strategy(&replies, host);
    for _ in 0..3 {
        s.call(Outbound::Complete).unwrap();
    }
    assert_eq!(
        s.host().calls,
        vec![Call::ModifyStopLoss(1, Some(1.095)), Call::ModifyTakeProfit(1, None)]
    );
}
