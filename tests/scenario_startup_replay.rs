mod common;

use algo_bridge::codec::{Inbound, Outbound, Sizing};
use algo_bridge::domain::Direction;
use common::*;

#[test]
fn scenario_startup_replays_closed_bars_in_order() {
    let mut host = MockHost::new();
    // closed bars out of order, forming bar last
    for t in [3, 1, 4, 0, 2] {
        host.bars.push(bar(t * 60_000, 1.1 + t as f64 * 0.001));
    }
    host.bars.push(bar(5 * 60_000, 1.2));

    let mut s = strategy(&vec![Inbound::Complete; 8], host);
    s.start().unwrap();

    let sent = s.channel().sent();
    assert_eq!(sent.len(), 8);
    assert!(matches!(sent[0], Outbound::Account(a) if a.balance == 10_000.0));
    assert!(matches!(sent[1], Outbound::Symbol(sym) if sym.digits == 5));
    let times: Vec<i64> = sent[2..7]
        .iter()
        .map(|m| match m {
            Outbound::BarClosed(b) => b.open_time_ms,
            other => panic!("expected bar, got {other:?}"),
        })
        .collect();
    assert_eq!(times, vec![0, 60_000, 120_000, 180_000, 240_000]);
    assert_eq!(sent[7], Outbound::Complete);

    // each frame answered by one reply before the next goes out
    assert!(s.channel().strictly_alternates());
    assert_eq!(s.channel().ops.len(), 16);
    assert!(s.channel().replies.is_empty());
}

#[test]
fn scenario_startup_with_only_forming_bar() {
    let mut host = MockHost::new();
    host.bars.push(bar(0, 1.1));
    let mut s = strategy(&vec![Inbound::Complete; 3], host);
    s.start().unwrap();
    let sent = s.channel().sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[2], Outbound::Complete);
}

#[test]
fn scenario_reply_during_startup_is_applied() {
    let buy = Inbound::Signal {
        direction: Direction::Buy,
        sizing: Sizing::Fixed { volume: 5_000.0, stop_loss_pips: None },
        take_profit_pips: None,
    };
    let mut s = strategy(&[Inbound::Complete, Inbound::Complete, buy], MockHost::new());
    s.start().unwrap();
    assert_eq!(s.host().calls.len(), 1);
    assert_eq!(s.host().positions[0].state.volume, 5_000.0);
}

#[test]
fn scenario_startup_aborts_when_peer_goes_away() {
    let mut host = MockHost::new();
    host.bars = vec![bar(0, 1.1), bar(60_000, 1.1), bar(120_000, 1.1)];
    // replies for account and symbol only
    let mut s = strategy(&vec![Inbound::Complete; 2], host);
    assert!(s.start().is_err());
    assert_eq!(s.channel().sent().len(), 3);
}
