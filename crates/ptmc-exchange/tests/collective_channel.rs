use std::thread;
use std::time::Duration;

use ptmc_core::PtError;
use ptmc_exchange::{CollectiveChannel, ExchangePattern, LocalGroup, ReplicaPayload};

#[test]
fn scatter_gather_broadcast_round_trip() {
    let channels = LocalGroup::new(4, Duration::from_secs(5))
        .channels::<String>()
        .unwrap();
    let results: Vec<(f64, Option<Vec<f64>>, ExchangePattern)> = thread::scope(|scope| {
        let handles: Vec<_> = channels
            .into_iter()
            .map(|mut channel| {
                scope.spawn(move || {
                    let ladder = [1.0, 2.0, 4.0, 8.0];
                    let root = channel.is_root();
                    let temperature = channel
                        .scatter(root.then_some(&ladder[..]))
                        .unwrap();
                    let gathered = channel.gather(temperature * 10.0).unwrap();
                    let pattern = root.then(|| {
                        let mut pattern = ExchangePattern::empty(4);
                        pattern.pair(1, 2).unwrap();
                        pattern
                    });
                    let pattern = channel.broadcast(pattern).unwrap();
                    (temperature, gathered, pattern)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let temperatures: Vec<f64> = results.iter().map(|r| r.0).collect();
    assert_eq!(temperatures, vec![1.0, 2.0, 4.0, 8.0]);
    assert_eq!(results[0].1, Some(vec![10.0, 20.0, 40.0, 80.0]));
    assert!(results[1..].iter().all(|r| r.1.is_none()));
    for (_, _, pattern) in &results {
        assert_eq!(pattern.partner(1), Some(2));
        assert_eq!(pattern.partner(0), None);
    }
}

#[test]
fn exchange_moves_payloads_between_partners() {
    let channels = LocalGroup::new(2, Duration::from_secs(5))
        .channels::<Vec<u8>>()
        .unwrap();
    let received: Vec<ReplicaPayload<Vec<u8>>> = thread::scope(|scope| {
        let handles: Vec<_> = channels
            .into_iter()
            .map(|mut channel| {
                scope.spawn(move || {
                    let rank = channel.rank();
                    let payload = ReplicaPayload {
                        config: vec![rank as u8; 3],
                        energy: -(rank as f64),
                    };
                    channel.exchange(1 - rank, payload).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(received[0].config, vec![1, 1, 1]);
    assert_eq!(received[0].energy, -1.0);
    assert_eq!(received[1].config, vec![0, 0, 0]);
    assert_eq!(received[1].energy, 0.0);
}

#[test]
fn gather_times_out_naming_the_stalled_rank() {
    let mut channels = LocalGroup::new(3, Duration::from_millis(50))
        .channels::<()>()
        .unwrap();
    let stalled = channels.pop().unwrap();
    let mut follower = channels.pop().unwrap();
    let mut root = channels.pop().unwrap();

    assert_eq!(follower.gather(1.0).unwrap(), None);
    let err = root.gather(0.0).unwrap_err();
    drop(stalled);

    assert!(matches!(err, PtError::Transport(_)));
    assert_eq!(err.info().code, "gather-timeout");
    assert_eq!(err.info().context.get("stalled").map(String::as_str), Some("2"));
}

#[test]
fn send_to_departed_participant_is_a_transport_failure() {
    let mut channels = LocalGroup::new(2, Duration::from_millis(50))
        .channels::<()>()
        .unwrap();
    let departed = channels.pop().unwrap();
    drop(departed);
    let mut root = channels.pop().unwrap();
    let err = root.scatter(Some(&[1.0, 2.0][..])).unwrap_err();
    assert_eq!(err.info().code, "peer-disconnected");
    assert_eq!(err.info().context.get("rank").map(String::as_str), Some("1"));
}

#[test]
fn ladder_length_must_match_participants() {
    let mut channels = LocalGroup::new(3, Duration::from_millis(50))
        .channels::<()>()
        .unwrap();
    let mut root = channels.remove(0);
    let err = root.scatter(Some(&[1.0, 2.0][..])).unwrap_err();
    assert!(matches!(err, PtError::Protocol(_)));
    assert_eq!(err.info().code, "ladder-size");
}

#[test]
fn exchanging_with_self_is_rejected() {
    let mut channels = LocalGroup::new(2, Duration::from_millis(50))
        .channels::<()>()
        .unwrap();
    let mut root = channels.remove(0);
    let payload = ReplicaPayload {
        config: (),
        energy: 0.0,
    };
    let err = root.exchange(0, payload).unwrap_err();
    assert_eq!(err.info().code, "invalid-partner");
}

#[test]
fn empty_group_is_a_configuration_error() {
    let err = LocalGroup::new(0, Duration::from_millis(1))
        .channels::<()>()
        .unwrap_err();
    assert_eq!(err.info().code, "group-size");
}
