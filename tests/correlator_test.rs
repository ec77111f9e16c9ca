//! Trade correlation tests, run on paused time.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use optio::OptioError;
use optio::correlator::{TradeCorrelator, TradeState};
use optio::models::order::{Outcome, TradeResult};

fn result(id: Uuid, profit: Decimal) -> TradeResult {
    let outcome = if profit > Decimal::ZERO {
        Outcome::Win
    } else {
        Outcome::Loss
    };
    TradeResult {
        id,
        outcome,
        profit,
        command: 1,
    }
}

#[tokio::test(start_paused = true)]
async fn test_result_before_timeout_resolves() {
    let correlator = TradeCorrelator::new();
    let id = Uuid::new_v4();
    correlator.register(id, Duration::from_secs(60));

    let resolver = {
        let correlator = correlator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(59)).await;
            correlator.resolve(result(id, dec!(-1)))
        })
    };

    let got = correlator
        .await_result(id, Duration::from_secs(60))
        .await
        .expect("result arrived in time");
    assert_eq!(got, result(id, dec!(-1)));
    assert!(resolver.await.expect("resolver panicked"));
    assert_eq!(correlator.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_both_attempts_exhausted() {
    let correlator = TradeCorrelator::new();
    let id = Uuid::new_v4();
    correlator.register(id, Duration::from_secs(5));
    assert_eq!(correlator.attempts_used(id), Some(0));

    let first = correlator.await_result(id, Duration::from_secs(5)).await;
    assert!(matches!(first, Err(OptioError::ResultWaitExpired { .. })));
    assert_eq!(correlator.attempts_used(id), Some(1));

    let second = correlator.await_result(id, Duration::from_secs(5)).await;
    match second {
        Err(OptioError::TradeResultTimeout { id: failed, attempts }) => {
            assert_eq!(failed, id);
            assert_eq!(attempts, 2);
        }
        other => panic!("expected TradeResultTimeout, got {other:?}"),
    }
    assert_eq!(correlator.state(id), None);

    // A late result for the failed trade is discarded.
    assert!(!correlator.resolve(result(id, dec!(1))));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_waits_on_different_ids_are_independent() {
    let correlator = TradeCorrelator::new();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    correlator.register(a, Duration::from_secs(30));
    correlator.register(b, Duration::from_secs(30));

    let wait = |id| {
        let correlator = correlator.clone();
        tokio::spawn(async move { correlator.await_result(id, Duration::from_secs(30)).await })
    };
    let (wait_a, wait_b) = (wait(a), wait(b));
    tokio::task::yield_now().await;

    // Resolve in the opposite order of registration.
    assert!(correlator.resolve(result(b, dec!(0.85))));
    assert!(correlator.resolve(result(a, dec!(-2))));

    let got_a = wait_a.await.expect("task a panicked").expect("result a");
    let got_b = wait_b.await.expect("task b panicked").expect("result b");
    assert_eq!(got_a.id, a);
    assert_eq!(got_a.outcome, Outcome::Loss);
    assert_eq!(got_b.id, b);
    assert_eq!(got_b.outcome, Outcome::Win);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_wait_does_not_spend_an_attempt() {
    let correlator = TradeCorrelator::new();
    let id = Uuid::new_v4();
    correlator.register(id, Duration::from_secs(10));

    let waiter = {
        let correlator = correlator.clone();
        tokio::spawn(async move { correlator.await_result(id, Duration::from_secs(10)).await })
    };
    tokio::task::yield_now().await;
    waiter.abort();
    let _ = waiter.await;

    assert_eq!(correlator.attempts_used(id), Some(0));
    assert_eq!(correlator.state(id), Some(TradeState::AwaitingResult));

    correlator.resolve(result(id, dec!(3)));
    assert!(correlator.await_result(id, Duration::from_secs(1)).await.is_ok());
}
