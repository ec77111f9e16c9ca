//! Bucketing tests for the candle aggregator.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use optio::aggregator::{Aggregator, BucketState, resample};
use optio::models::candle::{Candle, Sample};

const SYMBOL: &str = "EURUSD_otc";

fn tick(time: f64, price: Decimal) -> Sample {
    Sample::tick(SYMBOL, time, price)
}

fn run(duration: u64, samples: &[Sample]) -> Vec<Candle> {
    let mut agg = Aggregator::new(SYMBOL, duration).expect("valid duration");
    samples
        .iter()
        .cloned()
        .filter_map(|s| agg.push(s))
        .collect()
}

#[test]
fn test_boundary_closes_exactly_one_candle() {
    let mut agg = Aggregator::new(SYMBOL, 60).expect("valid duration");
    assert!(agg.push(tick(0.0, dec!(1.0))).is_none());
    assert!(agg.push(tick(10.0, dec!(1.3))).is_none());
    assert!(agg.push(tick(20.0, dec!(0.9))).is_none());

    let closed = agg.push(tick(61.0, dec!(1.1))).expect("boundary crossed");
    assert_eq!(closed.open_time, 0);
    assert_eq!(closed.close_time(), 60);
    assert_eq!(closed.open, dec!(1.0));
    assert_eq!(closed.high, dec!(1.3));
    assert_eq!(closed.low, dec!(0.9));
    assert_eq!(closed.close, dec!(0.9));

    let open = agg.current().expect("bucket open for the fourth event");
    assert_eq!(open.open_time(), 60);
    assert_eq!(open.state(), BucketState::Filling);
    let partial = open.to_candle(SYMBOL, 60);
    assert_eq!(partial.open, dec!(1.1));
    assert_eq!(partial.close, dec!(1.1));
}

#[test]
fn test_replay_is_deterministic() {
    let samples: Vec<Sample> = (0..500)
        .map(|i| tick(f64::from(i) * 1.7, Decimal::from(i % 37) / dec!(100) + dec!(1)))
        .collect();

    let first = run(15, &samples);
    let second = run(15, &samples);
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_late_events_never_reopen_buckets() {
    let candles = run(
        60,
        &[
            tick(5.0, dec!(1)),
            tick(65.0, dec!(2)),
            tick(30.0, dec!(9)),
            tick(125.0, dec!(3)),
            tick(70.0, dec!(9)),
            tick(185.0, dec!(4)),
        ],
    );

    let open_times: Vec<i64> = candles.iter().map(|c| c.open_time).collect();
    assert_eq!(open_times, vec![0, 60, 120]);
    assert!(candles.iter().all(|c| c.high < dec!(9)));
}

#[test]
fn test_gaps_are_not_backfilled() {
    let candles = run(10, &[tick(1.0, dec!(1)), tick(45.0, dec!(2)), tick(51.0, dec!(3))]);
    let open_times: Vec<i64> = candles.iter().map(|c| c.open_time).collect();
    assert_eq!(open_times, vec![0, 40]);
}

#[test]
fn test_flush_closes_on_elapsed_clock() {
    let mut agg = Aggregator::new(SYMBOL, 30).expect("valid duration");
    agg.push(tick(31.5, dec!(1.2)));

    assert!(agg.flush(59.9).is_none());
    let candle = agg.flush(60.0).expect("window elapsed");
    assert_eq!(candle.open_time, 30);
    assert!(agg.current().is_none());
    assert!(agg.flush(1_000.0).is_none());

    // The flushed window stays closed.
    assert!(agg.push(tick(45.0, dec!(5))).is_none());
    assert!(agg.current().is_none());
}

#[test]
fn test_other_symbols_are_ignored() {
    let mut agg = Aggregator::new(SYMBOL, 60).expect("valid duration");
    agg.push(tick(0.0, dec!(1)));
    assert!(agg.push(Sample::tick("GBPUSD_otc", 90.0, dec!(7))).is_none());
    assert_eq!(agg.current().map(|b| b.open_time()), Some(0));
}

#[test]
fn test_custom_duration_from_base_candles() {
    // Five one-minute candles resampled into a custom three-minute duration.
    let base: Vec<Candle> = (0..5)
        .map(|i| {
            let price = Decimal::from(i + 1);
            Candle {
                symbol: SYMBOL.to_string(),
                open: price,
                high: price + dec!(0.5),
                low: price - dec!(0.5),
                close: price + dec!(0.25),
                volume: Some(dec!(10)),
                open_time: 60 * i64::from(i),
                duration: 60,
            }
        })
        .collect();

    let candles = resample(base.iter().rev().map(Sample::from), 180).expect("valid duration");
    assert_eq!(candles.len(), 2);

    let first = &candles[0];
    assert_eq!(first.open_time, 0);
    assert_eq!(first.duration, 180);
    assert_eq!(first.open, dec!(1));
    assert_eq!(first.high, dec!(3.5));
    assert_eq!(first.low, dec!(0.5));
    assert_eq!(first.close, dec!(3.25));
    assert_eq!(first.volume, Some(dec!(30)));

    let trailing = &candles[1];
    assert_eq!(trailing.open_time, 180);
    assert_eq!(trailing.close, dec!(5.25));
    assert_eq!(trailing.volume, Some(dec!(20)));
}
