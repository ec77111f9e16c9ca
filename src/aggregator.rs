//! Fixed-duration OHLC aggregation.
//!
//! An [`Aggregator`] owns at most one open [`Bucket`] for its
//! `(symbol, duration)` pair. Each sample is keyed to the window
//! `floor(time / duration) * duration`; a sample for a later window closes
//! the open bucket and returns its candle. Closed windows are never
//! reopened, so late samples are dropped and candles come out strictly
//! increasing in `open_time`. Gaps in the input stay gaps in the output.
//!
//! Custom durations need nothing special: a 45 s or 7 min aggregation is
//! the same engine with a different `duration`, fed with ticks or with
//! smaller candles converted into [`Sample`]s. [`ChunkAggregator`] closes
//! candles by sample count instead of by time.

use rust_decimal::Decimal;
use tracing::debug;

use crate::models::candle::{Candle, Sample, align_time};
use crate::{OptioError, Result};

/// Lifecycle of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    Filling,
    Closed,
}

/// The in-progress accumulator for one window.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    open_time: i64,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Option<Decimal>,
    state: BucketState,
}

impl Bucket {
    fn open(open_time: i64, sample: &Sample) -> Self {
        Self {
            open_time,
            open: sample.open,
            high: sample.high.max(sample.open).max(sample.close),
            low: sample.low.min(sample.open).min(sample.close),
            close: sample.close,
            volume: sample.volume,
            state: BucketState::Filling,
        }
    }

    fn update(&mut self, sample: &Sample) {
        self.high = self.high.max(sample.high).max(sample.close);
        self.low = self.low.min(sample.low).min(sample.close);
        self.close = sample.close;
        if let Some(volume) = sample.volume {
            self.volume = Some(self.volume.unwrap_or_default() + volume);
        }
    }

    pub fn open_time(&self) -> i64 {
        self.open_time
    }

    pub fn state(&self) -> BucketState {
        self.state
    }

    /// Snapshot of the bucket as a candle.
    pub fn to_candle(&self, symbol: &str, duration: u64) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            open_time: self.open_time,
            duration,
        }
    }
}

/// Streaming bucketer for one `(symbol, duration)` pair.
#[derive(Debug, Clone)]
pub struct Aggregator {
    symbol: String,
    duration: u64,
    current: Option<Bucket>,
    last_closed: Option<i64>,
}

impl Aggregator {
    /// Creates an aggregator emitting candles of `duration` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`OptioError::InvalidDuration`] for a zero duration or one
    /// too large to align timestamps with.
    pub fn new(symbol: impl Into<String>, duration: u64) -> Result<Self> {
        if duration == 0 || i64::try_from(duration).is_err() {
            return Err(OptioError::InvalidDuration(format!(
                "{duration}s is not a usable candle duration"
            )));
        }
        Ok(Self {
            symbol: symbol.into(),
            duration,
            current: None,
            last_closed: None,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    /// The bucket currently filling, if any.
    pub fn current(&self) -> Option<&Bucket> {
        self.current.as_ref()
    }

    /// Aligns a timestamp to the start of its window, or `None` if the
    /// time is not a usable unix timestamp.
    pub fn window_start(&self, time: f64) -> Option<i64> {
        // Fits: checked in `new`.
        align_time(time, self.duration as i64)
    }

    /// Feeds one sample, returning the candle it closed, if any.
    pub fn push(&mut self, sample: Sample) -> Option<Candle> {
        if sample.symbol != self.symbol {
            return None;
        }
        let Some(key) = self.window_start(sample.time) else {
            debug!(symbol = %self.symbol, time = sample.time, "Dropping sample with invalid time");
            return None;
        };
        if self.last_closed.is_some_and(|closed| key <= closed) {
            debug!(
                symbol = %self.symbol,
                duration = self.duration,
                key,
                "Dropping sample for closed window"
            );
            return None;
        }

        if let Some(bucket) = self.current.as_mut() {
            if key == bucket.open_time {
                bucket.update(&sample);
                return None;
            }
            if key < bucket.open_time {
                debug!(
                    symbol = %self.symbol,
                    duration = self.duration,
                    key,
                    open = bucket.open_time,
                    "Dropping late sample"
                );
                return None;
            }
        }

        let closed = self.close_current();
        self.current = Some(Bucket::open(key, &sample));
        closed
    }

    /// Closes the open bucket once `now` has passed the end of its window.
    ///
    /// Used when the clock crosses a boundary but no further sample arrives.
    pub fn flush(&mut self, now: f64) -> Option<Candle> {
        let open_time = self.current.as_ref()?.open_time;
        let end = open_time.saturating_add(self.duration as i64);
        if now >= end as f64 {
            self.close_current()
        } else {
            None
        }
    }

    fn close_current(&mut self) -> Option<Candle> {
        let mut bucket = self.current.take()?;
        bucket.state = BucketState::Closed;
        self.last_closed = Some(bucket.open_time);
        Some(bucket.to_candle(&self.symbol, self.duration))
    }
}

/// Candles of a fixed number of samples.
///
/// Every `size` samples for the symbol close one candle, whatever time they
/// span. The candle starts at the first sample's second and lasts until the
/// second after its latest sample.
#[derive(Debug, Clone)]
pub struct ChunkAggregator {
    symbol: String,
    size: usize,
    current: Option<Bucket>,
    count: usize,
    last_second: i64,
}

impl ChunkAggregator {
    /// Creates an aggregator closing a candle every `size` samples.
    ///
    /// # Errors
    ///
    /// Returns [`OptioError::InvalidDuration`] for a zero size.
    pub fn new(symbol: impl Into<String>, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(OptioError::InvalidDuration(
                "a chunk needs at least one sample".to_string(),
            ));
        }
        Ok(Self {
            symbol: symbol.into(),
            size,
            current: None,
            count: 0,
            last_second: 0,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Samples per candle.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Feeds one sample, returning the candle it completed, if any.
    pub fn push(&mut self, sample: Sample) -> Option<Candle> {
        if sample.symbol != self.symbol {
            return None;
        }
        let Some(second) = align_time(sample.time, 1) else {
            debug!(symbol = %self.symbol, time = sample.time, "Dropping sample with invalid time");
            return None;
        };

        if let Some(bucket) = self.current.as_mut() {
            bucket.update(&sample);
            self.last_second = self.last_second.max(second);
        } else {
            self.current = Some(Bucket::open(second, &sample));
            self.last_second = second;
        }
        self.count += 1;
        if self.count < self.size {
            return None;
        }

        let mut bucket = self.current.take()?;
        bucket.state = BucketState::Closed;
        self.count = 0;
        let span = u64::try_from(self.last_second - bucket.open_time).unwrap_or_default();
        Some(bucket.to_candle(&self.symbol, span + 1))
    }
}

/// A live aggregation fed with quotes by the session.
#[derive(Debug, Clone)]
pub enum Aggregation {
    /// Fixed time windows.
    Timed(Aggregator),
    /// Fixed sample counts.
    Chunked(ChunkAggregator),
}

impl Aggregation {
    pub fn symbol(&self) -> &str {
        match self {
            Aggregation::Timed(agg) => agg.symbol(),
            Aggregation::Chunked(agg) => agg.symbol(),
        }
    }

    pub fn push(&mut self, sample: Sample) -> Option<Candle> {
        match self {
            Aggregation::Timed(agg) => agg.push(sample),
            Aggregation::Chunked(agg) => agg.push(sample),
        }
    }

    /// Closes an elapsed time window. Chunks close on count alone.
    pub fn flush(&mut self, now: f64) -> Option<Candle> {
        match self {
            Aggregation::Timed(agg) => agg.flush(now),
            Aggregation::Chunked(_) => None,
        }
    }
}

impl From<Aggregator> for Aggregation {
    fn from(agg: Aggregator) -> Self {
        Aggregation::Timed(agg)
    }
}

impl From<ChunkAggregator> for Aggregation {
    fn from(agg: ChunkAggregator) -> Self {
        Aggregation::Chunked(agg)
    }
}

/// Aggregates a finite sequence into candles of `duration` seconds.
///
/// Samples are ordered by time first and the trailing bucket is emitted
/// too. The symbol is taken from the first sample; samples for any other
/// symbol are ignored.
///
/// # Errors
///
/// Returns [`OptioError::InvalidDuration`] for a zero duration.
pub fn resample(samples: impl IntoIterator<Item = Sample>, duration: u64) -> Result<Vec<Candle>> {
    let mut samples: Vec<Sample> = samples.into_iter().collect();
    let Some(first) = samples.first() else {
        Aggregator::new("", duration)?;
        return Ok(Vec::new());
    };
    let mut aggregator = Aggregator::new(first.symbol.clone(), duration)?;
    samples.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut candles: Vec<Candle> = samples
        .into_iter()
        .filter_map(|sample| aggregator.push(sample))
        .collect();
    candles.extend(aggregator.close_current());
    Ok(candles)
}
