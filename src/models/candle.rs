//! Market data models: live ticks, historical candles and aggregated bars.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An OHLC bar covering `[open_time, open_time + duration)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
    /// Window start in unix seconds. Time-based candles start on a
    /// multiple of `duration`.
    pub open_time: i64,
    /// Window length in seconds.
    pub duration: u64,
}

impl Candle {
    /// End of the window (exclusive), in unix seconds.
    pub fn close_time(&self) -> i64 {
        let duration = i64::try_from(self.duration).unwrap_or(i64::MAX);
        self.open_time.saturating_add(duration)
    }
}

/// Largest timestamp magnitude accepted from the wire: the end of year 9999.
pub const MAX_UNIX_SECS: f64 = 253_402_300_799.0;

/// Aligns `time` down to a multiple of `step` seconds.
///
/// Returns `None` for non-finite times, times beyond [`MAX_UNIX_SECS`] in
/// either direction, or an alignment that does not fit in an `i64`.
pub fn align_time(time: f64, step: i64) -> Option<i64> {
    if step <= 0 || !time.is_finite() || time.abs() > MAX_UNIX_SECS {
        return None;
    }
    let secs = time.floor() as i64;
    secs.div_euclid(step).checked_mul(step)
}

/// One timestamped input to the aggregator.
///
/// A quote tick is a sample whose four prices are equal; a base candle
/// becomes a sample stamped with its open time.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub symbol: String,
    /// Unix seconds, possibly fractional.
    pub time: f64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Option<Decimal>,
}

impl Sample {
    /// Builds a sample from a single traded or quoted price.
    #[must_use]
    pub fn tick(symbol: impl Into<String>, time: f64, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: None,
        }
    }
}

impl From<Tick> for Sample {
    fn from(tick: Tick) -> Self {
        Sample::tick(tick.symbol, tick.time, tick.price)
    }
}

impl From<&Candle> for Sample {
    fn from(candle: &Candle) -> Self {
        Self {
            symbol: candle.symbol.clone(),
            time: candle.open_time as f64,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
        }
    }
}

/// A live quote from the `updateStream` event, sent as
/// `["EURUSD_otc", 1732830108.205, 1.05123]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub time: f64,
    pub price: Decimal,
}

/// Body of `changeSymbol`, which starts the quote stream for an asset.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeSymbol {
    pub asset: String,
    pub period: u64,
}

impl ChangeSymbol {
    #[must_use]
    pub fn new(asset: impl Into<String>, period: u64) -> Self {
        Self {
            asset: asset.into(),
            period,
        }
    }
}

/// Body of an outbound `loadHistoryPeriod` request.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRequest {
    pub asset: String,
    pub index: u64,
    /// Window end in unix seconds, aligned to `period`.
    pub time: i64,
    /// Seconds of history to return, counted back from `time`.
    pub offset: u64,
    /// Base candle duration in seconds.
    pub period: u64,
}

/// Body of the inbound `loadHistoryPeriod` response.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryResponse {
    pub asset: String,
    pub index: u64,
    #[serde(default)]
    pub period: Option<u64>,
    #[serde(default)]
    pub data: Vec<HistoryCandle>,
}

/// One historical bar as the server sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryCandle {
    pub time: f64,
    pub open: Decimal,
    pub close: Decimal,
    pub high: Decimal,
    pub low: Decimal,
}

impl HistoryResponse {
    /// Converts the response into candles of `period` seconds, oldest first.
    ///
    /// Bars are re-aligned to the period and duplicates of the same window
    /// keep the last one sent. Bars with an unusable time are skipped.
    pub fn into_candles(self, period: u64) -> Vec<Candle> {
        let period = self.period.unwrap_or(period).max(1);
        let step = i64::try_from(period).unwrap_or(i64::MAX);
        let mut candles: Vec<Candle> = self
            .data
            .into_iter()
            .filter_map(|bar| {
                Some(Candle {
                    open_time: align_time(bar.time, step)?,
                    symbol: self.asset.clone(),
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: None,
                    duration: period,
                })
            })
            .collect();
        candles.sort_by_key(|c| c.open_time);
        candles.dedup_by(|later, earlier| {
            if later.open_time == earlier.open_time {
                *earlier = later.clone();
                true
            } else {
                false
            }
        });
        candles
    }
}
