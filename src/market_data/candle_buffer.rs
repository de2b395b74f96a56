use std::collections::{HashMap, VecDeque};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub trades_count: u64,
    pub taker_buy_volume: f64,
    pub taker_buy_quote_volume: f64,
    pub is_closed: bool,
}

/// Composite key that identifies a unique candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CandleKey {
    pub symbol: String,
    pub interval: String,
}

impl std::fmt::Display for CandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.interval)
    }
}

// ---------------------------------------------------------------------------
// CandleBuffer -- thread-safe ring buffer per (symbol, interval)
// ---------------------------------------------------------------------------

/// Thread-safe ring-buffer that stores the most recent candles per
/// `(symbol, interval)` pair.  The live (unclosed) candle is continuously
/// updated in-place; when a candle closes it becomes permanent and the ring is
/// trimmed to `max_candles`.
pub struct CandleBuffer {
    buffers: RwLock<HashMap<CandleKey, VecDeque<Candle>>>,
    max_candles: usize,
}

impl CandleBuffer {
    /// Create a new buffer that retains at most `max_candles` closed candles per
    /// key, plus one in-progress candle.
    pub fn new(max_candles: usize) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            max_candles,
        }
    }

    /// Insert or replace the latest candle for the given key.
    pub fn update(&self, key: CandleKey, candle: Candle) {
        let mut map = self.buffers.write();
        let ring = map
            .entry(key)
            .or_insert_with(|| VecDeque::with_capacity(self.max_candles + 1));

        if candle.is_closed {
            if let Some(last) = ring.back() {
                if !last.is_closed && last.open_time == candle.open_time {
                    ring.pop_back();
                }
            }
            ring.push_back(candle);
            while ring.len() > self.max_candles {
                ring.pop_front();
            }
        } else {
            if let Some(last) = ring.back() {
                if !last.is_closed && last.open_time == candle.open_time {
                    ring.pop_back();
                }
            }
            ring.push_back(candle);
        }
    }

    /// Bulk-seed with historical closed candles (oldest-first), as returned
    /// by a `MarketDataProvider::get_history` call.
    pub fn seed(&self, key: CandleKey, candles: Vec<Candle>) {
        let mut map = self.buffers.write();
        let ring = map
            .entry(key)
            .or_insert_with(|| VecDeque::with_capacity(self.max_candles + 1));
        for candle in candles {
            ring.push_back(candle);
        }
        while ring.len() > self.max_candles {
            ring.pop_front();
        }
    }

    /// Return the most recent `count` **closed** candles (oldest-first order).
    pub fn get_closed(&self, key: &CandleKey, count: usize) -> Vec<Candle> {
        let map = self.buffers.read();
        match map.get(key) {
            Some(ring) => {
                let closed: Vec<&Candle> = ring.iter().filter(|c| c.is_closed).collect();
                let start = closed.len().saturating_sub(count);
                closed[start..].iter().map(|c| (*c).clone()).collect()
            }
            None => Vec::new(),
        }
    }

    /// Return the most recent `count` close prices from closed candles
    /// (oldest-first order).
    pub fn get_closes(&self, key: &CandleKey, count: usize) -> Vec<f64> {
        self.get_closed(key, count)
            .iter()
            .map(|c| c.close)
            .collect()
    }

    /// Return the close price of the most recent closed candle, if any.
    pub fn last_close(&self, key: &CandleKey) -> Option<f64> {
        let map = self.buffers.read();
        map.get(key)
            .and_then(|ring| ring.iter().rev().find(|c| c.is_closed).map(|c| c.close))
    }

    /// Total number of candles (including any in-progress candle) stored for a
    /// key.
    pub fn count(&self, key: &CandleKey) -> usize {
        let map = self.buffers.read();
        map.get(key).map_or(0, VecDeque::len)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candle(open_time: i64, close: f64, is_closed: bool) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 59_999,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 100.0,
            quote_volume: 200.0,
            trades_count: 50,
            taker_buy_volume: 60.0,
            taker_buy_quote_volume: 120.0,
            is_closed,
        }
    }

    fn make_key(sym: &str, iv: &str) -> CandleKey {
        CandleKey {
            symbol: sym.into(),
            interval: iv.into(),
        }
    }

    #[test]
    fn ring_buffer_trimming() {
        let buf = CandleBuffer::new(3);
        let key = make_key("BTCUSDT", "1m");

        for i in 0..5 {
            buf.update(
                key.clone(),
                sample_candle(i * 60_000, 100.0 + i as f64, true),
            );
        }

        assert_eq!(buf.count(&key), 3);
        let closes = buf.get_closes(&key, 10);
        assert_eq!(closes, vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn in_progress_replacement() {
        let buf = CandleBuffer::new(10);
        let key = make_key("ETHUSDT", "5m");

        buf.update(key.clone(), sample_candle(0, 50.0, false));
        assert_eq!(buf.count(&key), 1);

        buf.update(key.clone(), sample_candle(0, 51.0, false));
        assert_eq!(buf.count(&key), 1);

        buf.update(key.clone(), sample_candle(0, 52.0, true));
        assert_eq!(buf.count(&key), 1);
        assert_eq!(buf.last_close(&key), Some(52.0));
    }

    #[test]
    fn get_closed_filters_out_in_progress() {
        let buf = CandleBuffer::new(10);
        let key = make_key("BTCUSDT", "1m");

        buf.update(key.clone(), sample_candle(0, 100.0, true));
        buf.update(key.clone(), sample_candle(60_000, 101.0, true));
        buf.update(key.clone(), sample_candle(120_000, 102.0, false));

        let closed = buf.get_closed(&key, 10);
        assert_eq!(closed.len(), 2);
    }

    #[test]
    fn last_close_empty_returns_none() {
        let buf = CandleBuffer::new(10);
        let key = make_key("XYZUSDT", "1h");
        assert_eq!(buf.last_close(&key), None);
    }

    #[test]
    fn seed_bulk_loads_history() {
        let buf = CandleBuffer::new(10);
        let key = make_key("BTCUSDT", "1h");
        let history: Vec<Candle> = (0..5)
            .map(|i| sample_candle(i * 3_600_000, 100.0 + i as f64, true))
            .collect();
        buf.seed(key.clone(), history);
        assert_eq!(buf.count(&key), 5);
        assert_eq!(buf.last_close(&key), Some(104.0));
    }
}
