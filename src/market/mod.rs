//! Market data helpers for tool output post-processing

pub mod ohlcv;

pub use ohlcv::{compute_ohlcv_metrics, OhlcvBar, OhlcvMetrics};
