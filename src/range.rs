//! Translation of day-count ranges into absolute history windows

use crate::config::BucketPolicy;
use crate::constants::MILLIS_PER_DAY;
use crate::types::{HistoryInterval, RangeSpec};

/// Absolute time window and bucket size for a windowed history endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    pub start_millis: i64,
    pub end_millis: i64,
    pub interval: HistoryInterval,
}

impl HistoryWindow {
    /// Window ending at `now_millis`, or `None` for the maximum range
    pub fn translate(range: RangeSpec, now_millis: i64, policy: &BucketPolicy) -> Option<Self> {
        let days = range.as_days()?;
        let span = (days * MILLIS_PER_DAY as f64).round() as i64;
        Some(Self {
            start_millis: now_millis.saturating_sub(span),
            end_millis: now_millis,
            interval: policy.interval_for(days),
        })
    }
}
