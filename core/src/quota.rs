//! Daily quota for the shared upstream credential

use chrono::NaiveDate;
use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaRecord {
    pub day: NaiveDate,
    pub count: u32,
}

pub struct QuotaTracker {
    /// identity -> usage for the day it was last touched
    records: DashMap<String, QuotaRecord>,
    daily_limit: u32,
}

impl QuotaTracker {
    pub fn new(daily_limit: u32) -> Self {
        Self {
            records: DashMap::new(),
            daily_limit,
        }
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Record one privileged use for today (local calendar day).
    pub fn consume(&self, identity: &str) -> bool {
        self.consume_on(identity, chrono::Local::now().date_naive())
    }

    /// Record one privileged use on `day`. Returns false once the identity
    /// has reached the daily limit, leaving the count untouched.
    pub fn consume_on(&self, identity: &str, day: NaiveDate) -> bool {
        // The entry guard holds the shard lock, so check-and-increment is atomic
        // per identity.
        let mut entry = self
            .records
            .entry(identity.to_string())
            .or_insert(QuotaRecord { day, count: 0 });

        if entry.day != day {
            *entry = QuotaRecord { day, count: 0 };
        }

        if entry.count < self.daily_limit {
            entry.count += 1;
            tracing::debug!("Quota for {}: {}/{} on {}", identity, entry.count, self.daily_limit, day);
            true
        } else {
            tracing::warn!("Daily quota exhausted for {} ({} uses on {})", identity, entry.count, day);
            false
        }
    }

    /// Current usage record, if the identity has ever consumed quota
    pub fn usage(&self, identity: &str) -> Option<QuotaRecord> {
        self.records.get(identity).map(|r| *r)
    }
}

impl Default for QuotaTracker {
    fn default() -> Self {
        Self::new(3)
    }
}
