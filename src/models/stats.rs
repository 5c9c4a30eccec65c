//! Summary statistics over a set of grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counts by the month the acceptance window closes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineBuckets {
    pub this_month: usize,
    pub next_month: usize,
    #[serde(rename = "after_next_month")]
    pub later: usize,
}

impl DeadlineBuckets {
    pub fn total(&self) -> usize {
        self.this_month + self.next_month + self.later
    }
}

/// Counts by subsidy ceiling band
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountBuckets {
    pub under_1m: usize,
    pub under_10m: usize,
    pub under_100m: usize,
    pub over_100m: usize,
    pub unspecified: usize,
}

impl AmountBuckets {
    pub fn total(&self) -> usize {
        self.under_1m + self.under_10m + self.under_100m + self.over_100m + self.unspecified
    }
}

/// A grant whose window closes soon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgentGrant {
    pub id: String,
    pub title: String,
    pub acceptance_end: DateTime<Utc>,
    pub days_left: i64,
}

/// A grant with a large subsidy ceiling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighValueGrant {
    pub id: String,
    pub title: String,
    pub max_amount: u64,
}

/// Statistics computed fresh from one result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub total_count: usize,
    #[serde(rename = "statistics_generated_at")]
    pub generated_at: DateTime<Utc>,
    #[serde(rename = "by_deadline_period")]
    pub by_deadline: DeadlineBuckets,
    #[serde(rename = "by_amount_range")]
    pub by_amount: AmountBuckets,
    #[serde(rename = "urgent_deadlines")]
    pub urgent: Vec<UrgentGrant>,
    #[serde(rename = "high_amount_subsidies")]
    pub high_value: Vec<HighValueGrant>,
}

/// CSV rendering of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverviewCsv {
    #[serde(rename = "deadline_statistics")]
    pub deadline_csv: String,
    #[serde(rename = "amount_statistics")]
    pub amount_csv: String,
}
