//! Statistics over a result set of grants.

use chrono::{DateTime, Datelike, Duration, Utc};

use crate::models::{
    AmountBuckets, DeadlineBuckets, GrantSummary, HighValueGrant, OverviewCsv, StatisticsSnapshot,
    UrgentGrant,
};

/// Grants closing within this many whole days are urgent
pub const URGENT_WINDOW_DAYS: i64 = 14;

/// Subsidy ceiling at or above which a grant counts as high-value (yen)
pub const HIGH_VALUE_THRESHOLD: u64 = 50_000_000;

const ONE_MILLION: u64 = 1_000_000;
const TEN_MILLION: u64 = 10_000_000;
const HUNDRED_MILLION: u64 = 100_000_000;

const SECONDS_PER_DAY: i64 = 86_400;

/// Calendar months are counted in portal local time (UTC+9)
const PORTAL_UTC_OFFSET_HOURS: i64 = 9;

fn month_index(at: DateTime<Utc>) -> i64 {
    let local = (at + Duration::hours(PORTAL_UTC_OFFSET_HOURS)).naive_utc();
    i64::from(local.year()) * 12 + i64::from(local.month0())
}

/// Whole days left until `end`, rounded down
pub fn days_left(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (end - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

fn add_amount(buckets: &mut AmountBuckets, amount: Option<u64>) {
    match amount {
        None | Some(0) => buckets.unspecified += 1,
        Some(a) if a <= ONE_MILLION => buckets.under_1m += 1,
        Some(a) if a <= TEN_MILLION => buckets.under_10m += 1,
        Some(a) if a <= HUNDRED_MILLION => buckets.under_100m += 1,
        Some(_) => buckets.over_100m += 1,
    }
}

/// Compute statistics for a result set as of `now`.
///
/// Lists are complete; display code decides how many entries to show.
pub fn aggregate(grants: &[GrantSummary], now: DateTime<Utc>) -> StatisticsSnapshot {
    let current_month = month_index(now);
    let mut by_deadline = DeadlineBuckets::default();
    let mut by_amount = AmountBuckets::default();
    let mut urgent = Vec::new();
    let mut high_value = Vec::new();

    for grant in grants {
        if let Some(end) = grant.acceptance_end {
            match month_index(end) - current_month {
                0 => by_deadline.this_month += 1,
                1 => by_deadline.next_month += 1,
                d if d >= 2 => by_deadline.later += 1,
                _ => {}
            }

            let days = days_left(end, now);
            if (0..=URGENT_WINDOW_DAYS).contains(&days) {
                urgent.push(UrgentGrant {
                    id: grant.id.clone(),
                    title: grant.title.clone(),
                    acceptance_end: end,
                    days_left: days,
                });
            }
        }

        add_amount(&mut by_amount, grant.subsidy_max_limit);

        if let Some(amount) = grant.subsidy_max_limit.filter(|a| *a >= HIGH_VALUE_THRESHOLD) {
            high_value.push(HighValueGrant {
                id: grant.id.clone(),
                title: grant.title.clone(),
                max_amount: amount,
            });
        }
    }

    urgent.sort_by(|a, b| {
        a.days_left
            .cmp(&b.days_left)
            .then(a.acceptance_end.cmp(&b.acceptance_end))
    });
    high_value.sort_by(|a, b| b.max_amount.cmp(&a.max_amount).then(a.id.cmp(&b.id)));

    StatisticsSnapshot {
        total_count: grants.len(),
        generated_at: now,
        by_deadline,
        by_amount,
        urgent,
        high_value,
    }
}

/// Render the deadline and amount distributions as two CSV tables
pub fn render_csv(snapshot: &StatisticsSnapshot) -> OverviewCsv {
    let d = &snapshot.by_deadline;
    let deadline_csv = format!(
        "period,count\nthis_month,{}\nnext_month,{}\nafter_next_month,{}\n",
        d.this_month, d.next_month, d.later
    );

    let a = &snapshot.by_amount;
    let amount_csv = format!(
        "range,count\nunder_1m,{}\nunder_10m,{}\nunder_100m,{}\nover_100m,{}\nunspecified,{}\n",
        a.under_1m, a.under_10m, a.under_100m, a.over_100m, a.unspecified
    );

    OverviewCsv {
        deadline_csv,
        amount_csv,
    }
}
